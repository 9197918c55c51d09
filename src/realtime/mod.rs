//! Realtime session channel.
//!
//! | Module    | Responsibility                                            |
//! |-----------|-----------------------------------------------------------|
//! | `manager` | `RealTimeManager`: socket task, send queue, reconnection  |
//! | `filter`  | `UpdateFilter`: duplicate and stale update suppression    |
//! | `batch`   | `collapse()`: one flush cycle into reducer-ready `Update`s |
//! | `backoff` | `ReconnectPolicy` / `Backoff`: exponential retry schedule |

pub mod backoff;
pub mod batch;
pub mod filter;
pub mod manager;

pub use backoff::{Backoff, ReconnectPolicy};
pub use batch::{Update, collapse};
pub use filter::{UpdateFilter, Verdict};
pub use manager::{RealTimeManager, RealtimeEvent, session_ws_url};
