//! Per-session client state.
//!
//! | Module     | Role                                                  |
//! |------------|-------------------------------------------------------|
//! | `state`    | `SessionState` and the pure `reduce` function         |
//! | `coalesce` | Debounce buffer for remote updates                    |
//! | `context`  | `SessionContext` actor wiring realtime into the state |

pub mod coalesce;
pub mod context;
pub mod state;

pub use coalesce::Coalescer;
pub use context::{ChatBackend, SessionContext};
pub use state::{Action, ConnectionStatus, SessionState, reduce, temp_message_id};
