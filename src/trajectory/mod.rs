//! Watching agent runs as their trajectories grow.
//!
//! Two modes: `stream` follows one run over SSE (framed by
//! `eventsource-stream`), `poll` refreshes every unfinished run of a solve
//! session on an interval.

pub mod poll;
pub mod stream;

pub use poll::{ArenaPoller, ArenaSnapshot, RunSnapshot, TrajectorySource, pending_runs};
pub use stream::{StreamPhase, TrajectorySnapshot, TrajectoryStream, apply_event};
