//! Shared types for issuedesk: mirrors of the backend DTOs and the
//! realtime wire envelopes.

pub mod models;
pub mod protocol;

pub use models::*;
pub use protocol::{
    CardChange, InboundUpdate, OutboundEnvelope, ProtocolError, RunStatusEvent, ServerError,
    Timestamp, TrajectoryEvent, TrajectoryUpdate, UpdateKind, UpdatePayload,
};
