//! Typed error hierarchy for issuedesk.
//!
//! Three top-level enums cover the three transports:
//! - `ClientError`: REST calls against the backend
//! - `RealtimeError`: the session WebSocket
//! - `StreamError`: per-run trajectory SSE channels

use thiserror::Error;

/// Errors from the REST client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Not authenticated; run `issuedesk login` first")]
    Unauthorized,

    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("Backend returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Invalid base URL '{0}'")]
    InvalidUrl(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Session context has shut down")]
    ContextClosed,

    #[error("No active session; run `issuedesk session new` or `issuedesk session use`")]
    NoActiveSession,
}

impl ClientError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

/// Errors from the session WebSocket.
#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("WebSocket connect to {url} failed: {source}")]
    Connect {
        url: String,
        #[source]
        source: Box<tokio_tungstenite::tungstenite::Error>,
    },

    #[error("WebSocket transport error: {0}")]
    Transport(#[source] Box<tokio_tungstenite::tungstenite::Error>),

    #[error("Gave up reconnecting after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    #[error("Server error: {message}")]
    Server {
        message: String,
        code: Option<String>,
    },

    #[error("Realtime manager is no longer running")]
    Closed,

    #[error("Failed to encode outbound frame: {0}")]
    Encode(#[source] serde_json::Error),
}

impl RealtimeError {
    /// Terminal errors end the manager; everything else is reported and survived.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ReconnectExhausted { .. } | Self::Closed)
    }
}

/// Errors from a trajectory SSE channel.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("Trajectory stream transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Server reported: {0}")]
    Server(String),

    #[error("Malformed event stream: {0}")]
    Framing(String),

    #[error("Stream ended before the run finished")]
    UnexpectedEof,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_error_unauthorized_is_matchable() {
        let err = ClientError::Unauthorized;
        assert!(err.is_unauthorized());
        assert!(err.to_string().contains("login"));
    }

    #[test]
    fn client_error_status_carries_code_and_message() {
        let err = ClientError::Status {
            status: 422,
            message: "title required".to_string(),
        };
        match &err {
            ClientError::Status { status, message } => {
                assert_eq!(*status, 422);
                assert_eq!(message, "title required");
            }
            _ => panic!("Expected Status"),
        }
        assert!(err.to_string().contains("422"));
        assert!(!err.is_unauthorized());
    }

    #[test]
    fn realtime_error_terminal_classification() {
        assert!(RealtimeError::ReconnectExhausted { attempts: 5 }.is_terminal());
        assert!(RealtimeError::Closed.is_terminal());
        let server = RealtimeError::Server {
            message: "oops".into(),
            code: None,
        };
        assert!(!server.is_terminal());
    }

    #[test]
    fn reconnect_exhausted_mentions_attempts() {
        let err = RealtimeError::ReconnectExhausted { attempts: 5 };
        assert!(err.to_string().contains('5'));
    }

    #[test]
    fn stream_error_converts_from_client_error() {
        let err: StreamError = ClientError::Unauthorized.into();
        assert!(matches!(err, StreamError::Client(ClientError::Unauthorized)));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&ClientError::NoActiveSession);
        assert_std_error(&RealtimeError::Closed);
        assert_std_error(&StreamError::UnexpectedEof);
    }
}
