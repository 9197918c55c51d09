//! Wire envelopes for the session WebSocket and the trajectory SSE channel.
//!
//! Inbound frames are decoded in two steps: the envelope first (`type`,
//! `timestamp`, raw `data`), then `data` into the variant selected by
//! `type`. The result is a closed sum type, so consumers match
//! exhaustively instead of poking at loose JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::models::{
    AgentStatusPatch, ContextCard, Message, RunStatus, SessionPatch, StatisticsPatch,
    TrajectoryEntry, TrajectoryInfo,
};

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid JSON frame: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Invalid {kind} payload: {source}")]
    InvalidPayload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    #[error("Unknown event '{0}'")]
    UnknownEvent(String),
}

// ── Timestamps ───────────────────────────────────────────────────────

/// Milliseconds since the Unix epoch.
///
/// Accepts a JSON number (integer or float) or an RFC 3339 string on the
/// way in; always serializes as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    pub fn millis(&self) -> i64 {
        self.0
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.0)
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp_millis())
    }
}

impl std::str::FromStr for Timestamp {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(millis) = s.parse::<i64>() {
            return Ok(Self(millis));
        }
        DateTime::parse_from_rfc3339(s)
            .map(|dt| Self(dt.with_timezone(&Utc).timestamp_millis()))
            .map_err(|_| ProtocolError::InvalidTimestamp(s.to_string()))
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.0)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Float(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Int(millis) => Ok(Self(millis)),
            Raw::Float(millis) => Ok(Self(millis as i64)),
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

// ── Session WebSocket ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateKind {
    SessionUpdate,
    Message,
    ContextCard,
    AgentStatus,
    Statistics,
    Heartbeat,
    Error,
}

impl UpdateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionUpdate => "SESSION_UPDATE",
            Self::Message => "MESSAGE",
            Self::ContextCard => "CONTEXT_CARD",
            Self::AgentStatus => "AGENT_STATUS",
            Self::Statistics => "STATISTICS",
            Self::Heartbeat => "HEARTBEAT",
            Self::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Context-card mutation carried by a `CONTEXT_CARD` update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CardChange {
    Add { card: ContextCard },
    Remove { card_id: String },
    Batch { cards: Vec<ContextCard> },
}

/// Error reported by the server, either as a bare string or an object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerError {
    pub message: String,
    pub code: Option<String>,
}

impl<'de> Deserialize<'de> for ServerError {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Object {
                #[serde(alias = "error", alias = "detail")]
                message: String,
                #[serde(default)]
                code: Option<String>,
            },
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(message) => Self {
                message,
                code: None,
            },
            Raw::Object { message, code } => Self { message, code },
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdatePayload {
    SessionUpdate(SessionPatch),
    Message(Message),
    ContextCard(CardChange),
    AgentStatus(AgentStatusPatch),
    Statistics(StatisticsPatch),
    Heartbeat,
    Error(ServerError),
}

impl UpdatePayload {
    pub fn kind(&self) -> UpdateKind {
        match self {
            Self::SessionUpdate(_) => UpdateKind::SessionUpdate,
            Self::Message(_) => UpdateKind::Message,
            Self::ContextCard(_) => UpdateKind::ContextCard,
            Self::AgentStatus(_) => UpdateKind::AgentStatus,
            Self::Statistics(_) => UpdateKind::Statistics,
            Self::Heartbeat => UpdateKind::Heartbeat,
            Self::Error(_) => UpdateKind::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InboundUpdate {
    pub timestamp: Timestamp,
    pub payload: UpdatePayload,
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: UpdateKind,
    #[serde(default)]
    data: serde_json::Value,
    timestamp: Timestamp,
}

fn decode_data<T: serde::de::DeserializeOwned>(
    kind: UpdateKind,
    data: serde_json::Value,
) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|source| ProtocolError::InvalidPayload {
        kind: kind.as_str(),
        source,
    })
}

impl InboundUpdate {
    /// Decode one text frame from the session socket.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let raw: RawEnvelope = serde_json::from_str(text).map_err(ProtocolError::InvalidJson)?;
        let payload = match raw.kind {
            UpdateKind::SessionUpdate => UpdatePayload::SessionUpdate(decode_data(raw.kind, raw.data)?),
            UpdateKind::Message => UpdatePayload::Message(decode_data(raw.kind, raw.data)?),
            UpdateKind::ContextCard => UpdatePayload::ContextCard(decode_data(raw.kind, raw.data)?),
            UpdateKind::AgentStatus => UpdatePayload::AgentStatus(decode_data(raw.kind, raw.data)?),
            UpdateKind::Statistics => UpdatePayload::Statistics(decode_data(raw.kind, raw.data)?),
            UpdateKind::Heartbeat => UpdatePayload::Heartbeat,
            UpdateKind::Error => UpdatePayload::Error(decode_data(raw.kind, raw.data)?),
        };
        Ok(Self {
            timestamp: raw.timestamp,
            payload,
        })
    }

    pub fn kind(&self) -> UpdateKind {
        self.payload.kind()
    }

    /// Identity used for duplicate suppression: type followed by timestamp.
    pub fn update_id(&self) -> String {
        format!("{}{}", self.kind().as_str(), self.timestamp.0)
    }
}

/// Client-to-server frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEnvelope {
    #[serde(rename = "type")]
    pub kind: UpdateKind,
    pub data: serde_json::Value,
    pub timestamp: Timestamp,
    pub id: String,
}

impl OutboundEnvelope {
    pub fn new(kind: UpdateKind, data: serde_json::Value) -> Self {
        Self {
            kind,
            data,
            timestamp: Timestamp::now(),
            id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn heartbeat() -> Self {
        Self::new(UpdateKind::Heartbeat, serde_json::json!({}))
    }
}

// ── Trajectory SSE ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrajectoryUpdate {
    #[serde(default)]
    pub messages: Vec<TrajectoryEntry>,
    pub message_count: usize,
    #[serde(default)]
    pub info: Option<TrajectoryInfo>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RunStatusEvent {
    pub status: RunStatus,
    #[serde(default)]
    pub message: Option<String>,
}

/// Named events on a run's trajectory stream.
#[derive(Debug, Clone, PartialEq)]
pub enum TrajectoryEvent {
    Update(TrajectoryUpdate),
    Status(RunStatusEvent),
    Error(ServerError),
    Done,
    Heartbeat,
}

impl TrajectoryEvent {
    /// Decode an SSE event by name. `done` and `heartbeat` ignore their payload.
    pub fn decode(event: &str, data: &str) -> Result<Self, ProtocolError> {
        match event {
            "trajectory_update" => Ok(Self::Update(named_payload("trajectory_update", data)?)),
            "status" => Ok(Self::Status(named_payload("status", data)?)),
            "error" => Ok(Self::Error(named_payload("error", data)?)),
            "done" => Ok(Self::Done),
            "heartbeat" => Ok(Self::Heartbeat),
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }
}

fn named_payload<T: serde::de::DeserializeOwned>(
    kind: &'static str,
    data: &str,
) -> Result<T, ProtocolError> {
    serde_json::from_str(data).map_err(|source| ProtocolError::InvalidPayload { kind, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CardSource;

    #[test]
    fn test_timestamp_accepts_number_and_rfc3339() {
        let from_int: Timestamp = serde_json::from_str("1700000000123").unwrap();
        assert_eq!(from_int.millis(), 1_700_000_000_123);

        let from_float: Timestamp = serde_json::from_str("1700000000123.7").unwrap();
        assert_eq!(from_float.millis(), 1_700_000_000_123);

        let from_text: Timestamp = serde_json::from_str("\"2024-01-01T00:00:01Z\"").unwrap();
        assert_eq!(from_text.millis(), 1_704_067_201_000);

        assert!(serde_json::from_str::<Timestamp>("\"yesterday\"").is_err());
    }

    #[test]
    fn test_decode_message_update() {
        let frame = r#"{
            "type": "MESSAGE",
            "timestamp": 1000,
            "data": {"id": "m1", "role": "user", "content": "hello", "timestamp": "2024-01-01T00:00:00Z"}
        }"#;
        let update = InboundUpdate::decode(frame).unwrap();
        assert_eq!(update.kind(), UpdateKind::Message);
        assert_eq!(update.update_id(), "MESSAGE1000");
        match update.payload {
            UpdatePayload::Message(msg) => assert_eq!(msg.content, "hello"),
            other => panic!("Expected Message, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_context_card_batch() {
        let frame = r#"{
            "type": "CONTEXT_CARD",
            "timestamp": 5,
            "data": {"action": "batch", "cards": [
                {"id": "c1", "title": "t", "content": "x", "source": "file"}
            ]}
        }"#;
        let update = InboundUpdate::decode(frame).unwrap();
        match update.payload {
            UpdatePayload::ContextCard(CardChange::Batch { cards }) => {
                assert_eq!(cards.len(), 1);
                assert_eq!(cards[0].source, CardSource::File);
            }
            other => panic!("Expected card batch, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_heartbeat_without_data() {
        let update = InboundUpdate::decode(r#"{"type":"HEARTBEAT","timestamp":1}"#).unwrap();
        assert_eq!(update.payload, UpdatePayload::Heartbeat);
    }

    #[test]
    fn test_decode_error_as_string_or_object() {
        let update =
            InboundUpdate::decode(r#"{"type":"ERROR","timestamp":1,"data":"boom"}"#).unwrap();
        assert_eq!(
            update.payload,
            UpdatePayload::Error(ServerError {
                message: "boom".into(),
                code: None
            })
        );

        let update = InboundUpdate::decode(
            r#"{"type":"ERROR","timestamp":1,"data":{"message":"bad","code":"E1"}}"#,
        )
        .unwrap();
        match update.payload {
            UpdatePayload::Error(err) => assert_eq!(err.code.as_deref(), Some("E1")),
            other => panic!("Expected Error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_unknown_type_and_bad_payload() {
        assert!(matches!(
            InboundUpdate::decode(r#"{"type":"NOPE","timestamp":1,"data":{}}"#),
            Err(ProtocolError::InvalidJson(_))
        ));
        assert!(matches!(
            InboundUpdate::decode(r#"{"type":"MESSAGE","timestamp":1,"data":{"id":3}}"#),
            Err(ProtocolError::InvalidPayload { kind: "MESSAGE", .. })
        ));
        assert!(InboundUpdate::decode("not json").is_err());
    }

    #[test]
    fn test_outbound_envelope_shape() {
        let env = OutboundEnvelope::new(UpdateKind::Message, serde_json::json!({"content": "hi"}));
        let json: serde_json::Value = serde_json::to_value(&env).unwrap();
        assert_eq!(json["type"], "MESSAGE");
        assert_eq!(json["data"]["content"], "hi");
        assert!(json["timestamp"].is_i64());
        assert_eq!(json["id"].as_str().unwrap().len(), 36);
    }

    #[test]
    fn test_trajectory_event_decode() {
        let event = TrajectoryEvent::decode(
            "trajectory_update",
            r#"{"messages":[{"role":"assistant","content":"ls"}],"message_count":1}"#,
        )
        .unwrap();
        match event {
            TrajectoryEvent::Update(update) => {
                assert_eq!(update.message_count, 1);
                assert_eq!(update.messages[0].content, "ls");
            }
            other => panic!("Expected Update, got {:?}", other),
        }

        assert_eq!(TrajectoryEvent::decode("done", "").unwrap(), TrajectoryEvent::Done);
        assert_eq!(
            TrajectoryEvent::decode("heartbeat", "{}").unwrap(),
            TrajectoryEvent::Heartbeat
        );
        assert!(matches!(
            TrajectoryEvent::decode("status", r#"{"status":"completed"}"#).unwrap(),
            TrajectoryEvent::Status(RunStatusEvent {
                status: RunStatus::Completed,
                ..
            })
        ));
        assert!(TrajectoryEvent::decode("status", "{").is_err());
        assert!(matches!(
            TrajectoryEvent::decode("mystery", "{}"),
            Err(ProtocolError::UnknownEvent(_))
        ));
    }
}
