//! Realtime channel wire protocol.
//!
//! Every frame on `/ws`, in either direction, is one JSON envelope:
//!
//! ```text
//! { "type": "<event type>", "payload": { ... }, "timestamp": "<ISO-8601>" }
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize, Serializer};
use serde_json::{json, Map, Value};

use crate::error::ProtocolError;

/// Event type strings
pub mod event_types {
    pub const JOIN_CONVERSATION: &str = "join_conversation";
    pub const LEAVE_CONVERSATION: &str = "leave_conversation";
    pub const TYPING_START: &str = "typing_start";
    pub const TYPING_STOP: &str = "typing_stop";
    pub const MARK_READ: &str = "mark_read";
}

/// Type tag of a [`Message`].
///
/// The client only ever sends the named variants; anything the server pushes
/// that we don't know about lands in `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    JoinConversation,
    LeaveConversation,
    TypingStart,
    TypingStop,
    MarkRead,
    Custom(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::JoinConversation => event_types::JOIN_CONVERSATION,
            Self::LeaveConversation => event_types::LEAVE_CONVERSATION,
            Self::TypingStart => event_types::TYPING_START,
            Self::TypingStop => event_types::TYPING_STOP,
            Self::MarkRead => event_types::MARK_READ,
            Self::Custom(s) => s,
        }
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        match s {
            event_types::JOIN_CONVERSATION => Self::JoinConversation,
            event_types::LEAVE_CONVERSATION => Self::LeaveConversation,
            event_types::TYPING_START => Self::TypingStart,
            event_types::TYPING_STOP => Self::TypingStop,
            event_types::MARK_READ => Self::MarkRead,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl From<String> for EventType {
    fn from(s: String) -> Self {
        match Self::from(s.as_str()) {
            Self::Custom(_) => Self::Custom(s),
            known => known,
        }
    }
}

impl From<EventType> for String {
    fn from(event_type: EventType) -> Self {
        match event_type {
            EventType::Custom(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The realtime envelope. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    event_type: EventType,
    #[serde(default = "empty_payload")]
    payload: Value,
    #[serde(serialize_with = "serialize_timestamp")]
    timestamp: DateTime<Utc>,
}

fn empty_payload() -> Value {
    Value::Object(Map::new())
}

// Millisecond precision with a `Z` suffix, the same shape browsers produce.
fn serialize_timestamp<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

impl Message {
    /// Build a message stamped with the current time.
    pub fn new(event_type: impl Into<EventType>, payload: Value) -> Self {
        Self::at(event_type, payload, Utc::now())
    }

    pub fn at(event_type: impl Into<EventType>, payload: Value, timestamp: DateTime<Utc>) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            timestamp,
        }
    }

    pub fn from_event(event: &ClientEvent) -> Self {
        Self::new(event.event_type(), event.payload())
    }

    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Decode the payload into one of the typed shapes.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        T::deserialize(&self.payload).map_err(ProtocolError::Decode)
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }
}

/// Payload of the join/leave/typing events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRef {
    pub conversation_id: String,
}

/// Payload of `mark_read`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub conversation_id: String,
    pub message_id: String,
}

/// Events a client sends over the realtime channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    JoinConversation { conversation_id: String },
    LeaveConversation { conversation_id: String },
    TypingStart { conversation_id: String },
    TypingStop { conversation_id: String },
    MarkRead { conversation_id: String, message_id: String },
}

impl ClientEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            ClientEvent::JoinConversation { .. } => EventType::JoinConversation,
            ClientEvent::LeaveConversation { .. } => EventType::LeaveConversation,
            ClientEvent::TypingStart { .. } => EventType::TypingStart,
            ClientEvent::TypingStop { .. } => EventType::TypingStop,
            ClientEvent::MarkRead { .. } => EventType::MarkRead,
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            ClientEvent::JoinConversation { conversation_id }
            | ClientEvent::LeaveConversation { conversation_id }
            | ClientEvent::TypingStart { conversation_id }
            | ClientEvent::TypingStop { conversation_id } => {
                json!({ "conversationId": conversation_id })
            }
            ClientEvent::MarkRead {
                conversation_id,
                message_id,
            } => json!({ "conversationId": conversation_id, "messageId": message_id }),
        }
    }
}
