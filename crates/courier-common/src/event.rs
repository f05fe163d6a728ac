//! Delivery events
//!
//! An [`Event`] is one entry in a recipient's mailbox. The `data` field is
//! kept as raw JSON on the wire; [`Event::decode`] turns it into a typed
//! [`EventPayload`] according to `type`.
//!
//! # Wire Format
//!
//! ```text
//! {
//!   "id": "4f0c...",
//!   "seq": 42,
//!   "type": "message:new",
//!   "data": { ...Message... },
//!   "timestamp": "2026-01-01T12:00:00Z",
//!   "userId": "u1",
//!   "conversationId": "c1"
//! }
//! ```

use crate::error::{ProtocolError, Result};
use crate::message::Message;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "message:new")]
    MessageNew,
    #[serde(rename = "message:read")]
    MessageRead,
    #[serde(rename = "conversation:joined")]
    ConversationJoined,
    #[serde(rename = "conversation:left")]
    ConversationLeft,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "welcome")]
    Welcome,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::MessageNew => "message:new",
            EventType::MessageRead => "message:read",
            EventType::ConversationJoined => "conversation:joined",
            EventType::ConversationLeft => "conversation:left",
            EventType::Error => "error",
            EventType::Pong => "pong",
            EventType::Welcome => "welcome",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single mailbox entry addressed to `user_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    /// Assigned by the server mailbox at enqueue time; zero until then.
    #[serde(default)]
    pub seq: u64,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl Event {
    pub fn new(event_type: EventType, user_id: impl Into<String>, data: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            seq: 0,
            event_type,
            data,
            timestamp: Utc::now(),
            user_id: user_id.into(),
            conversation_id: None,
        }
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn message_new(user_id: impl Into<String>, message: &Message) -> Self {
        Self::new(EventType::MessageNew, user_id, to_value(message))
            .with_conversation(message.conversation_id.clone())
    }

    pub fn message_read(user_id: impl Into<String>, receipt: &ReadReceipt) -> Self {
        Self::new(EventType::MessageRead, user_id, to_value(receipt))
            .with_conversation(receipt.conversation_id.clone())
    }

    pub fn membership(user_id: impl Into<String>, change: &MembershipChange, joined: bool) -> Self {
        let event_type = if joined {
            EventType::ConversationJoined
        } else {
            EventType::ConversationLeft
        };
        Self::new(event_type, user_id, to_value(change))
            .with_conversation(change.conversation_id.clone())
    }

    pub fn error(user_id: impl Into<String>, message: impl Into<String>) -> Self {
        let payload = ErrorPayload {
            message: message.into(),
        };
        Self::new(EventType::Error, user_id, to_value(&payload))
    }

    pub fn pong(user_id: impl Into<String>) -> Self {
        Self::new(EventType::Pong, user_id, Value::Object(Default::default()))
    }

    pub fn welcome(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        let payload = Welcome {
            session_id: session_id.into(),
        };
        Self::new(EventType::Welcome, user_id, to_value(&payload))
    }

    /// Deserialize `data` as `T` without checking the event type.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.data.clone())?)
    }

    /// Decode `data` according to `type`.
    pub fn decode(&self) -> Result<EventPayload> {
        Ok(match self.event_type {
            EventType::MessageNew => EventPayload::MessageNew(self.payload()?),
            EventType::MessageRead => EventPayload::MessageRead(self.payload()?),
            EventType::ConversationJoined => EventPayload::ConversationJoined(self.payload()?),
            EventType::ConversationLeft => EventPayload::ConversationLeft(self.payload()?),
            EventType::Error => EventPayload::Error(self.payload()?),
            EventType::Pong => EventPayload::Pong,
            EventType::Welcome => EventPayload::Welcome(self.payload()?),
        })
    }

    /// Decode a `message:new` payload, rejecting any other event type.
    pub fn message(&self) -> Result<Message> {
        match self.event_type {
            EventType::MessageNew => self.payload(),
            other => Err(ProtocolError::PayloadMismatch {
                expected: EventType::MessageNew.as_str(),
                actual: other.as_str(),
            }),
        }
    }
}

fn to_value<T: Serialize>(payload: &T) -> Value {
    // Payload types here are plain structs with string keys; serialization cannot fail.
    serde_json::to_value(payload).unwrap_or_default()
}

/// Typed view of [`Event::data`].
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    MessageNew(Message),
    MessageRead(ReadReceipt),
    ConversationJoined(MembershipChange),
    ConversationLeft(MembershipChange),
    Error(ErrorPayload),
    Pong,
    Welcome(Welcome),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub message_id: String,
    pub conversation_id: String,
    pub reader_id: String,
    pub read_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipChange {
    pub conversation_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Welcome {
    pub session_id: String,
}
