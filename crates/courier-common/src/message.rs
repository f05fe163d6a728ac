use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::ids;

/// An authenticated user as resolved by the server's authenticator or the
/// client's identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: String,
    pub name: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            name: name.into(),
        }
    }
}

/// Denormalized sender details stored on every message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderSnapshot {
    pub id: String,
    pub name: String,
}

impl From<&Identity> for SenderSnapshot {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.user_id.clone(),
            name: identity.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub url: String,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// A persisted chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
    pub sender: SenderSnapshot,
    /// Tombstone for deleted messages
    #[serde(default)]
    pub deleted: bool,
    /// Temporary id the sending client used for its optimistic copy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub read_by: BTreeSet<String>,
}

impl Message {
    pub fn new(
        conversation_id: impl Into<String>,
        sender: &Identity,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: ids::new_message_id(),
            conversation_id: conversation_id.into(),
            sender_id: sender.user_id.clone(),
            content: content.into(),
            attachments: Vec::new(),
            created_at: Utc::now(),
            sender: SenderSnapshot::from(sender),
            deleted: false,
            client_id: None,
            read_by: BTreeSet::new(),
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn with_client_id(mut self, client_id: Option<String>) -> Self {
        self.client_id = client_id;
        self
    }

    /// True for locally fabricated copies that have not been persisted.
    pub fn is_optimistic(&self) -> bool {
        ids::is_temp_id(&self.id)
    }
}
