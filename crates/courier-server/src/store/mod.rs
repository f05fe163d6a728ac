//! Conversation storage
//!
//! Messages and membership are the source of truth; mailboxes are only a
//! low-latency hint on top. Handlers talk to storage through
//! [`ConversationStore`].

pub mod json_store;

pub use json_store::{ConversationRecord, JsonConversationStore};

use anyhow::Result;
use async_trait::async_trait;
use courier_common::{Attachment, Identity, Message};

/// Input for [`ConversationStore::append_message`].
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub client_id: Option<String>,
}

#[async_trait]
pub trait ConversationStore: Send + Sync + 'static {
    /// Member ids of a conversation, or `None` if it does not exist.
    async fn members(&self, conversation_id: &str) -> Result<Option<Vec<String>>>;

    /// Add a member, creating the conversation if needed. Returns `false`
    /// when the user was already a member.
    async fn add_member(&self, conversation_id: &str, user_id: &str) -> Result<bool>;

    /// Returns `false` when the user was not a member.
    async fn remove_member(&self, conversation_id: &str, user_id: &str) -> Result<bool>;

    async fn append_message(
        &self,
        conversation_id: &str,
        sender: &Identity,
        input: NewMessage,
    ) -> Result<Message>;

    async fn get_message(&self, message_id: &str) -> Result<Option<Message>>;

    /// Messages in creation order, tombstones included.
    async fn list_messages(&self, conversation_id: &str) -> Result<Option<Vec<Message>>>;

    /// Record a read marker. Returns the updated message.
    async fn mark_read(&self, message_id: &str, user_id: &str) -> Result<Option<Message>>;

    /// Tombstone a message. Returns the updated message.
    async fn soft_delete(&self, message_id: &str) -> Result<Option<Message>>;
}
