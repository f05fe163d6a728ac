//! JSON-file conversation storage
//!
//! Conversations are cached in memory and, when a data directory is
//! configured, written to one JSON file each using temp-file + rename so a
//! crash never leaves a half-written record.

use super::{ConversationStore, NewMessage};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_common::{ids, paths, Identity, Message};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub members: BTreeSet<String>,
    pub messages: Vec<Message>,
}

impl ConversationRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: Utc::now(),
            members: BTreeSet::new(),
            messages: Vec::new(),
        }
    }

    fn message_mut(&mut self, message_id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == message_id)
    }
}

pub struct JsonConversationStore {
    root: Option<PathBuf>,
    /// In-memory cache of loaded conversations
    conversations: RwLock<HashMap<String, Arc<RwLock<ConversationRecord>>>>,
    /// message id -> conversation id
    message_index: RwLock<HashMap<String, String>>,
}

impl JsonConversationStore {
    /// Store backed by `root`, loading any conversations already on disk
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        paths::ensure_layout(&root)?;

        let store = Self {
            root: Some(root),
            conversations: RwLock::new(HashMap::new()),
            message_index: RwLock::new(HashMap::new()),
        };
        store.load_existing().await?;

        info!(
            "JSON ConversationStore initialized with {} conversations",
            store.conversations.read().await.len()
        );
        Ok(store)
    }

    /// Store that never touches disk
    pub fn in_memory() -> Self {
        Self {
            root: None,
            conversations: RwLock::new(HashMap::new()),
            message_index: RwLock::new(HashMap::new()),
        }
    }

    fn record_path(root: &Path, conversation_id: &str) -> Result<PathBuf> {
        check_id(conversation_id)?;
        Ok(paths::conversations_dir(root).join(format!("{}.json", conversation_id)))
    }

    async fn load_existing(&self) -> Result<()> {
        let Some(root) = &self.root else {
            return Ok(());
        };

        let mut entries = fs::read_dir(paths::conversations_dir(root)).await?;
        let mut conversations = self.conversations.write().await;
        let mut index = self.message_index.write().await;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            match Self::load_record(&path).await {
                Ok(record) => {
                    for message in &record.messages {
                        index.insert(message.id.clone(), record.id.clone());
                    }
                    conversations.insert(record.id.clone(), Arc::new(RwLock::new(record)));
                }
                Err(e) => warn!("Failed to load conversation from {:?}: {}", path, e),
            }
        }

        info!("Loaded {} existing conversations from disk", conversations.len());
        Ok(())
    }

    async fn load_record(path: &Path) -> Result<ConversationRecord> {
        let content = fs::read_to_string(path).await?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse conversation JSON at {:?}", path))
    }

    /// Save a conversation to disk atomically
    async fn persist(&self, record: &ConversationRecord) -> Result<()> {
        let Some(root) = &self.root else {
            return Ok(());
        };

        let path = Self::record_path(root, &record.id)?;
        let temp_path = paths::tmp_dir(root).join(format!("{}.json.tmp", record.id));

        let json = serde_json::to_string_pretty(record)?;
        fs::write(&temp_path, json).await?;
        fs::rename(&temp_path, &path)
            .await
            .with_context(|| format!("Failed to replace {:?}", path))?;
        Ok(())
    }

    async fn get(&self, conversation_id: &str) -> Option<Arc<RwLock<ConversationRecord>>> {
        self.conversations.read().await.get(conversation_id).cloned()
    }

    /// Apply `update` to a copy of `record`, persist the copy, and only then
    /// swap it in. `update` returns its result and whether anything changed.
    async fn apply<T, F>(&self, record: &mut ConversationRecord, update: F) -> Result<T>
    where
        T: Send,
        F: FnOnce(&mut ConversationRecord) -> (T, bool) + Send,
    {
        let mut updated = record.clone();
        let (value, changed) = update(&mut updated);
        if changed {
            self.persist(&updated).await?;
            *record = updated;
        }
        Ok(value)
    }

    /// Modify an existing conversation; `None` if it does not exist.
    async fn modify<T, F>(&self, conversation_id: &str, update: F) -> Result<Option<T>>
    where
        T: Send,
        F: FnOnce(&mut ConversationRecord) -> (T, bool) + Send,
    {
        let Some(record_lock) = self.get(conversation_id).await else {
            return Ok(None);
        };
        let mut record = record_lock.write().await;
        self.apply(&mut record, update).await.map(Some)
    }

    /// Modify a conversation, creating it first if needed. A new
    /// conversation is cached only once it has been written.
    async fn modify_or_create<T, F>(&self, conversation_id: &str, update: F) -> Result<T>
    where
        T: Send,
        F: FnOnce(&mut ConversationRecord) -> (T, bool) + Send,
    {
        check_id(conversation_id)?;

        let record_lock = match self.get(conversation_id).await {
            Some(record_lock) => record_lock,
            None => {
                let mut conversations = self.conversations.write().await;
                match conversations.get(conversation_id) {
                    // Created concurrently.
                    Some(record_lock) => record_lock.clone(),
                    None => {
                        let mut record = ConversationRecord::new(conversation_id);
                        let (value, _) = update(&mut record);
                        self.persist(&record).await?;
                        info!("Created conversation {}", conversation_id);
                        conversations.insert(
                            conversation_id.to_string(),
                            Arc::new(RwLock::new(record)),
                        );
                        return Ok(value);
                    }
                }
            }
        };

        let mut record = record_lock.write().await;
        self.apply(&mut record, update).await
    }

    async fn conversation_of(&self, message_id: &str) -> Option<Arc<RwLock<ConversationRecord>>> {
        let conversation_id = self.message_index.read().await.get(message_id).cloned()?;
        self.get(&conversation_id).await
    }

    /// Apply `update` to a message and persist its conversation.
    async fn update_message<F>(&self, message_id: &str, update: F) -> Result<Option<Message>>
    where
        F: FnOnce(&mut Message) + Send,
    {
        let Some(record_lock) = self.conversation_of(message_id).await else {
            return Ok(None);
        };
        let mut record = record_lock.write().await;
        self.apply(&mut record, |conversation| match conversation.message_mut(message_id) {
            Some(message) => {
                update(message);
                (Some(message.clone()), true)
            }
            None => (None, false),
        })
        .await
    }

    pub async fn conversation_count(&self) -> usize {
        self.conversations.read().await.len()
    }
}

#[async_trait]
impl ConversationStore for JsonConversationStore {
    async fn members(&self, conversation_id: &str) -> Result<Option<Vec<String>>> {
        let Some(record) = self.get(conversation_id).await else {
            return Ok(None);
        };
        let record = record.read().await;
        Ok(Some(record.members.iter().cloned().collect()))
    }

    async fn add_member(&self, conversation_id: &str, user_id: &str) -> Result<bool> {
        self.modify_or_create(conversation_id, |record| {
            let added = record.members.insert(user_id.to_string());
            (added, added)
        })
        .await
    }

    async fn remove_member(&self, conversation_id: &str, user_id: &str) -> Result<bool> {
        let removed = self
            .modify(conversation_id, |record| {
                let removed = record.members.remove(user_id);
                (removed, removed)
            })
            .await?;
        Ok(removed.unwrap_or(false))
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        sender: &Identity,
        input: NewMessage,
    ) -> Result<Message> {
        let message = Message::new(conversation_id, sender, input.content)
            .with_attachments(input.attachments)
            .with_client_id(input.client_id);

        let stored = message.clone();
        self.modify_or_create(conversation_id, move |record| {
            record.messages.push(stored);
            ((), true)
        })
        .await?;

        self.message_index
            .write()
            .await
            .insert(message.id.clone(), conversation_id.to_string());

        info!(
            "Stored message {} in conversation {} from {}",
            message.id, conversation_id, sender.user_id
        );
        Ok(message)
    }

    async fn get_message(&self, message_id: &str) -> Result<Option<Message>> {
        let Some(record_lock) = self.conversation_of(message_id).await else {
            return Ok(None);
        };
        let record = record_lock.read().await;
        Ok(record.messages.iter().find(|m| m.id == message_id).cloned())
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Option<Vec<Message>>> {
        let Some(record) = self.get(conversation_id).await else {
            return Ok(None);
        };
        let record = record.read().await;
        Ok(Some(record.messages.clone()))
    }

    async fn mark_read(&self, message_id: &str, user_id: &str) -> Result<Option<Message>> {
        let reader = user_id.to_string();
        self.update_message(message_id, move |message| {
            message.read_by.insert(reader);
        })
        .await
    }

    async fn soft_delete(&self, message_id: &str) -> Result<Option<Message>> {
        self.update_message(message_id, |message| {
            message.deleted = true;
        })
        .await
    }
}

fn check_id(conversation_id: &str) -> Result<()> {
    if !ids::is_safe_id(conversation_id) {
        anyhow::bail!("Invalid conversation id {:?}", conversation_id);
    }
    Ok(())
}
