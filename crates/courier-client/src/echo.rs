//! Optimistic echo bookkeeping
//!
//! Every message the local user sends is shown immediately under a `temp-`
//! id. When the authoritative copy shows up (POST response or a polled
//! fan-out) it replaces the temporary one instead of rendering twice.

use courier_common::Message;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// Not one of ours; render it.
    New,
    /// Authoritative copy of the optimistic message with this temp id.
    Replaces(String),
    /// Already reconciled through another path.
    Duplicate,
}

#[derive(Debug)]
struct PendingEcho {
    conversation_id: String,
    sender_id: String,
    content: String,
    tracked_at: Instant,
}

#[derive(Debug)]
pub struct PendingEchoes {
    window: Duration,
    pending: HashMap<String, PendingEcho>,
    /// Authoritative and temp ids already reconciled, kept for one window.
    confirmed: HashMap<String, Instant>,
}

impl PendingEchoes {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
            confirmed: HashMap::new(),
        }
    }

    pub fn track(&mut self, optimistic: &Message) {
        self.prune();
        self.pending.insert(
            optimistic.id.clone(),
            PendingEcho {
                conversation_id: optimistic.conversation_id.clone(),
                sender_id: optimistic.sender_id.clone(),
                content: optimistic.content.clone(),
                tracked_at: Instant::now(),
            },
        );
    }

    pub fn forget(&mut self, temp_id: &str) -> bool {
        self.pending.remove(temp_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn reconcile(&mut self, message: &Message) -> Reconciliation {
        self.prune();

        let seen_client_id = message
            .client_id
            .as_deref()
            .is_some_and(|id| self.confirmed.contains_key(id));
        if seen_client_id || self.confirmed.contains_key(&message.id) {
            return Reconciliation::Duplicate;
        }

        let matched = message
            .client_id
            .as_deref()
            .filter(|id| self.pending.contains_key(*id))
            .map(str::to_string)
            .or_else(|| self.match_by_content(message));

        match matched {
            Some(temp_id) => {
                self.pending.remove(&temp_id);
                let now = Instant::now();
                self.confirmed.insert(message.id.clone(), now);
                self.confirmed.insert(temp_id.clone(), now);
                Reconciliation::Replaces(temp_id)
            }
            None => Reconciliation::New,
        }
    }

    /// Oldest pending echo with the same conversation, sender and content.
    fn match_by_content(&self, message: &Message) -> Option<String> {
        self.pending
            .iter()
            .filter(|(_, p)| {
                p.conversation_id == message.conversation_id
                    && p.sender_id == message.sender_id
                    && p.content == message.content
            })
            .min_by_key(|(_, p)| p.tracked_at)
            .map(|(id, _)| id.clone())
    }

    fn prune(&mut self) {
        let window = self.window;
        self.pending.retain(|_, p| p.tracked_at.elapsed() < window);
        self.confirmed.retain(|_, at| at.elapsed() < window);
    }
}
