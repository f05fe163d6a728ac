//! Polling sessions
//!
//! A session exists while its user keeps polling. There is no teardown
//! message: a user whose last poll is older than the TTL is simply dropped
//! by the sweeper.

use chrono::{DateTime, Utc};
use courier_common::ids;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub last_polled_at: DateTime<Utc>,
    #[serde(skip)]
    last_seen: Instant,
}

impl Session {
    fn new(user_id: &str) -> Self {
        let now = Utc::now();
        Self {
            session_id: ids::new_session_id(),
            user_id: user_id.to_string(),
            created_at: now,
            last_polled_at: now,
            last_seen: Instant::now(),
        }
    }

    fn refresh(&mut self) {
        self.last_polled_at = Utc::now();
        self.last_seen = Instant::now();
    }

    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.last_seen.elapsed() >= ttl
    }
}

/// One session per user id; concurrent tabs of the same user share it.
pub struct SessionRegistry {
    ttl: Duration,
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Record a poll. Returns the session and whether it was just created.
    pub fn touch(&self, user_id: &str) -> (Session, bool) {
        let mut sessions = self.sessions.write();
        match sessions.get_mut(user_id) {
            Some(session) if !session.is_stale(self.ttl) => {
                session.refresh();
                (session.clone(), false)
            }
            _ => {
                let session = Session::new(user_id);
                info!(
                    "[Session] {} connected as {}",
                    user_id, session.session_id
                );
                sessions.insert(user_id.to_string(), session.clone());
                (session, true)
            }
        }
    }

    pub fn get(&self, user_id: &str) -> Option<Session> {
        self.sessions.read().get(user_id).cloned()
    }

    pub fn remove(&self, user_id: &str) -> Option<Session> {
        let removed = self.sessions.write().remove(user_id);
        if let Some(session) = &removed {
            info!("[Session] {} disconnected ({})", user_id, session.session_id);
        }
        removed
    }

    /// Drop sessions past the missed-poll TTL. Returns their user ids.
    pub fn evict_stale(&self) -> Vec<String> {
        let ttl = self.ttl;
        let mut stale = Vec::new();
        self.sessions.write().retain(|user_id, session| {
            if session.is_stale(ttl) {
                stale.push(user_id.clone());
                false
            } else {
                true
            }
        });
        stale
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
