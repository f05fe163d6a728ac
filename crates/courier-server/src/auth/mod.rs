//! Session authentication
//!
//! Courier does not issue credentials. It resolves an opaque session token
//! (cookie first, bearer header second) through an [`Authenticator`].

mod middleware;

pub use courier_common::api::SESSION_COOKIE;
pub use middleware::{mw_require_auth, session_token};

use async_trait::async_trait;
use courier_common::Identity;
use parking_lot::RwLock;
use std::collections::HashMap;

#[async_trait]
pub trait Authenticator: Send + Sync + 'static {
    /// Resolve a session token, or `None` when it is unknown.
    async fn authenticate(&self, token: &str) -> Option<Identity>;
}

/// Fixed token table, seeded from configuration.
#[derive(Default)]
pub struct TokenAuthenticator {
    tokens: RwLock<HashMap<String, Identity>>,
}

impl TokenAuthenticator {
    pub fn new(tokens: impl IntoIterator<Item = (String, Identity)>) -> Self {
        Self {
            tokens: RwLock::new(tokens.into_iter().collect()),
        }
    }

    pub fn insert(&self, token: impl Into<String>, identity: Identity) {
        self.tokens.write().insert(token.into(), identity);
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.tokens.write().remove(token).is_some()
    }

    pub fn len(&self) -> usize {
        self.tokens.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Authenticator for TokenAuthenticator {
    async fn authenticate(&self, token: &str) -> Option<Identity> {
        self.tokens.read().get(token).cloned()
    }
}
