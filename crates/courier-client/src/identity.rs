//! Current-user identity
//!
//! The transport never checks authentication itself; the embedding
//! application injects one provider that every operation consults.

use courier_common::Identity;
use parking_lot::RwLock;

pub trait IdentityProvider: Send + Sync + 'static {
    /// The signed-in user, or `None` when signed out.
    fn current(&self) -> Option<Identity>;
}

/// Identity held in memory and swapped on sign-in / sign-out.
#[derive(Default)]
pub struct StaticIdentity {
    identity: RwLock<Option<Identity>>,
}

impl StaticIdentity {
    pub fn new(identity: Option<Identity>) -> Self {
        Self {
            identity: RwLock::new(identity),
        }
    }

    pub fn signed_in(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(Some(Identity::new(user_id, name)))
    }

    pub fn set(&self, identity: Option<Identity>) {
        *self.identity.write() = identity;
    }
}

impl IdentityProvider for StaticIdentity {
    fn current(&self) -> Option<Identity> {
        self.identity.read().clone()
    }
}
