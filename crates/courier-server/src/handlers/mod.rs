//! HTTP handlers
//!
//! `realtime` carries the polling transport; `conversations` and `messages`
//! are the authenticated write paths that feed it.

pub mod conversations;
pub mod messages;
pub mod realtime;

pub use conversations::{join, leave, list_messages, send_message};
pub use messages::{delete_message, mark_read};
pub use realtime::{connect, disconnect, ping, poll};

use crate::error::{Error, Result};
use courier_common::ids;

/// Reject path ids outside `[A-Za-z0-9_-]` before they reach storage.
pub(crate) fn require_safe_id(kind: &str, id: &str) -> Result<()> {
    if ids::is_safe_id(id) {
        Ok(())
    } else {
        Err(Error::BadRequest(format!("Invalid {} id", kind)))
    }
}

pub async fn health_check() -> &'static str {
    "OK"
}
