//! Identifier helpers
//!
//! Server-assigned ids are bare UUIDs. Client-side optimistic copies use a
//! `temp-` prefix so the two can never collide.

use uuid::Uuid;

pub const TEMP_ID_PREFIX: &str = "temp-";

pub fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn new_session_id() -> String {
    format!("sess-{}", Uuid::new_v4())
}

pub fn new_temp_id() -> String {
    format!("{}{}", TEMP_ID_PREFIX, Uuid::new_v4())
}

pub fn is_temp_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

/// Longest id accepted from clients.
pub const MAX_ID_LEN: usize = 128;

/// Client-supplied ids are limited to `[A-Za-z0-9_-]` so they are safe as
/// file names and path segments.
pub fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_ids_are_distinguishable() {
        let temp = new_temp_id();
        assert!(is_temp_id(&temp));
        assert!(!is_temp_id(&new_message_id()));
        assert_ne!(new_temp_id(), temp);
    }

    #[test]
    fn test_safe_ids() {
        assert!(is_safe_id("c1"));
        assert!(is_safe_id(&new_message_id()));
        assert!(is_safe_id(&new_temp_id()));
        assert!(is_safe_id("team_chat-2"));

        assert!(!is_safe_id(""));
        assert!(!is_safe_id("../../escaped"));
        assert!(!is_safe_id("a/b"));
        assert!(!is_safe_id("a.json"));
        assert!(!is_safe_id("a?b"));
        assert!(!is_safe_id(&"x".repeat(MAX_ID_LEN + 1)));
    }
}
