//! Courier server configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use courier_common::{paths, Identity};
use tracing::warn;

use crate::auth::Authenticator;
use crate::realtime::Realtime;
use crate::store::ConversationStore;

/// Configuration for the Courier server
#[derive(Clone, Debug)]
pub struct CourierConfig {
    /// Listen address
    pub addr: SocketAddr,
    /// Root data directory; `None` keeps conversations in memory only
    pub data_dir: Option<PathBuf>,
    /// How long an undelivered event may sit in a mailbox
    pub mailbox_ttl: Duration,
    /// Per-user mailbox cap; the oldest events are dropped beyond it
    pub max_mailbox_len: usize,
    /// Missed-poll timeout after which a session is discarded
    pub session_ttl: Duration,
    /// Wait budget used when a poll does not send `timeout`
    pub default_poll_timeout: Duration,
    /// Upper bound on any poll's wait budget
    pub max_poll_timeout: Duration,
    /// Interval of the eviction sweeper
    pub sweep_interval: Duration,
    /// Also deliver `message:new` to the sender's own mailbox
    pub echo_to_sender: bool,
    /// Accept polls and connects that carry no session token
    pub allow_anonymous_poll: bool,
    /// Static session tokens: token -> identity
    pub tokens: Vec<(String, Identity)>,
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 3001)),
            data_dir: Some(paths::data_root()),
            mailbox_ttl: Duration::from_secs(300),
            max_mailbox_len: 1000,
            session_ttl: Duration::from_secs(30),
            default_poll_timeout: Duration::from_millis(5000),
            max_poll_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(15),
            echo_to_sender: false,
            allow_anonymous_poll: false,
            tokens: Vec::new(),
        }
    }
}

impl CourierConfig {
    /// Defaults overridden by `COURIER_*` environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(addr) = env_parse::<SocketAddr>("COURIER_ADDR") {
            config.addr = addr;
        }
        if let Some(secs) = env_parse::<u64>("COURIER_MAILBOX_TTL_SECS") {
            config.mailbox_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("COURIER_SESSION_TTL_SECS") {
            config.session_ttl = Duration::from_secs(secs);
        }
        if let Some(ms) = env_parse::<u64>("COURIER_MAX_POLL_TIMEOUT_MS") {
            config.max_poll_timeout = Duration::from_millis(ms);
        }
        if let Some(len) = env_parse::<usize>("COURIER_MAX_MAILBOX_LEN") {
            config.max_mailbox_len = len;
        }
        if let Some(echo) = env_parse::<bool>("COURIER_ECHO_TO_SENDER") {
            config.echo_to_sender = echo;
        }
        if let Some(anonymous) = env_parse::<bool>("COURIER_ALLOW_ANONYMOUS_POLL") {
            config.allow_anonymous_poll = anonymous;
        }
        if let Ok(raw) = std::env::var("COURIER_TOKENS") {
            config.tokens = parse_tokens(&raw);
        }

        config
    }

    /// Create config with custom data directory
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(data_dir.into());
        self
    }

    /// Keep everything in memory
    pub fn in_memory(mut self) -> Self {
        self.data_dir = None;
        self
    }

    pub fn with_token(mut self, token: impl Into<String>, identity: Identity) -> Self {
        self.tokens.push((token.into(), identity));
        self
    }

    /// Clamp a requested wait budget to the configured bounds
    pub fn poll_budget(&self, requested_ms: Option<u64>) -> Duration {
        requested_ms
            .map(Duration::from_millis)
            .unwrap_or(self.default_poll_timeout)
            .min(self.max_poll_timeout)
    }

    /// Ensure all directories exist
    pub fn ensure_dirs(&self) -> anyhow::Result<()> {
        if let Some(root) = &self.data_dir {
            paths::ensure_layout(root)?;
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid value for {}: {:?}", key, raw);
            None
        }
    }
}

/// Parse `token=user_id:Name,token2=user2:Other`. A missing name falls back
/// to the user id.
pub fn parse_tokens(raw: &str) -> Vec<(String, Identity)> {
    raw.split(',')
        .filter_map(|pair| {
            let (token, user) = pair.trim().split_once('=')?;
            let (user_id, name) = user.split_once(':').unwrap_or((user, user));
            if token.is_empty() || user_id.is_empty() {
                warn!("Skipping malformed token entry {:?}", pair);
                return None;
            }
            Some((token.to_string(), Identity::new(user_id, name)))
        })
        .collect()
}

/// App state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: CourierConfig,
    pub store: Arc<dyn ConversationStore>,
    pub auth: Arc<dyn Authenticator>,
    pub realtime: Arc<Realtime>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CourierConfig::default();
        assert_eq!(config.default_poll_timeout, Duration::from_millis(5000));
        assert!(!config.echo_to_sender);
        assert!(!config.allow_anonymous_poll);
        assert_eq!(config.max_mailbox_len, 1000);
    }

    #[test]
    fn test_poll_budget_clamps() {
        let config = CourierConfig {
            max_poll_timeout: Duration::from_secs(10),
            ..Default::default()
        };
        assert_eq!(config.poll_budget(None), Duration::from_millis(5000));
        assert_eq!(config.poll_budget(Some(0)), Duration::ZERO);
        assert_eq!(config.poll_budget(Some(60_000)), Duration::from_secs(10));
    }

    #[test]
    fn test_parse_tokens() {
        let tokens = parse_tokens("abc=u1:Alice, def=u2 ,=bad,broken");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].0, "abc");
        assert_eq!(tokens[0].1, Identity::new("u1", "Alice"));
        assert_eq!(tokens[1].1, Identity::new("u2", "u2"));
    }

    #[test]
    fn test_in_memory_skips_dirs() {
        let config = CourierConfig::default().in_memory();
        assert!(config.data_dir.is_none());
        config.ensure_dirs().unwrap();
    }
}
