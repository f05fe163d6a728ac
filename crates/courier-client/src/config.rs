//! Configuration for the Courier polling transport.

use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportConfig {
    /// Server base URL, e.g. `http://localhost:3001`.
    pub base_url: String,
    /// Fixed interval between poll ticks.
    pub poll_interval: Duration,
    /// Server-side wait budget sent as `timeout`.
    pub wait_budget: Duration,
    /// Extra slack on top of `wait_budget` before a request is abandoned.
    pub request_timeout: Duration,
    /// Send `ack` with every poll so the server can redeliver lost batches.
    pub ack_events: bool,
    /// How long an optimistic message waits for its authoritative copy.
    pub reconcile_window: Duration,
    /// Number of recent event ids remembered for replay suppression.
    pub dedupe_capacity: usize,
    /// Session token sent as the `courier_session` cookie.
    pub session_token: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3001".to_string(),
            poll_interval: Duration::from_millis(2000),
            wait_budget: Duration::from_millis(5000),
            request_timeout: Duration::from_secs(10),
            ack_events: true,
            reconcile_window: Duration::from_secs(30),
            dedupe_capacity: 512,
            session_token: None,
        }
    }
}

impl TransportConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_wait_budget(mut self, budget: Duration) -> Self {
        self.wait_budget = budget;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_ack_events(mut self, ack: bool) -> Self {
        self.ack_events = ack;
        self
    }

    #[must_use]
    pub fn with_reconcile_window(mut self, window: Duration) -> Self {
        self.reconcile_window = window;
        self
    }

    #[must_use]
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TransportConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(2000));
        assert_eq!(config.wait_budget, Duration::from_millis(5000));
        assert!(config.ack_events);
        assert!(config.session_token.is_none());
    }

    #[test]
    fn test_builder() {
        let config = TransportConfig::new("http://example.test")
            .with_poll_interval(Duration::from_millis(100))
            .with_ack_events(false)
            .with_session_token("abc");
        assert_eq!(config.base_url, "http://example.test");
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert!(!config.ack_events);
        assert_eq!(config.session_token.as_deref(), Some("abc"));
        assert_eq!(config.wait_budget, Duration::from_millis(5000));
    }
}
