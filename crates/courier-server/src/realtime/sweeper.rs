use super::Realtime;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

/// Periodically evict expired mailbox entries and stale sessions.
pub fn spawn_sweeper(realtime: Arc<Realtime>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let (expired, stale) = realtime.sweep();
            if expired > 0 || stale > 0 {
                info!(
                    "[Sweeper] evicted {} event(s), {} stale session(s)",
                    expired, stale
                );
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CourierConfig;
    use courier_common::Event;

    #[tokio::test]
    async fn test_sweeper_evicts() {
        let config = CourierConfig {
            mailbox_ttl: Duration::ZERO,
            ..CourierConfig::default().in_memory()
        };
        let realtime = Arc::new(Realtime::new(&config));
        realtime.deliver(Event::pong("u1"));

        let handle = spawn_sweeper(realtime.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();

        assert!(realtime.mailboxes().is_empty("u1"));
    }
}
