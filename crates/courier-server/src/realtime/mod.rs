//! Delivery transport, server side
//!
//! [`Realtime`] decouples whoever produces an event from whoever is polling
//! for it: handlers call the `publish_*` methods with the conversation's
//! members, and each recipient's poll drains its own mailbox.

pub mod mailbox;
pub mod session;
mod sweeper;

pub use mailbox::{Enqueued, MailboxConfig, Mailboxes};
pub use session::{Session, SessionRegistry};
pub use sweeper::spawn_sweeper;

use crate::config::CourierConfig;
use courier_common::{ConnectResponse, Event, MembershipChange, Message, ReadReceipt};
use std::time::Duration;
use tracing::{debug, info};

pub struct Realtime {
    mailboxes: Mailboxes,
    sessions: SessionRegistry,
    echo_to_sender: bool,
}

impl Realtime {
    pub fn new(config: &CourierConfig) -> Self {
        Self {
            mailboxes: Mailboxes::new(MailboxConfig {
                ttl: config.mailbox_ttl,
                max_len: config.max_mailbox_len,
            }),
            sessions: SessionRegistry::new(config.session_ttl),
            echo_to_sender: config.echo_to_sender,
        }
    }

    pub fn mailboxes(&self) -> &Mailboxes {
        &self.mailboxes
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Enqueue one event, reporting overflow to the recipient as an
    /// `error` event.
    pub fn deliver(&self, event: Event) -> u64 {
        let user_id = event.user_id.clone();
        let outcome = self.mailboxes.enqueue(event);
        if outcome.dropped > 0 {
            self.mailboxes.enqueue_notice(Event::error(
                user_id,
                format!(
                    "Mailbox overflow: {} undelivered event(s) dropped",
                    outcome.dropped
                ),
            ));
        }
        outcome.seq
    }

    /// Enqueue one event per recipient built by `build`, skipping `actor`.
    /// Returns the number of mailboxes written.
    pub fn fan_out<F>(&self, members: &[String], actor: Option<&str>, build: F) -> usize
    where
        F: Fn(&str) -> Event,
    {
        let mut delivered = 0;
        for member in members {
            if Some(member.as_str()) == actor {
                continue;
            }
            self.deliver(build(member));
            delivered += 1;
        }
        delivered
    }

    pub fn publish_message(&self, members: &[String], message: &Message) -> usize {
        let actor = (!self.echo_to_sender).then_some(message.sender_id.as_str());
        let delivered = self.fan_out(members, actor, |member| Event::message_new(member, message));
        debug!(
            "[Realtime] message {} fanned out to {} mailbox(es)",
            message.id, delivered
        );
        delivered
    }

    pub fn publish_read(&self, members: &[String], receipt: &ReadReceipt) -> usize {
        self.fan_out(members, Some(&receipt.reader_id), |member| {
            Event::message_read(member, receipt)
        })
    }

    pub fn publish_membership(
        &self,
        members: &[String],
        change: &MembershipChange,
        joined: bool,
    ) -> usize {
        self.fan_out(members, Some(&change.user_id), |member| {
            Event::membership(member, change, joined)
        })
    }

    /// Explicit connect: create or refresh the session and hand back a
    /// `welcome` event directly in the response.
    pub fn connect(&self, user_id: &str) -> ConnectResponse {
        let (session, _) = self.sessions.touch(user_id);
        ConnectResponse {
            event: Event::welcome(user_id, &session.session_id),
            session_id: session.session_id,
        }
    }

    pub fn disconnect(&self, user_id: &str) -> bool {
        self.sessions.remove(user_id).is_some()
    }

    /// Handle one long-poll for `user_id`.
    pub async fn poll(&self, user_id: &str, ack: Option<u64>, budget: Duration) -> Vec<Event> {
        let (session, created) = self.sessions.touch(user_id);
        if created {
            info!(
                "[Realtime] first poll from {} (session {})",
                user_id, session.session_id
            );
        }

        let events = self.mailboxes.wait_for(user_id, ack, budget).await;
        debug!(
            "[Realtime] poll {} -> {} event(s) (budget {:?})",
            user_id,
            events.len(),
            budget
        );

        // Waiting may have outlasted a short session TTL.
        self.sessions.touch(user_id);
        events
    }

    /// One sweeper pass. Returns (expired events, stale sessions).
    pub fn sweep(&self) -> (usize, usize) {
        let expired = self.mailboxes.evict_expired();
        let stale = self.sessions.evict_stale();
        for user_id in &stale {
            debug!("[Realtime] session for {} expired", user_id);
        }
        (expired, stale.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_common::{EventType, Identity};

    fn realtime() -> Realtime {
        Realtime::new(&CourierConfig::default().in_memory())
    }

    fn members(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_fan_out_skips_sender() {
        let rt = realtime();
        let sender = Identity::new("u3", "Carol");
        let message = Message::new("c1", &sender, "hello");

        let delivered = rt.publish_message(&members(&["u1", "u2", "u3"]), &message);
        assert_eq!(delivered, 2);
        assert_eq!(rt.mailboxes().len("u1"), 1);
        assert_eq!(rt.mailboxes().len("u2"), 1);
        assert_eq!(rt.mailboxes().len("u3"), 0);
    }

    #[test]
    fn test_echo_to_sender() {
        let config = CourierConfig {
            echo_to_sender: true,
            ..CourierConfig::default().in_memory()
        };
        let rt = Realtime::new(&config);
        let sender = Identity::new("u1", "Alice");
        let message = Message::new("c1", &sender, "hello");

        assert_eq!(rt.publish_message(&members(&["u1", "u2"]), &message), 2);
        assert_eq!(rt.mailboxes().len("u1"), 1);
    }

    #[test]
    fn test_overflow_reports_error_event() {
        let config = CourierConfig {
            max_mailbox_len: 1,
            ..CourierConfig::default().in_memory()
        };
        let rt = Realtime::new(&config);
        let sender = Identity::new("u2", "Bob");
        let first = Message::new("c1", &sender, "first");
        let second = Message::new("c1", &sender, "second");
        assert_eq!(rt.publish_message(&members(&["u1"]), &first), 1);
        assert_eq!(rt.publish_message(&members(&["u1"]), &second), 1);

        let events = rt.mailboxes().drain("u1", None);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventType::MessageNew);
        assert_eq!(events[0].data["id"], second.id.as_str());
        assert_eq!(events[1].event_type, EventType::Error);
        assert!(events[1].data["message"].as_str().unwrap().contains("1 undelivered"));
    }

    #[test]
    fn test_connect_returns_welcome() {
        let rt = realtime();
        let response = rt.connect("u1");
        assert_eq!(response.event.event_type, EventType::Welcome);
        assert_eq!(response.event.data["sessionId"], response.session_id.as_str());
        assert!(rt.sessions().get("u1").is_some());

        assert!(rt.disconnect("u1"));
        assert!(!rt.disconnect("u1"));
    }

    #[tokio::test]
    async fn test_poll_registers_session_and_times_out() {
        let rt = realtime();
        let events = rt.poll("u1", None, Duration::from_millis(10)).await;
        assert!(events.is_empty());
        assert!(rt.sessions().get("u1").is_some());
    }
}
