//! Per-user event mailboxes
//!
//! Every recipient has a FIFO of pending [`Event`]s plus the batch it was
//! last handed. Appends may come from any handler concurrently; a drain
//! takes the whole queue under one lock so two racing polls never both see
//! the same event.
//!
//! Delivery is at-most-once unless the client acknowledges: a poll carrying
//! `ack = N` gets the unacknowledged tail (`seq > N`) of its previous batch
//! again, ahead of anything new.

use courier_common::Event;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, warn};

#[derive(Clone, Debug)]
pub struct MailboxConfig {
    pub ttl: Duration,
    pub max_len: usize,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            max_len: 1000,
        }
    }
}

struct Queued {
    event: Event,
    enqueued_at: Instant,
}

struct Slot {
    queue: VecDeque<Queued>,
    in_flight: Vec<Event>,
    last_drained: Instant,
    notify: Arc<Notify>,
}

impl Slot {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            in_flight: Vec::new(),
            last_drained: Instant::now(),
            notify: Arc::new(Notify::new()),
        }
    }
}

/// Outcome of a single enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enqueued {
    pub seq: u64,
    /// Oldest events dropped to respect `max_len`.
    pub dropped: usize,
}

pub struct Mailboxes {
    config: MailboxConfig,
    slots: Mutex<HashMap<String, Slot>>,
    next_seq: AtomicU64,
}

impl Mailboxes {
    pub fn new(config: MailboxConfig) -> Self {
        Self {
            config,
            slots: Mutex::new(HashMap::new()),
            next_seq: AtomicU64::new(1),
        }
    }

    /// Append `event` to the mailbox named by `event.user_id`.
    ///
    /// The sequence number is assigned under the mailbox lock, so `seq` is
    /// strictly increasing in enqueue order.
    pub fn enqueue(&self, event: Event) -> Enqueued {
        self.push(event, self.config.max_len)
    }

    /// Like [`enqueue`](Self::enqueue) but allowed one slot past `max_len`,
    /// so a notice about dropped events never evicts the event that caused
    /// the overflow.
    pub fn enqueue_notice(&self, event: Event) -> Enqueued {
        let cap = match self.config.max_len {
            0 => 0,
            max_len => max_len + 1,
        };
        self.push(event, cap)
    }

    fn push(&self, mut event: Event, cap: usize) -> Enqueued {
        let mut slots = self.slots.lock();
        let slot = slots.entry(event.user_id.clone()).or_insert_with(Slot::new);

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        event.seq = seq;

        let mut dropped = 0;
        while cap > 0 && slot.queue.len() >= cap {
            slot.queue.pop_front();
            dropped += 1;
        }
        if dropped > 0 {
            warn!(
                "[Mailbox] {} full, dropped {} oldest event(s)",
                event.user_id, dropped
            );
        }

        debug!(
            "[Mailbox] enqueue {} seq={} for {}",
            event.event_type, seq, event.user_id
        );
        slot.queue.push_back(Queued {
            event,
            enqueued_at: Instant::now(),
        });
        slot.notify.notify_waiters();

        Enqueued { seq, dropped }
    }

    /// Take everything pending for `user_id`.
    pub fn drain(&self, user_id: &str, ack: Option<u64>) -> Vec<Event> {
        let mut slots = self.slots.lock();
        let Some(slot) = slots.get_mut(user_id) else {
            return Vec::new();
        };

        let mut batch = match ack {
            Some(acked) => slot
                .in_flight
                .drain(..)
                .filter(|event| event.seq > acked)
                .collect(),
            None => {
                slot.in_flight.clear();
                Vec::new()
            }
        };
        batch.extend(slot.queue.drain(..).map(|queued| queued.event));

        slot.last_drained = Instant::now();
        if ack.is_some() {
            slot.in_flight = batch.clone();
        }
        batch
    }

    /// Long-poll: drain immediately, or wait up to `budget` for an enqueue.
    pub async fn wait_for(&self, user_id: &str, ack: Option<u64>, budget: Duration) -> Vec<Event> {
        let deadline = tokio::time::Instant::now() + budget;

        loop {
            let notify = self.notifier(user_id);
            let notified = notify.notified();
            tokio::pin!(notified);
            // Register before draining so an enqueue in between still wakes us.
            notified.as_mut().enable();

            let events = self.drain(user_id, ack);
            if !events.is_empty() {
                return events;
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Vec::new();
            }
        }
    }

    fn notifier(&self, user_id: &str) -> Arc<Notify> {
        let mut slots = self.slots.lock();
        slots
            .entry(user_id.to_string())
            .or_insert_with(Slot::new)
            .notify
            .clone()
    }

    pub fn len(&self, user_id: &str) -> usize {
        self.slots
            .lock()
            .get(user_id)
            .map(|slot| slot.queue.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, user_id: &str) -> bool {
        self.len(user_id) == 0
    }

    /// Number of mailboxes currently allocated.
    pub fn mailbox_count(&self) -> usize {
        self.slots.lock().len()
    }

    /// Drop a user's mailbox entirely.
    pub fn remove(&self, user_id: &str) -> usize {
        self.slots
            .lock()
            .remove(user_id)
            .map(|slot| slot.queue.len())
            .unwrap_or(0)
    }

    /// Drop events older than the TTL and free idle mailboxes. Returns the
    /// number of events evicted.
    pub fn evict_expired(&self) -> usize {
        let ttl = self.config.ttl;
        let mut evicted = 0;
        let mut slots = self.slots.lock();

        slots.retain(|user_id, slot| {
            let before = slot.queue.len();
            slot.queue.retain(|queued| queued.enqueued_at.elapsed() < ttl);
            let expired = before - slot.queue.len();
            if expired > 0 {
                debug!("[Mailbox] evicted {} expired event(s) for {}", expired, user_id);
                evicted += expired;
            }

            if slot.last_drained.elapsed() >= ttl {
                slot.in_flight.clear();
            }

            // A waiting poll holds a clone of `notify`; keep its slot alive.
            !(slot.queue.is_empty()
                && slot.in_flight.is_empty()
                && Arc::strong_count(&slot.notify) == 1)
        });

        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_common::EventType;

    fn mailboxes() -> Mailboxes {
        Mailboxes::new(MailboxConfig::default())
    }

    #[test]
    fn test_drain_is_fifo_and_clears() {
        let boxes = mailboxes();
        for n in 0..3 {
            boxes.enqueue(Event::error("u1", format!("e{}", n)));
        }

        let events = boxes.drain("u1", None);
        let texts: Vec<_> = events
            .iter()
            .map(|e| e.data["message"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(texts, vec!["e0", "e1", "e2"]);
        assert!(events.windows(2).all(|w| w[0].seq < w[1].seq));

        assert!(boxes.drain("u1", None).is_empty());
    }

    #[test]
    fn test_mailboxes_are_per_user() {
        let boxes = mailboxes();
        boxes.enqueue(Event::pong("u1"));
        boxes.enqueue(Event::pong("u2"));
        boxes.enqueue(Event::pong("u2"));

        assert_eq!(boxes.len("u1"), 1);
        assert_eq!(boxes.len("u2"), 2);
        assert_eq!(boxes.drain("u3", None), Vec::new());
    }

    #[test]
    fn test_max_len_drops_oldest() {
        let boxes = Mailboxes::new(MailboxConfig {
            max_len: 2,
            ..Default::default()
        });
        boxes.enqueue(Event::error("u1", "first"));
        boxes.enqueue(Event::error("u1", "second"));
        let outcome = boxes.enqueue(Event::error("u1", "third"));

        assert_eq!(outcome.dropped, 1);
        let events = boxes.drain("u1", None);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data["message"], "second");
    }

    #[test]
    fn test_notice_may_exceed_max_len_by_one() {
        let boxes = Mailboxes::new(MailboxConfig {
            max_len: 1,
            ..Default::default()
        });
        boxes.enqueue(Event::error("u1", "old"));
        assert_eq!(boxes.enqueue(Event::error("u1", "new")).dropped, 1);
        assert_eq!(boxes.enqueue_notice(Event::error("u1", "notice")).dropped, 0);

        let events = boxes.drain("u1", None);
        let texts: Vec<_> = events.iter().map(|e| e.data["message"].clone()).collect();
        assert_eq!(texts, vec!["new", "notice"]);
    }

    #[test]
    fn test_ack_redelivers_unacknowledged_tail() {
        let boxes = mailboxes();
        let first = boxes.enqueue(Event::pong("u1")).seq;
        let second = boxes.enqueue(Event::pong("u1")).seq;

        let batch = boxes.drain("u1", Some(0));
        assert_eq!(batch.len(), 2);

        // Client only processed the first event before the response was lost.
        let third = boxes.enqueue(Event::pong("u1")).seq;
        let redelivered = boxes.drain("u1", Some(first));
        let seqs: Vec<_> = redelivered.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![second, third]);

        // Fully acknowledged: nothing left.
        assert!(boxes.drain("u1", Some(third)).is_empty());
    }

    #[test]
    fn test_poll_without_ack_discards_previous_batch() {
        let boxes = mailboxes();
        boxes.enqueue(Event::pong("u1"));
        assert_eq!(boxes.drain("u1", Some(0)).len(), 1);
        assert!(boxes.drain("u1", None).is_empty());
        assert!(boxes.drain("u1", Some(0)).is_empty());
    }

    #[test]
    fn test_evict_expired() {
        let boxes = Mailboxes::new(MailboxConfig {
            ttl: Duration::ZERO,
            ..Default::default()
        });
        boxes.enqueue(Event::pong("u1"));
        boxes.enqueue(Event::pong("u1"));

        assert_eq!(boxes.evict_expired(), 2);
        assert_eq!(boxes.len("u1"), 0);
        assert_eq!(boxes.mailbox_count(), 0);
    }

    #[tokio::test]
    async fn test_wait_for_times_out_empty() {
        let boxes = mailboxes();
        let events = boxes.wait_for("u1", None, Duration::from_millis(20)).await;
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_wait_for_returns_queued_immediately() {
        let boxes = mailboxes();
        boxes.enqueue(Event::pong("u1"));
        let events = boxes.wait_for("u1", None, Duration::from_secs(30)).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::Pong);
    }

    #[tokio::test]
    async fn test_wait_for_wakes_on_enqueue() {
        let boxes = Arc::new(mailboxes());
        let waiter = {
            let boxes = boxes.clone();
            tokio::spawn(async move { boxes.wait_for("u1", None, Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        boxes.enqueue(Event::error("u1", "late"));

        let events = waiter.await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data["message"], "late");
    }

    #[tokio::test]
    async fn test_racing_polls_never_duplicate() {
        let boxes = Arc::new(mailboxes());
        for _ in 0..50 {
            boxes.enqueue(Event::pong("u1"));
        }

        let a = {
            let boxes = boxes.clone();
            tokio::spawn(async move { boxes.drain("u1", None) })
        };
        let b = {
            let boxes = boxes.clone();
            tokio::spawn(async move { boxes.drain("u1", None) })
        };
        let total = a.await.unwrap().len() + b.await.unwrap().len();
        assert_eq!(total, 50);
    }
}
