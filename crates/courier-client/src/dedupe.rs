use courier_common::Event;
use std::collections::{HashSet, VecDeque};

/// Bounded memory of recently dispatched event ids.
#[derive(Debug)]
pub struct SeenEvents {
    capacity: usize,
    order: VecDeque<String>,
    ids: HashSet<String>,
    highest_seq: u64,
}

impl SeenEvents {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            ids: HashSet::new(),
            highest_seq: 0,
        }
    }

    /// Record `event`; returns false if it was already seen.
    pub fn insert(&mut self, event: &Event) -> bool {
        if !self.ids.insert(event.id.clone()) {
            return false;
        }
        self.order.push_back(event.id.clone());
        while self.order.len() > self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.ids.remove(&old);
            }
        }
        self.highest_seq = self.highest_seq.max(event.seq);
        true
    }

    pub fn highest_seq(&self) -> u64 {
        self.highest_seq
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
