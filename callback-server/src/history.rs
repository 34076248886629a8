//! Bounded history of raw timeline payloads.

use parking_lot::Mutex;
use std::collections::VecDeque;

/// Number of payloads kept when no capacity is given.
pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

/// Fixed-capacity ring buffer of the most recent timeline bodies.
///
/// The listener's receive handler is the only writer. Readers on any thread
/// get whole entries; a payload is either fully present or absent.
#[derive(Debug)]
pub struct TimelineHistory {
    capacity: usize,
    entries: Mutex<VecDeque<String>>,
}

impl TimelineHistory {
    /// Create a history holding at most `capacity` payloads (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Append a payload, evicting the oldest one when full.
    pub fn push(&self, payload: String) {
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(payload);
    }

    /// The most recently received payload.
    pub fn latest(&self) -> Option<String> {
        self.entries.lock().back().cloned()
    }

    /// All retained payloads, oldest first.
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Default for TimelineHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
