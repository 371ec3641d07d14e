//! Bounded, insertion-ordered chat feed.
//!
//! Holds the records currently on screen. Once the cap is exceeded the
//! oldest records are evicted first.

use std::collections::VecDeque;

use crate::models::IndexedChatRecord;

/// Number of records kept on screen (and in history) per room.
pub const DEFAULT_FEED_CAPACITY: usize = 1000;

#[derive(Debug, Clone)]
pub struct BoundedFeed {
    records: VecDeque<IndexedChatRecord>,
    capacity: usize,
}

impl BoundedFeed {
    /// Create an empty feed. A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Replace the contents with `records` (oldest first), keeping the newest
    /// `capacity` of them.
    pub fn seed(&mut self, records: Vec<IndexedChatRecord>) {
        self.records.clear();
        let skip = records.len().saturating_sub(self.capacity);
        self.records.extend(records.into_iter().skip(skip));
    }

    /// Append a record, returning the record evicted to make room, if any.
    pub fn push(&mut self, record: IndexedChatRecord) -> Option<IndexedChatRecord> {
        self.records.push_back(record);
        if self.records.len() > self.capacity {
            self.records.pop_front()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last(&self) -> Option<&IndexedChatRecord> {
        self.records.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexedChatRecord> {
        self.records.iter()
    }

    /// Owned copy of the records, oldest first.
    pub fn records(&self) -> Vec<IndexedChatRecord> {
        self.records.iter().cloned().collect()
    }
}

impl Default for BoundedFeed {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}
