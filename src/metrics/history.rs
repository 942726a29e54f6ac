//! Fixed-capacity FIFO of metrics snapshots.

use serde::{Serialize, Serializer};
use std::num::NonZeroUsize;

/// Bounded FIFO backed by a fixed slot array.
///
/// `head` points at the oldest entry; physical slot positions wrap modulo the
/// capacity and are never exposed. Iteration and serialization always yield a
/// dense sequence, oldest first.
#[derive(Debug, Clone)]
pub struct RingHistory<T> {
    slots: Vec<Option<T>>,
    head: usize,
    len: usize,
}

impl<T> RingHistory<T> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        let mut slots = Vec::with_capacity(capacity.get());
        slots.resize_with(capacity.get(), || None);
        Self {
            slots,
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn slot(&self, offset: usize) -> usize {
        (self.head + offset) % self.slots.len()
    }

    /// Append an entry, evicting the oldest one first when full.
    pub fn enqueue(&mut self, item: T) -> &T {
        if self.len == self.capacity() {
            self.dequeue();
        }
        let idx = self.slot(self.len);
        self.len += 1;
        self.slots[idx].insert(item)
    }

    /// Remove and return the oldest entry.
    pub fn dequeue(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let item = self.slots[self.head].take();
        self.head = (self.head + 1) % self.slots.len();
        self.len -= 1;
        item
    }

    pub fn peek(&self) -> Option<&T> {
        if self.len == 0 {
            return None;
        }
        self.slots[self.head].as_ref()
    }

    /// Entries oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.len).filter_map(move |offset| self.slots[self.slot(offset)].as_ref())
    }
}

impl<T: Clone> RingHistory<T> {
    /// Dense copy of the contents in insertion order.
    pub fn snapshot_view(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

impl<T: Serialize> Serialize for RingHistory<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}
