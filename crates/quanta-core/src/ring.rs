//! Fixed-capacity circular buffer used for event records and narrative logs.

use serde::{Deserialize, Serialize};

/// Circular buffer with explicit head/length bookkeeping.
///
/// Pushing past capacity evicts the oldest entry. Storage is allocated once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RingBuffer<T> {
    slots: Vec<Option<T>>,
    head: usize,
    len: usize,
}

impl<T> RingBuffer<T> {
    /// Create a buffer holding at most `capacity` entries (minimum one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            head: 0,
            len: 0,
        }
    }

    /// Maximum number of retained entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true when nothing is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    fn physical(&self, logical: usize) -> usize {
        (self.head + logical) % self.slots.len()
    }

    /// Append `value`, returning the evicted oldest entry when full.
    pub fn push(&mut self, value: T) -> Option<T> {
        if self.len == self.slots.len() {
            let evicted = self.slots[self.head].replace(value);
            self.head = (self.head + 1) % self.slots.len();
            evicted
        } else {
            let tail = self.physical(self.len);
            self.slots[tail] = Some(value);
            self.len += 1;
            None
        }
    }

    /// Remove and return the oldest entry.
    pub fn pop_front(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let value = self.slots[self.head].take();
        self.head = (self.head + 1) % self.slots.len();
        self.len -= 1;
        value
    }

    /// Drop entries from the front while `predicate` holds; returns how many were dropped.
    pub fn pop_front_while(&mut self, mut predicate: impl FnMut(&T) -> bool) -> usize {
        let mut dropped = 0;
        while let Some(front) = self.front() {
            if !predicate(front) {
                break;
            }
            self.pop_front();
            dropped += 1;
        }
        dropped
    }

    /// Oldest retained entry.
    #[must_use]
    pub fn front(&self) -> Option<&T> {
        if self.len == 0 {
            None
        } else {
            self.slots[self.head].as_ref()
        }
    }

    /// Newest retained entry.
    #[must_use]
    pub fn latest(&self) -> Option<&T> {
        if self.len == 0 {
            None
        } else {
            self.slots[self.physical(self.len - 1)].as_ref()
        }
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.len).filter_map(move |logical| self.slots[self.physical(logical)].as_ref())
    }

    /// Mutable iteration oldest to newest.
    pub fn for_each_mut(&mut self, mut f: impl FnMut(&mut T)) {
        for logical in 0..self.len {
            let idx = self.physical(logical);
            if let Some(value) = self.slots[idx].as_mut() {
                f(value);
            }
        }
    }

    /// Remove all entries without releasing storage.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.head = 0;
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_evicts_oldest_past_capacity() {
        let mut ring = RingBuffer::new(3);
        assert_eq!(ring.push(1), None);
        ring.push(2);
        ring.push(3);
        assert_eq!(ring.push(4), Some(1));
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(ring.latest(), Some(&4));
        assert_eq!(ring.front(), Some(&2));
        assert_eq!(ring.len(), 3);
    }

    #[test]
    fn pop_front_while_stops_at_first_survivor() {
        let mut ring = RingBuffer::new(4);
        for value in [1, 2, 9, 3] {
            ring.push(value);
        }
        assert_eq!(ring.pop_front_while(|v| *v < 5), 2);
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![9, 3]);
        ring.push(10);
        ring.push(11);
        assert_eq!(ring.push(12), Some(9));
    }

    #[test]
    fn zero_capacity_is_promoted_to_one() {
        let mut ring = RingBuffer::new(0);
        assert_eq!(ring.capacity(), 1);
        ring.push("a");
        assert_eq!(ring.push("b"), Some("a"));
        ring.clear();
        assert!(ring.is_empty());
        assert!(ring.latest().is_none());
    }
}
