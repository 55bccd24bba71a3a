//! Bounded activity log
//!
//! The RingBuffer keeps the most recent entries agents recorded, so anyone
//! joining late can see what happened without the log growing unbounded.

use std::collections::VecDeque;

/// A fixed-capacity ring buffer
///
/// When the buffer is full, the oldest entry is evicted by each new one.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    /// The underlying storage, oldest first
    data: VecDeque<T>,
    /// Maximum number of entries
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Create a new ring buffer with the given capacity (at least 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an entry, evicting the oldest one when full
    pub fn push(&mut self, entry: T) {
        if self.data.len() == self.capacity {
            self.data.pop_front();
        }
        self.data.push_back(entry);
    }

    /// Entries in chronological order (oldest first)
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.data.iter()
    }

    /// Number of entries currently stored
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> Extend<T> for RingBuffer<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for entry in iter {
            self.push(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_buffer() {
        let buf: RingBuffer<u32> = RingBuffer::new(100);
        assert_eq!(buf.capacity(), 100);
        assert!(buf.is_empty());
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut buf = RingBuffer::new(0);
        buf.push("a");
        buf.push("b");
        assert_eq!(buf.iter().copied().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn test_wraparound_keeps_newest_in_order() {
        let mut buf = RingBuffer::new(3);
        buf.extend(1..=5);
        assert_eq!(buf.iter().copied().collect::<Vec<_>>(), vec![3, 4, 5]);
        assert_eq!(buf.len(), buf.capacity());
    }
}
