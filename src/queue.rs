//! # Bounded Queues
//!
//! Fixed-capacity FIFO channel for streaming several samples from a
//! producer task (or interrupt handler) to a consumer task without losing
//! any to overwrite.
//!
//! - `put` appends if there is room and refuses otherwise
//!   ([`QueueError::Full`]); queued items are never overwritten. The caller
//!   chooses whether to drop the item or retry on its next activation.
//! - `get` removes the oldest item or reports [`QueueError::Empty`].
//! - `any` is the non-blocking check used by drain loops.
//!
//! [`BoundedQueue`] is for task-to-task traffic and is not `Sync`.
//! [`ProtectedQueue`] wraps the same ring in a critical-section `Mutex` and
//! is the one an interrupt handler may feed. Storage is an inline
//! `heapless::Deque`, capacity is a const generic.

use core::cell::RefCell;

use heapless::Deque;

use crate::error::QueueError;
use crate::sync::{self, Mutex};

struct Ring<T, const N: usize> {
    items: Deque<T, N>,
    max_full: usize,
}

impl<T, const N: usize> Ring<T, N> {
    const fn new() -> Self {
        Self {
            items: Deque::new(),
            max_full: 0,
        }
    }

    fn put(&mut self, item: T) -> Result<(), QueueError> {
        self.items.push_back(item).map_err(|_| QueueError::Full)?;
        self.max_full = self.max_full.max(self.items.len());
        Ok(())
    }

    fn get(&mut self) -> Result<T, QueueError> {
        self.items.pop_front().ok_or(QueueError::Empty)
    }
}

/// Fixed-capacity FIFO shared between cooperative tasks.
pub struct BoundedQueue<T, const N: usize> {
    name: &'static str,
    ring: RefCell<Ring<T, N>>,
}

impl<T, const N: usize> BoundedQueue<T, N> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            ring: RefCell::new(Ring::new()),
        }
    }

    /// Append `item` at the back.
    pub fn put(&self, item: T) -> Result<(), QueueError> {
        self.ring.borrow_mut().put(item)
    }

    /// Remove and return the oldest item.
    pub fn get(&self) -> Result<T, QueueError> {
        self.ring.borrow_mut().get()
    }

    /// `true` while at least one item is waiting.
    pub fn any(&self) -> bool {
        !self.ring.borrow().items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ring.borrow().items.len()
    }

    pub fn is_empty(&self) -> bool {
        !self.any()
    }

    pub fn is_full(&self) -> bool {
        self.ring.borrow().items.is_full()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Largest number of items ever held at once.
    pub fn max_full(&self) -> usize {
        self.ring.borrow().max_full
    }

    /// Discard all pending items. The high-water mark is kept.
    pub fn clear(&self) {
        self.ring.borrow_mut().items.clear();
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Fixed-capacity FIFO that an interrupt handler may produce into.
///
/// Every operation is one critical section.
pub struct ProtectedQueue<T, const N: usize> {
    name: &'static str,
    ring: Mutex<RefCell<Ring<T, N>>>,
}

impl<T, const N: usize> ProtectedQueue<T, N> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            ring: Mutex::new(RefCell::new(Ring::new())),
        }
    }

    #[inline]
    fn with_ring<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Ring<T, N>) -> R,
    {
        sync::critical_section(|cs| f(&mut self.ring.borrow(cs).borrow_mut()))
    }

    pub fn put(&self, item: T) -> Result<(), QueueError> {
        self.with_ring(|ring| ring.put(item))
    }

    pub fn get(&self) -> Result<T, QueueError> {
        self.with_ring(|ring| ring.get())
    }

    pub fn any(&self) -> bool {
        self.with_ring(|ring| !ring.items.is_empty())
    }

    pub fn len(&self) -> usize {
        self.with_ring(|ring| ring.items.len())
    }

    pub fn is_empty(&self) -> bool {
        !self.any()
    }

    pub fn is_full(&self) -> bool {
        self.with_ring(|ring| ring.items.is_full())
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn max_full(&self) -> usize {
        self.with_ring(|ring| ring.max_full)
    }

    pub fn clear(&self) {
        self.with_ring(|ring| ring.items.clear());
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_after_capacity_puts() {
        let q: BoundedQueue<u16, 4> = BoundedQueue::new("samples");
        for i in 0..4 {
            assert_eq!(q.put(i), Ok(()));
        }
        assert!(q.is_full());
        assert_eq!(q.put(99), Err(QueueError::Full));
        assert_eq!(q.len(), 4);
    }

    #[test]
    fn test_fifo_order_and_drain() {
        let q: BoundedQueue<i32, 8> = BoundedQueue::new("fifo");
        for v in [3, 1, 4, 1, 5] {
            q.put(v).unwrap();
        }
        let mut drained = std::vec::Vec::new();
        while q.any() {
            drained.push(q.get().unwrap());
        }
        assert_eq!(drained, vec![3, 1, 4, 1, 5]);
        assert!(!q.any());
        assert_eq!(q.get(), Err(QueueError::Empty));
    }

    #[test]
    fn test_refused_put_keeps_queued_items() {
        let q: ProtectedQueue<u8, 2> = ProtectedQueue::new("isr");
        q.put(1).unwrap();
        q.put(2).unwrap();
        assert!(q.put(3).is_err());
        assert_eq!(q.get(), Ok(1));
        assert_eq!(q.get(), Ok(2));
    }

    #[test]
    fn test_wraparound_and_high_water_mark() {
        let q: BoundedQueue<u32, 3> = BoundedQueue::new("ring");
        for round in 0..4 {
            for i in 0..3 {
                q.put(round * 10 + i).unwrap();
            }
            for i in 0..3 {
                assert_eq!(q.get(), Ok(round * 10 + i));
            }
        }
        assert_eq!(q.max_full(), 3);
        q.put(7).unwrap();
        q.clear();
        assert!(q.is_empty());
        assert_eq!(q.max_full(), 3);
        assert_eq!(q.capacity(), 3);
    }

    #[test]
    fn test_interrupt_producer_loses_nothing() {
        static SAMPLES: ProtectedQueue<u32, 64> = ProtectedQueue::new("samples");

        let producer = std::thread::spawn(|| {
            let mut sent = 0u32;
            while sent < 10_000 {
                if SAMPLES.put(sent).is_ok() {
                    sent += 1;
                }
            }
        });

        let mut expected = 0u32;
        while expected < 10_000 {
            if let Ok(v) = SAMPLES.get() {
                assert_eq!(v, expected);
                expected += 1;
            }
        }
        producer.join().unwrap();

        assert!(SAMPLES.is_empty());
        assert!(SAMPLES.max_full() <= SAMPLES.capacity());
        assert_eq!(SAMPLES.name(), "samples");
    }
}
