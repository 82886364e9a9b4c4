//! Lock-free stack of free indices.
//!
//! A Treiber stack over a fixed index range. The head packs a 32-bit
//! modification tag above the top index so a pop that races a pop/push pair
//! on the same index fails its CAS instead of corrupting the list.

use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

const NIL: u32 = u32::MAX;

#[inline]
fn pack(tag: u32, idx: u32) -> u64 {
    ((tag as u64) << 32) | idx as u64
}

#[inline]
fn unpack(head: u64) -> (u32, u32) {
    ((head >> 32) as u32, head as u32)
}

/// Fixed-capacity lock-free free-list of `u32` indices.
pub struct IndexStack {
    head: AtomicU64,
    next: Box<[AtomicU32]>,
    available: AtomicU32,
}

impl IndexStack {
    /// Create a stack holding every index in `0..capacity`; pops return them
    /// in ascending order.
    pub fn full(capacity: usize) -> Self {
        let next = (0..capacity)
            .map(|i| {
                let n = i + 1;
                AtomicU32::new(if n < capacity { n as u32 } else { NIL })
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let top = if capacity == 0 { NIL } else { 0 };
        Self {
            head: AtomicU64::new(pack(0, top)),
            next,
            available: AtomicU32::new(capacity as u32),
        }
    }

    /// Total number of indices managed.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.next.len()
    }

    /// Indices currently on the stack. Exact between stages, approximate
    /// while pushes and pops are in flight.
    #[inline]
    pub fn available(&self) -> usize {
        self.available.load(Ordering::Relaxed) as usize
    }

    /// Pop a free index.
    pub fn pop(&self) -> Option<u32> {
        let mut head = self.head.load(Ordering::Acquire);
        loop {
            let (tag, top) = unpack(head);
            if top == NIL {
                return None;
            }
            let next = self.next[top as usize].load(Ordering::Relaxed);
            match self.head.compare_exchange_weak(
                head,
                pack(tag.wrapping_add(1), next),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.available.fetch_sub(1, Ordering::Relaxed);
                    return Some(top);
                }
                Err(current) => head = current,
            }
        }
    }

    /// Push an index back. The caller must own it (popped and not yet pushed).
    pub fn push(&self, idx: u32) {
        debug_assert!((idx as usize) < self.next.len());
        let mut head = self.head.load(Ordering::Acquire);
        loop {
            let (tag, top) = unpack(head);
            self.next[idx as usize].store(top, Ordering::Relaxed);
            match self.head.compare_exchange_weak(
                head,
                pack(tag.wrapping_add(1), idx),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.available.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(current) => head = current,
            }
        }
    }

    /// Refill with every index, ascending pop order again.
    pub fn reset(&mut self) {
        let capacity = self.next.len();
        for (i, slot) in self.next.iter_mut().enumerate() {
            let n = i + 1;
            *slot.get_mut() = if n < capacity { n as u32 } else { NIL };
        }
        let top = if capacity == 0 { NIL } else { 0 };
        *self.head.get_mut() = pack(0, top);
        *self.available.get_mut() = capacity as u32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_pop_order_and_exhaustion() {
        let stack = IndexStack::full(3);
        assert_eq!(stack.pop(), Some(0));
        assert_eq!(stack.pop(), Some(1));
        assert_eq!(stack.pop(), Some(2));
        assert_eq!(stack.pop(), None);
        assert_eq!(stack.available(), 0);
    }

    #[test]
    fn test_push_is_lifo() {
        let stack = IndexStack::full(4);
        let a = stack.pop().unwrap();
        let b = stack.pop().unwrap();
        stack.push(a);
        stack.push(b);
        assert_eq!(stack.pop(), Some(b));
        assert_eq!(stack.pop(), Some(a));
        assert_eq!(stack.available(), 2);
    }

    #[test]
    fn test_empty_stack() {
        let mut stack = IndexStack::full(0);
        assert_eq!(stack.pop(), None);
        stack.reset();
        assert_eq!(stack.capacity(), 0);
    }

    #[test]
    fn test_reset() {
        let mut stack = IndexStack::full(5);
        while stack.pop().is_some() {}
        stack.reset();
        assert_eq!(stack.available(), 5);
        assert_eq!(stack.pop(), Some(0));
    }

    #[test]
    fn test_concurrent_pop_push_keeps_indices_unique() {
        let stack = Arc::new(IndexStack::full(64));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let stack = Arc::clone(&stack);
            handles.push(thread::spawn(move || {
                let mut held = Vec::new();
                for round in 0..200 {
                    if let Some(idx) = stack.pop() {
                        held.push(idx);
                    }
                    if round % 3 == 0 {
                        if let Some(idx) = held.pop() {
                            stack.push(idx);
                        }
                    }
                }
                held
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for idx in handle.join().expect("Thread panicked") {
                assert!(seen.insert(idx), "index {idx} handed out twice");
            }
        }
        assert_eq!(seen.len() + stack.available(), 64);
    }
}
