//! Bounded concurrent ring buffer.
//!
//! A lossy event stream: a single writer pushes, overwriting the oldest
//! entry once the buffer is full, and observers drain a prefix of recent
//! history. The tracer gives each worker one of these so trace collection
//! never grows unbounded.
//!
//! Lock-free, built on per-slot sequence numbers. For capacity N, the slot
//! for write position `p` is `p & (N-1)` and its sequence moves
//! `p` (ready to write) -> `p + 1` (value for `p` present) -> `p + N`
//! (consumed, ready for the next lap). The writer claims a still-occupied
//! slot by CAS before overwriting, and a drain claims a value by the same
//! CAS, so each value is moved out or dropped exactly once and a drain
//! never observes a half-written slot. Concurrent pushes are forbidden by
//! contract (single writer); draining may run concurrently with the writer.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, Ordering};

struct Slot<T> {
    sequence: AtomicU64,
    value: UnsafeCell<MaybeUninit<T>>,
}

pub struct ConcurrentRingBuffer<T> {
    slots: Box<[Slot<T>]>,
    mask: u64,
    /// Next write position; owned by the single writer, published after the
    /// slot write so drains only scan completed positions.
    tail: AtomicU64,
    /// Where draining starts scanning; only ever moves forward.
    head: AtomicU64,
}

unsafe impl<T: Send> Send for ConcurrentRingBuffer<T> {}
unsafe impl<T: Send> Sync for ConcurrentRingBuffer<T> {}

impl<T> ConcurrentRingBuffer<T> {
    /// Creates a buffer holding the latest `capacity` values.
    ///
    /// `capacity` must be a power of two.
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two(),
            "ring buffer capacity must be a power of two, got {}",
            capacity
        );
        ConcurrentRingBuffer {
            slots: (0..capacity)
                .map(|index| Slot {
                    sequence: AtomicU64::new(index as u64),
                    value: UnsafeCell::new(MaybeUninit::uninit()),
                })
                .collect(),
            mask: capacity as u64 - 1,
            tail: AtomicU64::new(0),
            head: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Appends a value, overwriting the oldest one when full.
    pub fn push(&self, value: T) {
        let capacity = self.slots.len() as u64;
        let position = self.tail.load(Ordering::Relaxed);
        let slot = &self.slots[(position & self.mask) as usize];

        loop {
            let sequence = slot.sequence.load(Ordering::Acquire);
            if sequence == position {
                break;
            }
            // The previous lap's value is still here; this push overwrites
            // the oldest entry, so discard it, unless a drain claims it
            // between the load and the CAS.
            let stale = position.wrapping_add(1).wrapping_sub(capacity);
            if sequence == stale
                && slot
                    .sequence
                    .compare_exchange(stale, position, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            {
                unsafe {
                    (*slot.value.get()).assume_init_drop();
                }
                break;
            }
        }

        unsafe {
            (*slot.value.get()).write(value);
        }
        slot.sequence.store(position + 1, Ordering::Release);
        self.tail.store(position + 1, Ordering::Release);
    }

    /// Drains up to `max` buffered values into `dst` in insertion order,
    /// oldest first. Returns the number of values drained; the head advances
    /// only past the scanned range. A position whose slot the writer has
    /// already lapped is simply skipped, so a drain racing the writer yields
    /// a prefix of recent history.
    pub fn pop_all(&self, dst: &mut Vec<T>, max: usize) -> usize {
        let capacity = self.slots.len() as u64;
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);

        let mut position = head.max(tail.saturating_sub(capacity));
        let mut drained = 0;
        while position < tail && drained < max {
            let slot = &self.slots[(position & self.mask) as usize];
            if slot
                .sequence
                .compare_exchange(
                    position + 1,
                    position + capacity,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                dst.push(unsafe { (*slot.value.get()).assume_init_read() });
                drained += 1;
            }
            position += 1;
        }

        self.head.fetch_max(position, Ordering::AcqRel);
        drained
    }
}

impl<T> Drop for ConcurrentRingBuffer<T> {
    fn drop(&mut self) {
        let capacity = self.slots.len() as u64;
        let mask = self.mask;
        let tail = *self.tail.get_mut();
        let head = *self.head.get_mut();

        let mut position = head.max(tail.saturating_sub(capacity));
        while position < tail {
            let slot = &mut self.slots[(position & mask) as usize];
            if *slot.sequence.get_mut() == position + 1 {
                unsafe {
                    (*slot.value.get()).assume_init_drop();
                }
            }
            position += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_in_insertion_order() {
        let ring = ConcurrentRingBuffer::new(32);

        ring.push(-1);
        ring.push(1);

        let mut drained = Vec::new();
        assert_eq!(ring.pop_all(&mut drained, 32), 2);
        assert_eq!(drained, vec![-1, 1]);
    }

    #[test]
    fn overflow_keeps_latest() {
        let ring = ConcurrentRingBuffer::new(32);

        for j in 0..507 {
            ring.push(3 + j);
        }

        let mut drained = Vec::new();
        assert_eq!(ring.pop_all(&mut drained, 32), 32);
        for (i, value) in drained.iter().enumerate() {
            assert_eq!(*value, (507 + 3 - 32) + i as i32);
        }
    }

    #[test]
    fn partial_drain_advances_head_only_past_drained() {
        let ring = ConcurrentRingBuffer::new(8);
        for value in 0..5 {
            ring.push(value);
        }

        let mut first = Vec::new();
        assert_eq!(ring.pop_all(&mut first, 2), 2);
        assert_eq!(first, vec![0, 1]);

        let mut rest = Vec::new();
        assert_eq!(ring.pop_all(&mut rest, 8), 3);
        assert_eq!(rest, vec![2, 3, 4]);
    }

    #[test]
    fn overwrite_drops_displaced_values() {
        use std::sync::atomic::AtomicUsize;
        use std::sync::Arc;

        struct DropCounter(Arc<AtomicUsize>);
        impl Drop for DropCounter {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let drops = Arc::new(AtomicUsize::new(0));
        {
            let ring = ConcurrentRingBuffer::new(2);
            for _ in 0..5 {
                ring.push(DropCounter(Arc::clone(&drops)));
            }
            // Three displaced by overwrites, two still buffered.
            assert_eq!(drops.load(Ordering::SeqCst), 3);
        }
        assert_eq!(drops.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn drain_concurrent_with_writer_sees_recent_prefix() {
        use std::sync::Arc;

        let ring = Arc::new(ConcurrentRingBuffer::new(64));
        let writer_ring = Arc::clone(&ring);
        let writer = std::thread::spawn(move || {
            for value in 0..10_000 {
                writer_ring.push(value);
            }
        });

        let mut drained = Vec::new();
        while !writer.is_finished() {
            ring.pop_all(&mut drained, 64);
        }
        writer.join().unwrap();
        ring.pop_all(&mut drained, 64);

        // Values arrive in strictly increasing order: every drain returns a
        // slice of the insertion sequence and never re-reads a value.
        for pair in drained.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert_eq!(drained.last(), Some(&9_999));
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn rejects_non_power_of_two_capacity() {
        let _ = ConcurrentRingBuffer::<i32>::new(12);
    }
}
