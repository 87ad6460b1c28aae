//! Generation-tagged task pool.
//!
//! A fixed-capacity circular slab of payload slots. Each slot carries an
//! atomic 32-bit generation id: odd means free, even means live. Live ids
//! come from a pool-global counter advanced by two per allocation, so every
//! allocation in the pool's lifetime has a distinct, strictly increasing
//! even id. A handle snapshots the id it was issued with; once the slot is
//! retired (or reused) the snapshot no longer matches and the handle cleanly
//! reports invalid, which makes handles safe to copy and keep around
//! indefinitely.

use crate::atomic::AtomicInt32;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;

/// Generation value marking a slot that has never been used.
const UNUSED_ID: i32 = 1;

const NULL_INDEX: u32 = u32::MAX;

/// A copyable, non-owning reference to a pool slot, validated by generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskHandle {
    check_id: i32,
    index: u32,
}

impl TaskHandle {
    /// A handle that is valid in no pool.
    pub const fn null() -> Self {
        TaskHandle {
            check_id: UNUSED_ID,
            index: NULL_INDEX,
        }
    }

    pub fn is_null(&self) -> bool {
        self.index == NULL_INDEX
    }

    /// The generation this handle was issued with.
    pub fn check_id(&self) -> i32 {
        self.check_id
    }
}

impl Default for TaskHandle {
    fn default() -> Self {
        TaskHandle::null()
    }
}

struct Slot<T> {
    id: AtomicInt32,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Slot<T> {
    fn new() -> Self {
        Slot {
            id: AtomicInt32::new(UNUSED_ID),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }
}

/// Fixed-capacity circular allocator of generation-tagged payload slots.
pub struct TaskPool<T> {
    slots: Box<[Slot<T>]>,
    mask: usize,
    id_generator: AtomicInt32,
    cursor: AtomicInt32,
}

// Payloads move in and out under exclusive slot claims (generation CAS), so
// sharing the pool across threads is sound whenever the payload itself can
// cross threads.
unsafe impl<T: Send> Send for TaskPool<T> {}
unsafe impl<T: Send> Sync for TaskPool<T> {}

impl<T> TaskPool<T> {
    /// Creates a pool with `capacity` slots; `capacity` must be a power of
    /// two.
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two(),
            "task pool capacity must be a power of two, got {}",
            capacity
        );
        TaskPool {
            slots: (0..capacity).map(|_| Slot::new()).collect(),
            mask: capacity - 1,
            id_generator: AtomicInt32::new(0),
            cursor: AtomicInt32::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Allocates the next circular slot for `value`.
    ///
    /// Returns `None` when the slot the cursor landed on is still live (the
    /// pool is full at that position); callers may back off and retry.
    pub fn try_alloc(&self, value: T) -> Option<TaskHandle> {
        let index = self.cursor.inc_fetch().wrapping_sub(1) as u32 as usize & self.mask;
        let slot = &self.slots[index];

        let previous = slot.id.load();
        if previous & 1 == 0 {
            // Still live, the circular buffer has caught its own tail.
            return None;
        }

        let id = self.id_generator.add_fetch(2);
        if slot.id.compare_and_swap(id, previous) != previous {
            // Another allocator claimed this slot first.
            return None;
        }

        unsafe {
            (*slot.value.get()).write(value);
        }
        Some(TaskHandle {
            check_id: id,
            index: index as u32,
        })
    }

    /// Allocates a slot, treating exhaustion as a caller error.
    pub fn alloc(&self, value: T) -> TaskHandle {
        match self.try_alloc(value) {
            Some(handle) => handle,
            None => panic!(
                "task pool allocation failed: all {} slots are live",
                self.capacity()
            ),
        }
    }

    /// Whether `handle` still refers to the allocation it was issued for.
    pub fn is_valid(&self, handle: &TaskHandle) -> bool {
        if handle.is_null() {
            return false;
        }
        self.slots[handle.index as usize].id.load() == handle.check_id
    }

    /// Moves the payload out and retires the slot to the next odd id.
    ///
    /// Returns `None` for null or stale handles; at most one caller wins a
    /// live handle.
    pub fn take(&self, handle: &TaskHandle) -> Option<T> {
        if handle.is_null() {
            return None;
        }
        let slot = &self.slots[handle.index as usize];
        let retired = handle.check_id.wrapping_add(1);
        if slot.id.compare_and_swap(retired, handle.check_id) != handle.check_id {
            return None;
        }
        Some(unsafe { (*slot.value.get()).assume_init_read() })
    }

    /// Destroys the payload behind `handle` if it is still live.
    ///
    /// Idempotent: stale handles return false.
    pub fn destroy(&self, handle: &TaskHandle) -> bool {
        self.take(handle).is_some()
    }
}

impl<T> Drop for TaskPool<T> {
    fn drop(&mut self) {
        for slot in self.slots.iter() {
            if slot.id.load() & 1 == 0 {
                unsafe {
                    (*slot.value.get()).assume_init_drop();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn null_handle_is_never_valid() {
        let pool: TaskPool<i32> = TaskPool::new(4);
        let handle = TaskHandle::default();
        assert!(handle.is_null());
        assert!(!pool.is_valid(&handle));
        assert!(!pool.destroy(&handle));
    }

    #[test]
    fn generations_advance_and_invalidate() {
        let pool: TaskPool<i32> = TaskPool::new(4);

        let first = pool.alloc(10);
        assert!(pool.is_valid(&first));
        assert_eq!(first.check_id() & 1, 0);

        assert!(pool.destroy(&first));
        assert!(!pool.is_valid(&first));
        assert!(!pool.destroy(&first));

        let second = pool.alloc(20);
        assert!(pool.is_valid(&second));
        assert_eq!(second.check_id() & 1, 0);
        assert!(second.check_id() > first.check_id());
    }

    #[test]
    fn full_pool_rejects_allocation() {
        let pool: TaskPool<i32> = TaskPool::new(4);
        let handles: Vec<_> = (0..4).map(|value| pool.alloc(value)).collect();

        // Every slot is live, wherever the cursor lands next.
        assert!(pool.try_alloc(99).is_none());

        for handle in &handles {
            assert!(pool.destroy(handle));
        }
        assert!(pool.try_alloc(99).is_some());
    }

    #[test]
    fn staleness_across_wraparound() {
        let capacity = 4;
        let pool: TaskPool<usize> = TaskPool::new(capacity);

        let mut handles = Vec::new();
        for round in 0..capacity + 1 {
            let handle = pool.alloc(round);
            assert!(pool.is_valid(&handle));
            handles.push(handle);
            assert!(pool.destroy(&handle));
            assert!(!pool.is_valid(&handle));
        }

        // Each handle's generation is unique and increasing, so every older
        // handle stays invalid after its slot was reused.
        for pair in handles.windows(2) {
            assert!(pair[0].check_id() < pair[1].check_id());
        }
        assert!(!pool.is_valid(&handles[0]));
    }

    #[test]
    fn take_moves_the_payload_out_once() {
        let pool: TaskPool<String> = TaskPool::new(4);
        let handle = pool.alloc("payload".to_string());

        assert_eq!(pool.take(&handle).as_deref(), Some("payload"));
        assert!(pool.take(&handle).is_none());
        assert!(!pool.is_valid(&handle));
    }

    #[test]
    fn destroy_runs_payload_destructors() {
        let drops = Arc::new(AtomicUsize::new(0));
        let pool: TaskPool<DropCounter> = TaskPool::new(4);

        let handle = pool.alloc(DropCounter(Arc::clone(&drops)));
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        assert!(pool.destroy(&handle));
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_the_pool_drops_live_payloads() {
        let drops = Arc::new(AtomicUsize::new(0));
        {
            let pool: TaskPool<DropCounter> = TaskPool::new(4);
            let _live = pool.alloc(DropCounter(Arc::clone(&drops)));
            let dead = pool.alloc(DropCounter(Arc::clone(&drops)));
            pool.destroy(&dead);
            assert_eq!(drops.load(Ordering::SeqCst), 1);
        }
        assert_eq!(drops.load(Ordering::SeqCst), 2);
    }
}
