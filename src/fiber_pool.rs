//! A bounded pool of reusable fibers.
//!
//! Fibers are created lazily up to the configured cap and recycled through a
//! lock-free LIFO. Running out means every fiber in the system is busy
//! mid-task, which the scheduler treats as a sizing error by the caller.

use crate::fiber::Fiber;
use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicUsize, Ordering};

pub(crate) struct FiberPool {
    idle: ArrayQueue<Box<Fiber>>,
    stack_size: usize,
    capacity: usize,
    created: AtomicUsize,
}

impl FiberPool {
    pub(crate) fn new(capacity: usize, stack_size: usize) -> Self {
        assert!(capacity > 0, "fiber pool capacity must be positive");
        FiberPool {
            idle: ArrayQueue::new(capacity),
            stack_size,
            capacity,
            created: AtomicUsize::new(0),
        }
    }

    /// Pops an idle fiber, or creates one while under the cap.
    pub(crate) fn acquire(&self) -> Box<Fiber> {
        if let Some(fiber) = self.idle.pop() {
            return fiber;
        }

        let id = self.created.fetch_add(1, Ordering::SeqCst);
        assert!(
            id < self.capacity,
            "fiber pool exhausted: all {} fibers are suspended mid-task",
            self.capacity
        );
        let fiber = Fiber::new(id, self.stack_size).expect("fiber stack allocation failed");
        Box::new(fiber)
    }

    /// Returns a finished fiber for reuse.
    pub(crate) fn release(&self, fiber: Box<Fiber>) {
        // Cannot overflow: at most `capacity` fibers exist.
        let _ = self.idle.push(fiber);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recycles_fibers() {
        let pool = FiberPool::new(4, 32 * 1024);

        let first = pool.acquire();
        let first_id = first.id();
        pool.release(first);

        let again = pool.acquire();
        assert_eq!(again.id(), first_id);
        pool.release(again);

        assert_eq!(pool.created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn grows_lazily_up_to_the_cap() {
        let pool = FiberPool::new(2, 32 * 1024);
        let a = pool.acquire();
        let b = pool.acquire();
        assert_ne!(a.id(), b.id());
        pool.release(a);
        pool.release(b);
        assert_eq!(pool.created.load(Ordering::SeqCst), 2);
    }
}
