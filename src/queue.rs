//! Concurrent LIFO queue.
//!
//! The runtime's workhorse container: every worker's local task queue and
//! pending-resume list is one of these. Lock-free: the queue is a
//! Treiber-style linked list whose head (the most recent element) is only
//! ever updated by compare-and-swap, with crossbeam's epoch machinery
//! reclaiming nodes so a popper can never touch freed memory.
//!
//! Producers (submitters, the owning worker) push at the head with a single
//! CAS. The owner pops from the head for cache locality. Thieves pop the
//! oldest element by claiming its value in place (a per-node flag CAS) and
//! leaving the node linked; head pops and bulk drains unlink such emptied
//! nodes when they reach them, so the two ends never contend on the same
//! word. Bulk drain detaches the whole list with one swap.

use crossbeam::epoch::{self, Atomic, Owned, Shared};
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicBool, Ordering};

struct Node<T> {
    value: UnsafeCell<MaybeUninit<T>>,
    /// Set once by whichever pop claims the value; the node itself may stay
    /// linked until a head pop or drain unlinks it.
    taken: AtomicBool,
    next: Atomic<Node<T>>,
}

impl<T> Node<T> {
    fn new(value: T) -> Self {
        Node {
            value: UnsafeCell::new(MaybeUninit::new(value)),
            taken: AtomicBool::new(false),
            next: Atomic::null(),
        }
    }

    /// Claims the value; exactly one caller wins.
    fn try_take(&self) -> Option<T> {
        if self
            .taken
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            Some(unsafe { (*self.value.get()).assume_init_read() })
        } else {
            None
        }
    }
}

impl<T> Drop for Node<T> {
    fn drop(&mut self) {
        if !*self.taken.get_mut() {
            unsafe {
                (*self.value.get()).assume_init_drop();
            }
        }
    }
}

pub struct ConcurrentLifoQueue<T> {
    /// Most recent element; older elements follow the `next` chain.
    head: Atomic<Node<T>>,
}

unsafe impl<T: Send> Send for ConcurrentLifoQueue<T> {}
unsafe impl<T: Send> Sync for ConcurrentLifoQueue<T> {}

impl<T> ConcurrentLifoQueue<T> {
    pub fn new() -> Self {
        ConcurrentLifoQueue {
            head: Atomic::null(),
        }
    }

    /// Appends a value at the back of the queue. A single CAS on the head;
    /// the producer never waits on consumers.
    pub fn push(&self, value: T) {
        let mut node = Owned::new(Node::new(value));
        let guard = epoch::pin();
        loop {
            let head = self.head.load(Ordering::Relaxed, &guard);
            node.next.store(head, Ordering::Relaxed);
            match self
                .head
                .compare_exchange(head, node, Ordering::Release, Ordering::Relaxed, &guard)
            {
                Ok(_) => return,
                Err(err) => node = err.new,
            }
        }
    }

    /// Removes and returns the most recently pushed value.
    pub fn try_pop_back(&self) -> Option<T> {
        let guard = epoch::pin();
        loop {
            let head = self.head.load(Ordering::Acquire, &guard);
            let node = match unsafe { head.as_ref() } {
                Some(node) => node,
                None => return None,
            };
            let next = node.next.load(Ordering::Acquire, &guard);
            if self
                .head
                .compare_exchange(head, next, Ordering::AcqRel, Ordering::Relaxed, &guard)
                .is_ok()
            {
                let value = node.try_take();
                unsafe {
                    guard.defer_destroy(head);
                }
                match value {
                    Some(value) => return Some(value),
                    // A front pop emptied this node while it was still
                    // linked; keep unlinking.
                    None => continue,
                }
            }
        }
    }

    /// Removes and returns the oldest value.
    ///
    /// Claims the value in place rather than unlinking, so it never races
    /// head pops on the same pointer; the emptied node is reclaimed when a
    /// head pop or drain reaches it.
    pub fn try_pop_front(&self) -> Option<T> {
        let guard = epoch::pin();
        loop {
            let mut candidate: Option<&Node<T>> = None;
            let mut cursor = self.head.load(Ordering::Acquire, &guard);
            while let Some(node) = unsafe { cursor.as_ref() } {
                if !node.taken.load(Ordering::Acquire) {
                    candidate = Some(node);
                }
                cursor = node.next.load(Ordering::Acquire, &guard);
            }
            match candidate {
                Some(node) => {
                    if let Some(value) = node.try_take() {
                        return Some(value);
                    }
                    // Another pop claimed it between the scan and the take.
                }
                None => return None,
            }
        }
    }

    /// Detaches the whole queue contents with one swap and appends up to
    /// `max` of them to `dst`, oldest first. Anything beyond `max` is
    /// dropped; callers size `max` to the queue's expected depth. Returns
    /// the number of values appended.
    pub fn pop_all(&self, dst: &mut Vec<T>, max: usize) -> usize {
        let guard = epoch::pin();
        let detached = self.head.swap(Shared::null(), Ordering::AcqRel, &guard);

        // The list runs newest to oldest; collect and reverse.
        let mut values = Vec::new();
        let mut cursor = detached;
        while let Some(node) = unsafe { cursor.as_ref() } {
            if let Some(value) = node.try_take() {
                values.push(value);
            }
            let next = node.next.load(Ordering::Acquire, &guard);
            unsafe {
                guard.defer_destroy(cursor);
            }
            cursor = next;
        }
        values.reverse();

        let count = values.len().min(max);
        dst.extend(values.into_iter().take(count));
        count
    }

    /// Observable emptiness; may race with concurrent producers.
    pub fn is_empty(&self) -> bool {
        let guard = epoch::pin();
        let mut cursor = self.head.load(Ordering::Acquire, &guard);
        while let Some(node) = unsafe { cursor.as_ref() } {
            if !node.taken.load(Ordering::Acquire) {
                return false;
            }
            cursor = node.next.load(Ordering::Acquire, &guard);
        }
        true
    }
}

impl<T> Default for ConcurrentLifoQueue<T> {
    fn default() -> Self {
        ConcurrentLifoQueue::new()
    }
}

impl<T> Drop for ConcurrentLifoQueue<T> {
    fn drop(&mut self) {
        unsafe {
            let guard = epoch::unprotected();
            let mut cursor = self.head.load(Ordering::Relaxed, guard);
            while let Some(node) = cursor.as_ref() {
                let next = node.next.load(Ordering::Relaxed, guard);
                drop(cursor.into_owned());
                cursor = next;
            }
        }
    }
}
