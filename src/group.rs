//! Task groups: completion barriers over sets of related tasks.
//!
//! A group counts its outstanding tasks and optionally chains to a parent,
//! so waiting on the parent covers every sub-group spawned beneath it.
//! Fibers wait by parking on the group (their worker keeps running other
//! work); plain threads wait by blocking on the group's condvar.

use crate::atomic::AtomicInt32;
use crate::fiber::ParkedFiber;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

/// A cheaply clonable handle to a task group.
#[derive(Clone)]
pub struct TaskGroup {
    inner: Arc<GroupInner>,
}

struct GroupInner {
    /// Number of tasks in this group (plus one per active child group) that
    /// have not yet finished.
    outstanding: AtomicInt32,
    parent: Option<TaskGroup>,
    /// Fibers suspended until this group completes.
    waiters: Mutex<Vec<ParkedFiber>>,
    /// Broadcast to blocking (non-fiber) waiters on completion.
    completed: Condvar,
}

impl TaskGroup {
    pub fn new() -> Self {
        TaskGroup {
            inner: Arc::new(GroupInner {
                outstanding: AtomicInt32::new(0),
                parent: None,
                waiters: Mutex::new(Vec::new()),
                completed: Condvar::new(),
            }),
        }
    }

    /// Creates a group whose completion the parent waits for: the parent
    /// counts this group as one outstanding task while it has work.
    pub fn with_parent(parent: &TaskGroup) -> Self {
        TaskGroup {
            inner: Arc::new(GroupInner {
                outstanding: AtomicInt32::new(0),
                parent: Some(parent.clone()),
                waiters: Mutex::new(Vec::new()),
                completed: Condvar::new(),
            }),
        }
    }

    /// Tasks (and active child groups) not yet finished.
    pub fn outstanding(&self) -> i32 {
        self.inner.outstanding.load()
    }

    pub fn is_complete(&self) -> bool {
        self.outstanding() == 0
    }

    /// Accounts for `count` newly submitted tasks. The first transition away
    /// from zero registers this group with its parent.
    pub(crate) fn add(&self, count: i32) {
        debug_assert!(count > 0);
        let previous = self.inner.outstanding.add_fetch(count) - count;
        if previous == 0 {
            if let Some(parent) = &self.inner.parent {
                parent.add(1);
            }
        }
    }

    /// Accounts for `count` finished tasks. Exactly one caller observes the
    /// zero crossing; it collects this group's parked fibers into `resumed`,
    /// wakes blocking waiters, and completes one unit on the parent.
    pub(crate) fn complete(&self, count: i32, resumed: &mut Vec<ParkedFiber>) {
        let now = self.inner.outstanding.add_fetch(-count);
        debug_assert!(now >= 0, "group completed more tasks than were added");
        if now == 0 {
            {
                let mut waiters = self.inner.waiters.lock();
                resumed.append(&mut waiters);
                self.inner.completed.notify_all();
            }
            if let Some(parent) = &self.inner.parent {
                parent.complete(1, resumed);
            }
        }
    }

    /// Registers a suspended fiber to be resumed when this group completes.
    ///
    /// Fails by handing the fiber back when the group already completed, so
    /// the caller can requeue it immediately and no wakeup is lost.
    pub(crate) fn park(&self, fiber: ParkedFiber) -> Result<(), ParkedFiber> {
        let mut waiters = self.inner.waiters.lock();
        if self.inner.outstanding.load() == 0 {
            return Err(fiber);
        }
        waiters.push(fiber);
        Ok(())
    }

    /// Blocks the calling thread until the group completes. For non-worker
    /// threads only; fibers park instead.
    pub(crate) fn wait_blocking(&self) {
        let mut waiters = self.inner.waiters.lock();
        while self.inner.outstanding.load() != 0 {
            self.inner.completed.wait(&mut waiters);
        }
    }
}

impl Default for TaskGroup {
    fn default() -> Self {
        TaskGroup::new()
    }
}
