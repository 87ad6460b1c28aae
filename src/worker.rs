//! Worker threads and the scheduling loop.
//!
//! Each worker owns a local task queue and a pending-resume list and loops:
//! resume a woken fiber if one is pending, otherwise pop local work,
//! otherwise steal from a sibling, otherwise sleep on the global wake event.
//! Owners pop the back of their queue for cache locality while thieves pop
//! the front, so the two ends never contend.

use crate::fiber::{Fiber, FiberInput, FiberState, ParkedFiber};
use crate::observer::WORKER_CONTEXT;
use crate::queue::ConcurrentLifoQueue;
use crate::scheduler::SchedulerCore;
use crate::task::{panic_message, TaskPayload, TaskRun};
use crate::task_pool::TaskHandle;
use core_affinity::CoreId;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Shared per-worker scheduling state, owned by the scheduler core.
pub(crate) struct WorkerState {
    /// Ready tasks. Submitters and the owner push; the owner pops the back,
    /// thieves pop the front.
    pub(crate) queue: ConcurrentLifoQueue<TaskHandle>,
    /// Fibers ready to continue on this worker.
    pub(crate) pending_resumes: ConcurrentLifoQueue<ParkedFiber>,
}

impl WorkerState {
    pub(crate) fn new() -> Self {
        WorkerState {
            queue: ConcurrentLifoQueue::new(),
            pending_resumes: ConcurrentLifoQueue::new(),
        }
    }
}

/// A running worker thread.
pub(crate) struct Worker {
    id: usize,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawns a worker thread, optionally pinned to `core_id`.
    pub(crate) fn spawn(id: usize, core: Arc<SchedulerCore>, core_id: Option<CoreId>) -> Worker {
        let handle = thread::Builder::new()
            .name(format!("taskfiber-worker-{}", id))
            .spawn(move || {
                if let Some(core_id) = core_id {
                    core_affinity::set_for_current(core_id);
                }
                WorkerLoop {
                    core,
                    id,
                    steal_nonce: 0,
                }
                .run();
            })
            .expect("failed to spawn worker thread");

        Worker {
            id,
            handle: Some(handle),
        }
    }

    pub(crate) fn id(&self) -> usize {
        self.id
    }

    pub(crate) fn join(mut self) -> thread::Result<()> {
        match self.handle.take() {
            Some(handle) => handle.join(),
            None => Ok(()),
        }
    }
}

struct WorkerLoop {
    core: Arc<SchedulerCore>,
    id: usize,
    steal_nonce: usize,
}

impl WorkerLoop {
    fn run(mut self) {
        loop {
            // Sample before scanning so a signal raised mid-scan is caught
            // by the wait below.
            let seen = self.core.wake.epoch();

            if let Some(parked) = self.state().pending_resumes.try_pop_back() {
                self.run_fiber(parked.fiber, FiberInput::Resume);
                continue;
            }

            if let Some(handle) = self.state().queue.try_pop_back() {
                self.run_task(handle);
                continue;
            }

            if let Some(handle) = self.steal() {
                self.run_task(handle);
                continue;
            }

            if self.core.should_exit() {
                break;
            }

            self.core.observer.on_worker_idle(self.id);
            self.core.wake.wait(seen, self.core.idle_wait);
            self.core.observer.on_worker_resume(self.id);
        }
    }

    fn state(&self) -> &WorkerState {
        &self.core.workers[self.id]
    }

    /// Fetches one task from a sibling's queue, oldest first. The starting
    /// victim rotates with every attempt so no single sibling is favored.
    fn steal(&mut self) -> Option<TaskHandle> {
        let worker_count = self.core.workers.len();
        if worker_count <= 1 {
            return None;
        }

        let start = self.id + self.steal_nonce;
        self.steal_nonce = self.steal_nonce.wrapping_add(1);

        for offset in 0..worker_count {
            let victim = (start + offset) % worker_count;
            if victim == self.id {
                continue;
            }
            if let Some(handle) = self.core.workers[victim].queue.try_pop_front() {
                return Some(handle);
            }
        }
        None
    }

    fn run_task(&self, handle: TaskHandle) {
        // The slot retires here; a handle kept by the submitter reports
        // stale from this point on.
        let Some(payload) = self.core.task_pool.take(&handle) else {
            return;
        };
        let TaskPayload { work, group } = payload;
        let run = TaskRun {
            work,
            group,
            core: Arc::clone(&self.core),
            worker_id: self.id,
        };

        let fiber = self.core.fiber_pool.acquire();
        self.run_fiber(fiber, FiberInput::Run(Box::new(move || run.execute())));
    }

    fn run_fiber(&self, mut fiber: Box<Fiber>, input: FiberInput) {
        let fiber_id = fiber.id();
        self.core
            .observer
            .on_fiber_switch(self.id, WORKER_CONTEXT, fiber_id);
        let state = fiber.resume(input);
        self.core
            .observer
            .on_fiber_switch(self.id, fiber_id, WORKER_CONTEXT);

        match state {
            FiberState::Completed => self.core.fiber_pool.release(fiber),
            FiberState::Yielded => self.state().pending_resumes.push(ParkedFiber {
                fiber,
                worker: self.id,
            }),
            FiberState::Parked(group) => {
                let parked = ParkedFiber {
                    fiber,
                    worker: self.id,
                };
                if let Err(parked) = group.park(parked) {
                    // The group completed while the fiber was switching out;
                    // resume it on the next loop iteration.
                    self.state().pending_resumes.push(parked);
                }
            }
            FiberState::Panicked(payload) => {
                // Task panics are contained at the task boundary, so this is
                // a runtime bug. Report it and discard the poisoned fiber.
                eprintln!(
                    "worker {}: fiber {} unwound outside a task: {}",
                    self.id,
                    fiber_id,
                    panic_message(payload.as_ref())
                );
            }
        }
    }
}
