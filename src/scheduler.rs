//! The scheduler: public entry point owning workers, the task pool, the
//! fiber pool, and the global wake event.
//!
//! Submission allocates a generation-tagged pool slot per task, accounts it
//! on its group, and distributes handles round-robin into worker-local
//! queues, waking the workers once per call. Waiting from inside a task
//! parks the calling fiber; waiting from any other thread blocks on the
//! group.

use crate::atomic::AtomicInt32;
use crate::event::WakeEvent;
use crate::fiber::{Fiber, FiberYield};
use crate::fiber_pool::FiberPool;
use crate::group::TaskGroup;
use crate::observer::{NullObserver, SchedulerObserver};
use crate::task::{FnTask, Task, TaskContext, TaskPayload};
use crate::task_pool::{TaskHandle, TaskPool};
use crate::worker::{Worker, WorkerState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Errors surfaced by scheduler operations.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The task pool slot the submission landed on is still live.
    #[error("task pool is full, {capacity} slots are live")]
    TaskPoolFull { capacity: usize },

    /// Submission arrived after shutdown started.
    #[error("scheduler is shutting down, submission rejected")]
    ShuttingDown,

    /// One or more worker threads panicked before joining.
    #[error("{count} worker thread(s) panicked")]
    WorkerPanicked { count: usize },
}

/// Construction parameters. All resource bounds are fixed for the
/// scheduler's lifetime.
pub struct SchedulerParams {
    /// Worker thread count; defaults to the hardware concurrency.
    pub worker_count: usize,
    /// Upper bound on concurrently live fibers (running plus suspended).
    pub fiber_pool_size: usize,
    /// Per-fiber stack size; clamped to the platform minimum and rounded up
    /// to whole pages.
    pub fiber_stack_size: usize,
    /// Task pool capacity; must be a power of two. Bounds the number of
    /// queued-but-not-yet-started tasks.
    pub task_pool_size: usize,
    /// How long an idle worker sleeps before re-scanning on its own.
    pub idle_wait: Duration,
    /// Pin workers to cores round-robin.
    pub pin_workers: bool,
    /// Instrumentation sink.
    pub observer: Arc<dyn SchedulerObserver>,
}

impl Default for SchedulerParams {
    fn default() -> Self {
        SchedulerParams {
            worker_count: thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            fiber_pool_size: 256,
            fiber_stack_size: 256 * 1024,
            task_pool_size: 16 * 1024,
            idle_wait: Duration::from_millis(2),
            pin_workers: false,
            observer: Arc::new(NullObserver),
        }
    }
}

/// State shared between the scheduler facade and its workers.
pub(crate) struct SchedulerCore {
    pub(crate) workers: Box<[WorkerState]>,
    pub(crate) task_pool: TaskPool<TaskPayload>,
    pub(crate) fiber_pool: FiberPool,
    pub(crate) wake: WakeEvent,
    pub(crate) observer: Arc<dyn SchedulerObserver>,
    pub(crate) idle_wait: Duration,
    shutdown: AtomicBool,
    /// Tasks submitted but not yet finished, across all groups.
    outstanding: AtomicInt32,
    round_robin: AtomicInt32,
}

impl SchedulerCore {
    /// Allocates a pool slot for `work`, accounts it on `group`, and queues
    /// the handle on the next worker round-robin. The caller signals the
    /// wake event afterwards.
    pub(crate) fn submit_boxed(
        &self,
        group: &TaskGroup,
        work: Box<dyn Task>,
    ) -> Result<TaskHandle, SchedulerError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(SchedulerError::ShuttingDown);
        }

        let handle = self
            .task_pool
            .try_alloc(TaskPayload {
                work,
                group: group.clone(),
            })
            .ok_or(SchedulerError::TaskPoolFull {
                capacity: self.task_pool.capacity(),
            })?;

        group.add(1);
        self.outstanding.inc_fetch();

        let target =
            self.round_robin.inc_fetch().wrapping_sub(1) as u32 as usize % self.workers.len();
        self.workers[target].queue.push(handle);
        Ok(handle)
    }

    pub(crate) fn submit_many<T, I>(
        &self,
        group: &TaskGroup,
        tasks: I,
    ) -> Result<Vec<TaskHandle>, SchedulerError>
    where
        T: Task,
        I: IntoIterator<Item = T>,
    {
        let mut handles = Vec::new();
        for task in tasks {
            handles.push(self.submit_boxed(group, Box::new(task))?);
        }
        Ok(handles)
    }

    pub(crate) fn signal_submission(&self) {
        self.wake.signal();
    }

    /// Completion bookkeeping for one finished task: walk the group chain,
    /// hand woken fibers back to the workers that parked them, and keep the
    /// drain accounting current.
    pub(crate) fn finish_task(&self, group: &TaskGroup) {
        let mut resumed = Vec::new();
        group.complete(1, &mut resumed);

        let woke_fibers = !resumed.is_empty();
        for parked in resumed {
            let worker = parked.worker;
            self.workers[worker].pending_resumes.push(parked);
        }
        if woke_fibers {
            self.wake.signal();
        }

        let remaining = self.outstanding.dec_fetch();
        debug_assert!(remaining >= 0, "finished more tasks than were submitted");
        if remaining == 0 && self.shutdown.load(Ordering::Acquire) {
            self.wake.signal();
        }
    }

    /// Workers exit once shutdown is requested and every submitted task has
    /// finished, so queued work always drains first.
    pub(crate) fn should_exit(&self) -> bool {
        self.shutdown.load(Ordering::Acquire) && self.outstanding.load() == 0
    }
}

/// Suspends or blocks the caller until `group` completes.
pub(crate) fn wait_for_group(group: &TaskGroup) {
    if group.is_complete() {
        return;
    }
    if Fiber::is_fiber_context() {
        // The worker parks this fiber on the group and keeps running other
        // tasks; the group's completer hands the fiber back to that worker.
        Fiber::suspend_current(FiberYield::Parked(group.clone()));
    } else {
        group.wait_blocking();
    }
}

/// A fiber-based task scheduler over a fixed pool of worker threads.
pub struct Scheduler {
    core: Arc<SchedulerCore>,
    workers: Vec<Worker>,
}

impl Scheduler {
    /// Builds a scheduler and starts its workers.
    pub fn new(params: SchedulerParams) -> Scheduler {
        assert!(params.worker_count > 0, "need at least one worker");
        assert!(
            params.fiber_pool_size >= params.worker_count,
            "fiber pool must hold at least one fiber per worker"
        );

        let core = Arc::new(SchedulerCore {
            workers: (0..params.worker_count).map(|_| WorkerState::new()).collect(),
            task_pool: TaskPool::new(params.task_pool_size),
            fiber_pool: FiberPool::new(params.fiber_pool_size, params.fiber_stack_size),
            wake: WakeEvent::new(),
            observer: Arc::clone(&params.observer),
            idle_wait: params.idle_wait,
            shutdown: AtomicBool::new(false),
            outstanding: AtomicInt32::new(0),
            round_robin: AtomicInt32::new(0),
        });

        let core_ids = if params.pin_workers {
            core_affinity::get_core_ids().unwrap_or_default()
        } else {
            Vec::new()
        };

        let workers = (0..params.worker_count)
            .map(|id| {
                let pin = if core_ids.is_empty() {
                    None
                } else {
                    Some(core_ids[id % core_ids.len()])
                };
                Worker::spawn(id, Arc::clone(&core), pin)
            })
            .collect();

        Scheduler { core, workers }
    }

    /// A scheduler with `worker_count` workers and default sizing.
    pub fn with_workers(worker_count: usize) -> Scheduler {
        Scheduler::new(SchedulerParams {
            worker_count,
            ..SchedulerParams::default()
        })
    }

    pub fn worker_count(&self) -> usize {
        self.core.workers.len()
    }

    /// Creates an independent group.
    pub fn create_group(&self) -> TaskGroup {
        TaskGroup::new()
    }

    /// Creates a group whose completion `parent` additionally waits for.
    pub fn create_subgroup(&self, parent: &TaskGroup) -> TaskGroup {
        TaskGroup::with_parent(parent)
    }

    /// Submits one task under `group` and wakes the workers.
    pub fn submit<T: Task>(
        &self,
        group: &TaskGroup,
        task: T,
    ) -> Result<TaskHandle, SchedulerError> {
        let handle = self.core.submit_boxed(group, Box::new(task))?;
        self.core.signal_submission();
        Ok(handle)
    }

    /// Submits a closure under `group`.
    pub fn submit_fn<F>(&self, group: &TaskGroup, work: F) -> Result<TaskHandle, SchedulerError>
    where
        F: FnOnce(&TaskContext) + Send + 'static,
    {
        self.submit(group, FnTask(work))
    }

    /// Submits every task in `tasks` under `group`, waking the workers once
    /// for the whole batch. Tasks queued before an error still run.
    pub fn submit_all<T, I>(
        &self,
        group: &TaskGroup,
        tasks: I,
    ) -> Result<Vec<TaskHandle>, SchedulerError>
    where
        T: Task,
        I: IntoIterator<Item = T>,
    {
        let result = self.core.submit_many(group, tasks);
        self.core.signal_submission();
        result
    }

    /// Submits a single closure under a fresh group and returns the group.
    pub fn run<F>(&self, work: F) -> TaskGroup
    where
        F: FnOnce(&TaskContext) + Send + 'static,
    {
        let group = self.create_group();
        self.submit_fn(&group, work)
            .expect("failed to submit task");
        group
    }

    /// Waits until `group` completes.
    ///
    /// Called from inside a task, this suspends the calling fiber without
    /// blocking its worker; the fiber resumes on the same worker once the
    /// group's last task finishes. Called from any other thread, this is a
    /// blocking OS wait.
    pub fn wait(&self, group: &TaskGroup) {
        wait_for_group(group);
    }

    /// Whether `handle` still refers to a queued, not-yet-started task.
    pub fn is_task_alive(&self, handle: &TaskHandle) -> bool {
        self.core.task_pool.is_valid(handle)
    }

    /// Drains all submitted work, stops the workers, and joins them.
    pub fn shutdown(mut self) -> Result<(), SchedulerError> {
        self.shutdown_impl()
    }

    fn shutdown_impl(&mut self) -> Result<(), SchedulerError> {
        if self.workers.is_empty() {
            return Ok(());
        }

        // Drain first: in-flight tasks may still fork children, and queued
        // work runs to completion before the workers stop. Only then do new
        // submissions get rejected.
        while self.core.outstanding.load() != 0 {
            thread::sleep(Duration::from_millis(1));
        }

        self.core.shutdown.store(true, Ordering::Release);
        self.core.wake.signal();

        let mut panicked = 0;
        for worker in std::mem::take(&mut self.workers) {
            let id = worker.id();
            if worker.join().is_err() {
                panicked += 1;
                eprintln!("worker {} panicked during execution", id);
            }
        }

        if panicked > 0 {
            Err(SchedulerError::WorkerPanicked { count: panicked })
        } else {
            Ok(())
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let _ = self.shutdown_impl();
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Scheduler::new(SchedulerParams::default())
    }
}
