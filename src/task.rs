//! Task capability and the context handed to running tasks.

use crate::fiber::{Fiber, FiberYield};
use crate::group::TaskGroup;
use crate::scheduler::{wait_for_group, SchedulerCore, SchedulerError};
use crate::task_pool::TaskHandle;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

/// A unit of caller-supplied work.
///
/// Any type with an entry point (and optionally a debug identity) can be
/// submitted; closures are accepted through [`Scheduler::submit_fn`] and
/// [`TaskContext::submit_fn`].
///
/// [`Scheduler::submit_fn`]: crate::Scheduler::submit_fn
pub trait Task: Send + 'static {
    /// Runs the task. Consumes the task; a task executes exactly once.
    fn run(self: Box<Self>, ctx: &TaskContext);

    /// Short identifier for instrumentation.
    fn debug_id(&self) -> &'static str {
        "task"
    }

    /// Display color for instrumentation, `0xAARRGGBB`.
    fn debug_color(&self) -> u32 {
        0xffff_ffff
    }
}

/// Adapter turning a closure into a [`Task`].
pub(crate) struct FnTask<F>(pub(crate) F);

impl<F> Task for FnTask<F>
where
    F: FnOnce(&TaskContext) + Send + 'static,
{
    fn run(self: Box<Self>, ctx: &TaskContext) {
        (self.0)(ctx)
    }

    fn debug_id(&self) -> &'static str {
        "closure"
    }
}

/// What a task-pool slot stores for a queued task.
pub(crate) struct TaskPayload {
    pub(crate) work: Box<dyn Task>,
    pub(crate) group: TaskGroup,
}

/// A dequeued task bound to the worker that will run it.
pub(crate) struct TaskRun {
    pub(crate) work: Box<dyn Task>,
    pub(crate) group: TaskGroup,
    pub(crate) core: Arc<SchedulerCore>,
    pub(crate) worker_id: usize,
}

impl TaskRun {
    /// Runs the task body on the current fiber and reports completion.
    ///
    /// Panics from the body are contained here: the group still completes
    /// and nothing unwinds across a fiber switch.
    pub(crate) fn execute(self) {
        let TaskRun {
            work,
            group,
            core,
            worker_id,
        } = self;

        let debug_id = work.debug_id();
        core.observer
            .on_task_start(worker_id, debug_id, work.debug_color());
        let started_at = Instant::now();

        let ctx = TaskContext {
            core: &core,
            worker_id,
        };
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| work.run(&ctx))) {
            eprintln!(
                "task '{}' panicked on worker {}: {}",
                debug_id,
                worker_id,
                panic_message(payload.as_ref())
            );
        }

        core.observer.on_task_stop(worker_id, debug_id, started_at);
        core.finish_task(&group);
    }
}

/// Capabilities available to a running task.
///
/// Borrowed for the duration of the task body; everything submitted through
/// it goes to the same scheduler that is running the task.
pub struct TaskContext<'a> {
    core: &'a Arc<SchedulerCore>,
    worker_id: usize,
}

impl TaskContext<'_> {
    /// The worker this task started on.
    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// Creates an independent group.
    pub fn create_group(&self) -> TaskGroup {
        TaskGroup::new()
    }

    /// Creates a group whose completion `parent` additionally waits for.
    pub fn create_subgroup(&self, parent: &TaskGroup) -> TaskGroup {
        TaskGroup::with_parent(parent)
    }

    /// Submits a task under `group`.
    pub fn submit<T: Task>(&self, group: &TaskGroup, task: T) -> Result<TaskHandle, SchedulerError> {
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

    /// Submits every task in `tasks` under `group`, waking workers once.
    pub fn submit_all<T, I>(&self, group: &TaskGroup, tasks: I) -> Result<Vec<TaskHandle>, SchedulerError>
    where
        T: Task,
        I: IntoIterator<Item = T>,
    {
        let result = self.core.submit_many(group, tasks);
        self.core.signal_submission();
        result
    }

    /// Suspends the calling task until `group` completes. The worker keeps
    /// running other tasks in the meantime.
    pub fn wait(&self, group: &TaskGroup) {
        wait_for_group(group);
    }

    /// Reschedules the calling task, letting its worker pick up other work.
    pub fn yield_now(&self) {
        if Fiber::is_fiber_context() {
            Fiber::suspend_current(FiberYield::Yielded);
        } else {
            std::thread::yield_now();
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}
