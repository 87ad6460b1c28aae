//! Optional instrumentation hooks.
//!
//! Everything is a no-op by default; a scheduler is handed one observer at
//! construction and invokes it from the worker threads, so implementations
//! must be cheap and thread-safe.

use std::time::Instant;

/// Pseudo fiber id for a worker's native thread context in
/// `on_fiber_switch` notifications.
pub const WORKER_CONTEXT: usize = usize::MAX;

pub trait SchedulerObserver: Send + Sync {
    /// A task body is about to run on `worker`.
    fn on_task_start(&self, _worker: usize, _debug_id: &'static str, _debug_color: u32) {}

    /// A task body finished (or panicked) on `worker`; `started_at` is the
    /// instant the body was entered.
    fn on_task_stop(&self, _worker: usize, _debug_id: &'static str, _started_at: Instant) {}

    /// Control transferred between execution contexts on `worker`;
    /// [`WORKER_CONTEXT`] denotes the worker's own thread context.
    fn on_fiber_switch(&self, _worker: usize, _from_fiber: usize, _to_fiber: usize) {}

    /// `worker` found no work and is about to sleep.
    fn on_worker_idle(&self, _worker: usize) {}

    /// `worker` woke from an idle sleep.
    fn on_worker_resume(&self, _worker: usize) {}
}

/// The default observer: ignores everything.
pub struct NullObserver;

impl SchedulerObserver for NullObserver {}
