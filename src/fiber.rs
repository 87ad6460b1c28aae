//! Fibers: user-space execution contexts with their own stacks.
//!
//! A fiber runs task bodies on a guard-paged stack of its own, multiplexed
//! onto whichever worker thread resumes it. The body is a loop: receive a
//! unit of work, run it, report completion, and wait for the next
//! assignment, so one fiber serves many tasks without re-allocating its
//! stack. A fiber may also suspend itself mid-task (to wait on a group or to
//! yield); control then returns to the worker that resumed it, which decides
//! where the fiber goes next.
//!
//! The worker thread's native context plays the role of the "main" fiber:
//! the suspended side of every `resume` is the caller's own context, so
//! switching back to the worker is simply a suspend.

use crate::group::TaskGroup;
use crate::stack;
use corosensei::stack::DefaultStack;
use corosensei::{Coroutine, CoroutineResult, Yielder};
use std::cell::Cell;
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Work handed to a fiber on its first resume of a task.
pub type FiberBody = Box<dyn FnOnce() + Send + 'static>;

/// What a fiber is resumed with.
pub enum FiberInput {
    /// Start running a new task body.
    Run(FiberBody),
    /// Continue a previously suspended fiber.
    Resume,
}

/// Why a fiber handed control back.
pub enum FiberYield {
    /// The task body finished; the fiber is reusable.
    Completed,
    /// The fiber asked to be rescheduled.
    Yielded,
    /// The fiber waits for the group to complete.
    Parked(TaskGroup),
}

/// Outcome of one `Fiber::resume` call, as seen by the resuming context.
pub enum FiberState {
    Completed,
    Yielded,
    Parked(TaskGroup),
    /// Something unwound past the task boundary; the fiber is unusable.
    Panicked(Box<dyn std::any::Any + Send>),
}

/// A suspended fiber waiting to continue, pinned to the worker that parked
/// it.
pub(crate) struct ParkedFiber {
    pub(crate) fiber: Box<Fiber>,
    pub(crate) worker: usize,
}

#[derive(Clone, Copy)]
struct FiberHandle(*const Fiber);

thread_local! {
    static CURRENT_FIBER: Cell<Option<FiberHandle>> = const { Cell::new(None) };
}

/// A stackful execution context.
pub struct Fiber {
    id: usize,
    coroutine: Option<Coroutine<FiberInput, FiberYield, (), DefaultStack>>,
    /// Set by the fiber body on first entry; valid for the coroutine's
    /// lifetime, only dereferenced while this fiber is the running one.
    yielder: Cell<*const Yielder<FiberInput, FiberYield>>,
}

impl Fiber {
    /// Creates a fiber with a fresh stack of at least `stack_size` bytes.
    /// No user code runs until the first resume.
    pub fn new(id: usize, stack_size: usize) -> io::Result<Fiber> {
        let stack = stack::alloc_stack(stack_size)?;
        let coroutine = Coroutine::with_stack(stack, move |yielder, mut input: FiberInput| {
            // Publish the yielder through the handle the resuming side
            // installed, so suspend_current can reach it.
            if let Some(handle) = CURRENT_FIBER.get() {
                unsafe {
                    (*handle.0).yielder.set(yielder as *const _);
                }
            }
            loop {
                if let FiberInput::Run(body) = input {
                    body();
                }
                input = yielder.suspend(FiberYield::Completed);
            }
        });

        Ok(Fiber {
            id,
            coroutine: Some(coroutine),
            yielder: Cell::new(std::ptr::null()),
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Transfers control into this fiber until it completes, suspends, or
    /// panics. Stores performed by the caller are visible inside the fiber
    /// and vice versa.
    pub fn resume(&mut self, input: FiberInput) -> FiberState {
        crate::atomic::full_memory_barrier();

        let self_ptr = self as *const Fiber;
        let Some(coroutine) = self.coroutine.as_mut() else {
            return FiberState::Panicked(Box::new("fiber already unwound"));
        };

        let previous = CURRENT_FIBER.replace(Some(FiberHandle(self_ptr)));
        let result = catch_unwind(AssertUnwindSafe(|| coroutine.resume(input)));
        CURRENT_FIBER.set(previous);

        match result {
            Ok(CoroutineResult::Yield(FiberYield::Completed)) => FiberState::Completed,
            Ok(CoroutineResult::Yield(FiberYield::Yielded)) => FiberState::Yielded,
            Ok(CoroutineResult::Yield(FiberYield::Parked(group))) => FiberState::Parked(group),
            Ok(CoroutineResult::Return(())) => {
                unreachable!("fiber body returned instead of yielding completion")
            }
            Err(payload) => {
                self.coroutine = None;
                FiberState::Panicked(payload)
            }
        }
    }

    /// Suspends the currently running fiber with the given notice,
    /// returning control to the context that resumed it. Returns once the
    /// fiber is resumed again.
    ///
    /// Panics when called outside a fiber.
    pub fn suspend_current(notice: FiberYield) {
        let handle = CURRENT_FIBER
            .get()
            .expect("suspend_current called outside a fiber");
        unsafe {
            let yielder = (*handle.0).yielder.get();
            debug_assert!(!yielder.is_null(), "fiber suspended before first entry");
            let _ = (*yielder).suspend(notice);
        }
    }

    /// Whether the calling code runs on a fiber (thread contexts report
    /// false).
    pub fn is_fiber_context() -> bool {
        CURRENT_FIBER.get().is_some()
    }
}

// A fiber is only ever active on one thread at a time; the raw yielder
// pointer is only dereferenced from that thread.
unsafe impl Send for Fiber {}
