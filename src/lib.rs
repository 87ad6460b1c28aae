//! # taskfiber: fiber-based task scheduler
//!
//! A task scheduler for CPU-bound, fine-grained parallelism on multi-core
//! machines. Work is decomposed into small tasks with dependencies expressed
//! through group handles, and a fixed pool of worker threads executes them.
//! Tasks run on cooperatively scheduled user-space stacks (fibers), so a
//! task can suspend itself to wait on child tasks without blocking its
//! worker thread: the fiber is parked on the group and the worker keeps
//! executing other work until the group completes.
//!
//! ## Architecture
//!
//! - **Fibers**: stackful execution contexts, pooled and reused, that park
//!   and resume without touching the OS scheduler.
//! - **Task pool**: a fixed, generation-tagged slab; handles are copyable
//!   and stale ones cleanly report invalid.
//! - **Groups**: completion barriers with optional parent chaining.
//! - **Workers**: one OS thread each, with a local LIFO queue, a
//!   pending-resume list, and FIFO work stealing from siblings.
//!
//! ## Example
//!
//! ```no_run
//! use taskfiber::Scheduler;
//!
//! let scheduler = Scheduler::with_workers(4);
//! let group = scheduler.create_group();
//!
//! scheduler
//!     .submit_fn(&group, |ctx| {
//!         let children = ctx.create_group();
//!         for index in 0..8 {
//!             ctx.submit_fn(&children, move |_| {
//!                 println!("child {} running", index);
//!             })
//!             .unwrap();
//!         }
//!         // Suspends this task; the worker stays busy with the children.
//!         ctx.wait(&children);
//!     })
//!     .unwrap();
//!
//! scheduler.wait(&group);
//! scheduler.shutdown().unwrap();
//! ```

pub mod atomic;
pub mod fiber;
pub mod group;
pub mod observer;
pub mod queue;
pub mod ring_buffer;
pub mod scheduler;
pub mod stack;
pub mod task;
pub mod task_pool;
pub mod trace;

mod event;
mod fiber_pool;
mod worker;

pub use group::TaskGroup;
pub use observer::{NullObserver, SchedulerObserver};
pub use scheduler::{Scheduler, SchedulerError, SchedulerParams};
pub use task::{Task, TaskContext};
pub use task_pool::{TaskHandle, TaskPool};
pub use trace::ChromeTracer;
