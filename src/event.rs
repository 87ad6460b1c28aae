//! Global wake event for idle workers.
//!
//! An epoch counter paired with a condvar. A worker samples the epoch
//! before scanning for work; if the scan comes up empty it sleeps until the
//! epoch moves past the sample or a timeout fires. A signal raised between
//! the sample and the sleep is therefore never missed, and coalesced
//! signals are fine because workers re-scan their queues on every wake.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub(crate) struct WakeEvent {
    epoch: AtomicU64,
    lock: Mutex<()>,
    wake: Condvar,
}

impl WakeEvent {
    pub(crate) fn new() -> Self {
        WakeEvent {
            epoch: AtomicU64::new(0),
            lock: Mutex::new(()),
            wake: Condvar::new(),
        }
    }

    /// Samples the current epoch; pass it to `wait` after an empty scan.
    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Advances the epoch and wakes every sleeper.
    pub(crate) fn signal(&self) {
        self.epoch.fetch_add(1, Ordering::Release);
        let _guard = self.lock.lock();
        self.wake.notify_all();
    }

    /// Sleeps until the epoch moves past `seen` or `timeout` elapses.
    pub(crate) fn wait(&self, seen: u64, timeout: Duration) {
        let mut guard = self.lock.lock();
        while self.epoch.load(Ordering::Acquire) == seen {
            if self.wake.wait_for(&mut guard, timeout).timed_out() {
                break;
            }
        }
    }
}
