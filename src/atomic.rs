//! Typed atomic primitives used by the scheduler internals.
//!
//! Thin wrappers over `std::sync::atomic` with the calling conventions the
//! runtime relies on: `store` returns the previously held value, the fetch
//! operations return the updated value, and `compare_and_swap` takes the
//! replacement first and always reports the value it found.

use std::sync::atomic::{fence, AtomicI32, Ordering};

/// A 32-bit atomic integer.
///
/// All operations are sequentially consistent unless the name says relaxed.
#[derive(Debug)]
pub struct AtomicInt32 {
    value: AtomicI32,
}

impl AtomicInt32 {
    pub const fn new(value: i32) -> Self {
        AtomicInt32 {
            value: AtomicI32::new(value),
        }
    }

    pub fn load(&self) -> i32 {
        self.value.load(Ordering::SeqCst)
    }

    pub fn load_relaxed(&self) -> i32 {
        self.value.load(Ordering::Relaxed)
    }

    /// Stores `value` and returns the previously stored value.
    pub fn store(&self, value: i32) -> i32 {
        self.value.swap(value, Ordering::SeqCst)
    }

    pub fn store_relaxed(&self, value: i32) {
        self.value.store(value, Ordering::Relaxed);
    }

    /// Increments by one and returns the incremented value.
    pub fn inc_fetch(&self) -> i32 {
        self.value.fetch_add(1, Ordering::SeqCst).wrapping_add(1)
    }

    /// Decrements by one and returns the decremented value.
    pub fn dec_fetch(&self) -> i32 {
        self.value.fetch_sub(1, Ordering::SeqCst).wrapping_sub(1)
    }

    /// Adds `delta` and returns the updated value.
    pub fn add_fetch(&self, delta: i32) -> i32 {
        self.value
            .fetch_add(delta, Ordering::SeqCst)
            .wrapping_add(delta)
    }

    /// Stores `new` iff the current value equals `expected`.
    ///
    /// Returns the value found, so the swap took effect iff the result
    /// equals `expected`.
    pub fn compare_and_swap(&self, new: i32, expected: i32) -> i32 {
        match self
            .value
            .compare_exchange(expected, new, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(previous) => previous,
            Err(previous) => previous,
        }
    }
}

impl Default for AtomicInt32 {
    fn default() -> Self {
        AtomicInt32::new(0)
    }
}

/// An atomic raw pointer, null by default.
#[derive(Debug)]
pub struct AtomicPtr<T> {
    value: std::sync::atomic::AtomicPtr<T>,
}

impl<T> AtomicPtr<T> {
    pub const fn new(value: *mut T) -> Self {
        AtomicPtr {
            value: std::sync::atomic::AtomicPtr::new(value),
        }
    }

    pub fn load(&self) -> *mut T {
        self.value.load(Ordering::SeqCst)
    }

    /// Stores `value` and returns the previously stored pointer.
    pub fn store(&self, value: *mut T) -> *mut T {
        self.value.swap(value, Ordering::SeqCst)
    }

    pub fn store_relaxed(&self, value: *mut T) {
        self.value.store(value, Ordering::Relaxed);
    }

    /// Stores `new` iff the current pointer equals `expected`; returns the
    /// pointer found.
    pub fn compare_and_swap(&self, new: *mut T, expected: *mut T) -> *mut T {
        match self
            .value
            .compare_exchange(expected, new, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(previous) => previous,
            Err(previous) => previous,
        }
    }
}

impl<T> Default for AtomicPtr<T> {
    fn default() -> Self {
        AtomicPtr::new(std::ptr::null_mut())
    }
}

/// Full sequentially consistent memory fence.
#[inline]
pub fn full_memory_barrier() {
    fence(Ordering::SeqCst);
}

/// Hint to the CPU that the caller is spinning.
#[inline]
pub fn yield_cpu() {
    std::hint::spin_loop();
}

#[cfg(test)]
mod tests {
    use super::*;

    const OLD_VALUE: i32 = 1;
    const VALUE: i32 = 13;
    const NEW_VALUE: i32 = 16;
    const RELAXED_VALUE: i32 = 27;

    #[test]
    fn int32_contract() {
        let relaxed = AtomicInt32::default();
        relaxed.store_relaxed(RELAXED_VALUE);
        assert_eq!(relaxed.load(), RELAXED_VALUE);

        let value = AtomicInt32::default();
        value.store(OLD_VALUE);
        assert_eq!(value.load(), OLD_VALUE);

        let previous = value.store(VALUE);
        assert_eq!(previous, OLD_VALUE);
        assert_eq!(value.load(), VALUE);

        assert_eq!(value.inc_fetch(), VALUE + 1);
        assert_eq!(value.dec_fetch(), VALUE);
        assert_eq!(value.add_fetch(VALUE), VALUE + VALUE);
    }

    #[test]
    fn int32_compare_and_swap() {
        let value = AtomicInt32::new(VALUE);

        // Expectation does not match, nothing changes.
        let previous = value.compare_and_swap(NEW_VALUE, OLD_VALUE);
        assert_eq!(previous, VALUE);
        assert_eq!(value.load(), VALUE);

        // Expectation matches, swap takes effect.
        let previous = value.compare_and_swap(NEW_VALUE, VALUE);
        assert_eq!(previous, VALUE);
        assert_eq!(value.load(), NEW_VALUE);
    }

    #[test]
    fn pointer_contract() {
        let mut a = 0u8;
        let first: *mut u8 = &mut a;
        let second = unsafe { first.add(1) };

        let relaxed = AtomicPtr::default();
        relaxed.store_relaxed(first);
        assert_eq!(relaxed.load(), first);

        let pointer: AtomicPtr<u8> = AtomicPtr::default();
        assert!(pointer.load().is_null());

        pointer.store(first);
        assert_eq!(pointer.load(), first);

        let previous = pointer.compare_and_swap(second, std::ptr::null_mut());
        assert_eq!(previous, first);
        assert_eq!(pointer.load(), first);

        let previous = pointer.compare_and_swap(second, first);
        assert_eq!(previous, first);
        assert_eq!(pointer.load(), second);
    }
}
