//! A counting semaphore with wait-for-zero support.

use std::sync::{Condvar, Mutex};

/// A blocking counting semaphore.
///
/// Unlike `std::sync::Semaphore`-style permits, this semaphore exposes the
/// raw counter: [`decrement`](Semaphore::decrement) blocks until the value
/// is large enough (never driving it negative), while the `force_*`
/// operations adjust the value without blocking and may take it negative,
/// useful to model capacity "debt" and to break waiters loose on
/// cancellation. [`wait_empty`](Semaphore::wait_empty) blocks until the
/// value is exactly zero, which the transfer orchestrator uses as a
/// completion barrier.
///
/// Fairness among blocked decrementers is not guaranteed; only eventual
/// progress as increments arrive.
///
/// # Example
///
/// ```rust
/// use xferline::sync::Semaphore;
///
/// let gate = Semaphore::new(2);
/// gate.decrement(1);
/// gate.decrement(1);
/// assert_eq!(gate.value(), 0);
/// gate.increment(2);
/// assert_eq!(gate.value(), 2);
/// ```
pub struct Semaphore {
    value: Mutex<i32>,
    /// Signalled whenever the value grows or is forced, so blocked
    /// decrementers re-check.
    decrement_cond: Condvar,
    /// Signalled whenever the value reaches zero.
    zero_cond: Condvar,
}

impl Semaphore {
    /// Create a new semaphore with the given initial value.
    ///
    /// The initial value may be negative, zero, or positive.
    pub fn new(initial: i32) -> Self {
        Self {
            value: Mutex::new(initial),
            decrement_cond: Condvar::new(),
            zero_cond: Condvar::new(),
        }
    }

    /// Add `n` to the value without blocking.
    ///
    /// Wakes threads blocked in [`decrement`](Semaphore::decrement), and
    /// threads blocked in [`wait_empty`](Semaphore::wait_empty) if the
    /// value lands on zero.
    pub fn increment(&self, n: u32) {
        let mut value = self.value.lock().unwrap();
        *value += n as i32;
        self.wake(*value);
    }

    /// Subtract `n` from the value, blocking until the value is at least
    /// `n`.
    ///
    /// This path never drives the value negative. Wakes
    /// [`wait_empty`](Semaphore::wait_empty) waiters if the value lands
    /// on zero.
    pub fn decrement(&self, n: u32) {
        let n = n as i32;
        let mut value = self.value.lock().unwrap();
        while *value < n {
            value = self.decrement_cond.wait(value).unwrap();
        }
        *value -= n;
        self.wake(*value);
    }

    /// Add `delta` (possibly negative) to the value without blocking.
    ///
    /// This is the only ordinary-use path that may take the value
    /// negative. Wakes decrement and zero waiters as applicable.
    pub fn force_adjust(&self, delta: i32) {
        let mut value = self.value.lock().unwrap();
        *value += delta;
        self.wake(*value);
    }

    /// Overwrite the value without blocking.
    ///
    /// Wakes decrement and zero waiters as applicable.
    pub fn force_set(&self, new_value: i32) {
        let mut value = self.value.lock().unwrap();
        *value = new_value;
        self.wake(*value);
    }

    /// Block until the value is zero, without altering it.
    ///
    /// A value that touches zero and immediately moves away may or may
    /// not wake a waiter; once the value stays at zero, every waiter
    /// returns.
    pub fn wait_empty(&self) {
        let mut value = self.value.lock().unwrap();
        while *value != 0 {
            value = self.zero_cond.wait(value).unwrap();
        }
    }

    /// Snapshot of the current value.
    ///
    /// The value may change the instant the lock is released; use only
    /// for diagnostics and tests.
    pub fn value(&self) -> i32 {
        *self.value.lock().unwrap()
    }

    fn wake(&self, value: i32) {
        // Every mutation can make some blocked decrement satisfiable, and
        // waiter counts are small, so a broadcast is the simplest correct
        // wakeup.
        self.decrement_cond.notify_all();
        if value == 0 {
            self.zero_cond.notify_all();
        }
    }
}

impl std::fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Semaphore")
            .field("value", &self.value())
            .finish()
    }
}
