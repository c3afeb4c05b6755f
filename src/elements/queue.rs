//! Semaphore-gated buffering element.

use crate::buffer::Buffer;
use crate::element::{CancelFlag, Element, MechPair, MechPairs, Mechanism};
use crate::error::{Error, Result};
use crate::sync::Semaphore;
use smallvec::smallvec;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Value the gate semaphores are forced to on cancellation, large enough
/// to satisfy every possible blocked waiter.
const CANCEL_RELEASE: i32 = 1 << 20;

/// A bounded in-flight buffer store bridging a pushing producer to a
/// pulling consumer.
///
/// This is the element that decouples the two driving sides of a
/// pipeline: upstream pushes into it, downstream pulls out of it, and
/// two gate [`Semaphore`]s bound the buffers in flight: `slots` counts
/// free capacity (push blocks when it hits zero) and `items` counts
/// queued buffers (pull blocks when it hits zero). Buffers leave in the
/// order they arrived.
///
/// Cancellation force-sets both gates so any thread blocked inside a
/// push or pull wakes immediately and observes the flag.
pub struct Queue {
    name: String,
    capacity: usize,
    slots: Semaphore,
    items: Semaphore,
    queue: Mutex<VecDeque<Option<Buffer>>>,
    eof: AtomicBool,
    cancelled: CancelFlag,
}

impl Queue {
    /// Create a queue holding at most `capacity` buffers.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::Config("queue capacity must be at least 1".into()));
        }
        Ok(Self {
            name: "queue".to_string(),
            capacity,
            slots: Semaphore::new(capacity as i32),
            items: Semaphore::new(0),
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            eof: AtomicBool::new(false),
            cancelled: CancelFlag::new(),
        })
    }

    /// Set a custom name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Configured capacity in buffers.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Buffers currently queued.
    pub fn len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// Whether the queue is currently empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Element for Queue {
    fn name(&self) -> &str {
        &self.name
    }

    fn mech_pairs(&self) -> MechPairs {
        smallvec![MechPair::new(
            Mechanism::PushBuffer,
            Mechanism::PullBuffer,
            1
        )]
    }

    fn push_buffer(&self, buf: Option<Buffer>) -> Result<()> {
        if self.cancelled.is_cancelled() {
            return Ok(());
        }
        self.slots.decrement(1);
        // The gate may have been forced open by cancel() while we were
        // blocked; re-check before touching the queue.
        if self.cancelled.is_cancelled() {
            return Ok(());
        }
        self.queue.lock().unwrap().push_back(buf);
        self.items.increment(1);
        Ok(())
    }

    fn pull_buffer(&self) -> Result<Option<Buffer>> {
        if self.cancelled.is_cancelled() || self.eof.load(Ordering::Acquire) {
            return Ok(None);
        }
        self.items.decrement(1);
        if self.cancelled.is_cancelled() {
            return Ok(None);
        }
        match self.queue.lock().unwrap().pop_front() {
            Some(Some(buf)) => {
                self.slots.increment(1);
                Ok(Some(buf))
            }
            Some(None) => {
                self.eof.store(true, Ordering::Release);
                self.slots.increment(1);
                Ok(None)
            }
            // Forced awake with nothing queued: only happens on cancel.
            None => Ok(None),
        }
    }

    fn cancel(&self) {
        self.cancelled.cancel();
        self.slots.force_set(CANCEL_RELEASE);
        self.items.force_set(CANCEL_RELEASE);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.is_cancelled()
    }
}
