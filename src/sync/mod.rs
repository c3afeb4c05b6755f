//! Blocking synchronization primitives for the transfer pipeline.
//!
//! The [`Semaphore`] here is the building block the pipeline uses both to
//! bound buffers in flight (a "gate") and to detect that all outstanding
//! work has drained to zero ([`Semaphore::wait_empty`]).

mod semaphore;

pub use semaphore::Semaphore;
