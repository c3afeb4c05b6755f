//! The core element contract.

use crate::buffer::Buffer;
use crate::directtcp::{AddrList, DirectTcpAddr};
use crate::element::{ElementContext, MechPairs};
use crate::error::{Error, Result};
use std::os::fd::OwnedFd;
use std::sync::atomic::{AtomicBool, Ordering};

/// One stage in a transfer pipeline.
///
/// An element advertises the mechanism pairings it supports via
/// [`mech_pairs`](Element::mech_pairs); the owning
/// [`Transfer`](crate::xfer::Transfer) negotiates one pairing per
/// adjacent element at build time and never changes it afterwards.
///
/// Methods take `&self`: elements are shared between the orchestrator
/// and the worker threads of their neighbors, so role-specific state
/// lives behind interior mutability. Only the methods matching an
/// element's negotiated mechanisms are ever called; the defaults reject
/// the rest.
///
/// # EOF convention
///
/// `pull_buffer` returns `Ok(None)` at end of stream; `push_buffer`
/// receives `None` as the end-of-stream signal. A cancelled element
/// returns EOF from its next pull and silently stops accepting pushes.
pub trait Element: Send + Sync {
    /// The element's name, used in logs, events, and error messages.
    fn name(&self) -> &str;

    /// The upstream/downstream mechanism pairings this element supports.
    fn mech_pairs(&self) -> MechPairs;

    /// Whether this element produces its own end-of-stream rather than
    /// relying on upstream signaling.
    fn can_generate_eof(&self) -> bool {
        false
    }

    /// Wire the element to its neighbors and owning transfer.
    ///
    /// Called exactly once, after negotiation and direct-TCP setup but
    /// before any data moves. Elements that need neighbor links or the
    /// transfer back-reference store the context; the default discards
    /// it.
    fn setup(&self, ctx: ElementContext) -> Result<()> {
        drop(ctx);
        Ok(())
    }

    /// Serve one buffer to the caller (pull-buffer mechanism).
    ///
    /// Returns `Ok(None)` at end of stream or after cancellation.
    fn pull_buffer(&self) -> Result<Option<Buffer>> {
        Err(Error::Protocol(format!(
            "element '{}' does not serve pull-buffer",
            self.name()
        )))
    }

    /// Accept one buffer from the caller (push-buffer mechanism).
    ///
    /// `None` signals end of stream. After cancellation the element
    /// discards pushes without error.
    fn push_buffer(&self, buf: Option<Buffer>) -> Result<()> {
        drop(buf);
        Err(Error::Protocol(format!(
            "element '{}' does not accept push-buffer",
            self.name()
        )))
    }

    /// A duplicated file descriptor a consumer can read this element's
    /// output from (read-fd mechanism).
    fn reader_fd(&self) -> Result<OwnedFd> {
        Err(Error::Config(format!(
            "element '{}' does not provide a readable fd",
            self.name()
        )))
    }

    /// A duplicated file descriptor a producer can write this element's
    /// input to (write-fd mechanism).
    fn writer_fd(&self) -> Result<OwnedFd> {
        Err(Error::Config(format!(
            "element '{}' does not provide a writable fd",
            self.name()
        )))
    }

    /// Bind and publish direct-TCP candidate addresses (downstream side
    /// of a direct-TCP edge). The returned list is sentinel-terminated.
    fn listen(&self) -> Result<AddrList> {
        Err(Error::Config(format!(
            "element '{}' cannot listen for direct-TCP",
            self.name()
        )))
    }

    /// Connect to one of a peer's published direct-TCP addresses
    /// (upstream side of a direct-TCP edge). The list may carry a
    /// trailing sentinel.
    fn connect(&self, addrs: &[DirectTcpAddr]) -> Result<()> {
        let _ = addrs;
        Err(Error::Config(format!(
            "element '{}' cannot connect for direct-TCP",
            self.name()
        )))
    }

    /// Body of a self-driving worker, for elements whose negotiated
    /// mechanisms leave no neighbor to drive them (e.g., the consumer
    /// side of a direct-TCP edge).
    fn run_worker(&self) -> Result<()> {
        Err(Error::Protocol(format!(
            "element '{}' has no self-driving worker",
            self.name()
        )))
    }

    /// Request cancellation. Idempotent; the flag never resets.
    fn cancel(&self);

    /// Whether cancellation has been requested.
    fn is_cancelled(&self) -> bool;
}

/// Monotonic cancellation flag shared by all element implementations.
///
/// The flag only ever goes `false → true`. The release/acquire pairing
/// guarantees that once [`cancel`](CancelFlag::cancel) returns on one
/// thread, no other thread still observes the element as live.
#[derive(Debug, Default)]
pub struct CancelFlag(AtomicBool);

impl CancelFlag {
    /// Create an un-cancelled flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Read the flag.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag_is_monotonic() {
        let flag = CancelFlag::new();
        assert!(!flag.is_cancelled());
        flag.cancel();
        assert!(flag.is_cancelled());
        flag.cancel();
        assert!(flag.is_cancelled());
    }
}
