//! Concrete pipeline elements.
//!
//! Sources ([`PatternSource`], [`RandomSource`], [`FdSource`]), sinks
//! ([`NullSink`], [`FdSink`]), filters ([`XorFilter`]), a buffering
//! [`Queue`], and the two halves of a direct-TCP edge
//! ([`DirectTcpSend`], [`DirectTcpSink`]). Each advertises the
//! mechanism pairings it supports; the owning transfer picks one per
//! neighbor at negotiation time.

mod directtcp;
mod fd;
mod null;
mod pattern;
mod queue;
mod random;
mod xor;

pub use directtcp::{DirectTcpSend, DirectTcpSink};
pub use fd::{FdSink, FdSource};
pub use null::NullSink;
pub use pattern::PatternSource;
pub use queue::Queue;
pub use random::RandomSource;
pub use xor::XorFilter;
