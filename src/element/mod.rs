//! Element system for xferline pipelines.
//!
//! This module defines the contract every pipeline stage implements:
//!
//! - [`Element`]: the stage itself: source, filter, or sink
//! - [`Mechanism`] / [`MechPair`]: the transfer calling conventions an
//!   element supports on each side
//! - [`ElementContext`]: the wiring (neighbor links, transfer
//!   back-reference) handed to each element at start
//!
//! # Design
//!
//! Elements are *passive by default*: a pattern source only answers
//! `pull_buffer` calls, a push sink only absorbs `push_buffer` calls.
//! The [`Transfer`](crate::xfer::Transfer) orchestrator spawns a worker
//! thread only where a negotiated mechanism pairing leaves an element
//! driving data on its own (e.g., a filter that pulls upstream and
//! pushes downstream), so every edge of the pipeline has exactly one
//! logical pump, never zero and never two.

mod context;
mod mech;
mod traits;

pub use context::{DownstreamLink, ElementContext, UpstreamLink};
pub use mech::{MechPair, MechPairs, Mechanism};
pub use traits::{CancelFlag, Element};
