//! # xferline
//!
//! A composable data-transfer pipeline for backup tooling.
//!
//! xferline moves bytes from a producer to a consumer through an ordered
//! chain of *elements* (source, zero or more filters, sink). Adjacent
//! elements negotiate a transfer *mechanism* (pull-buffer, push-buffer,
//! raw file descriptors, or a direct TCP connection that bypasses the
//! orchestrating process entirely) and the [`xfer::Transfer`] orchestrator
//! spawns a worker thread only for elements that actively drive data.
//!
//! ## Quick Start
//!
//! ```rust
//! use xferline::prelude::*;
//! use std::sync::Arc;
//!
//! let source = Arc::new(PatternSource::new(b"XY", Some(25)).unwrap());
//! let sink = Arc::new(NullSink::recording());
//!
//! let xfer = Transfer::new(vec![source, sink.clone()]);
//! let handle = xfer.start().unwrap();
//! handle.wait().unwrap();
//!
//! assert_eq!(sink.bytes_received(), 25);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod directtcp;
pub mod element;
pub mod elements;
pub mod error;
pub mod sync;
pub mod xfer;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::buffer::{Buffer, CHUNK_SIZE};
    pub use crate::directtcp::DirectTcpAddr;
    pub use crate::element::{Element, Mechanism};
    pub use crate::elements::{
        DirectTcpSend, DirectTcpSink, FdSink, FdSource, NullSink, PatternSource, Queue,
        RandomSource, XorFilter,
    };
    pub use crate::error::{Error, Result};
    pub use crate::sync::Semaphore;
    pub use crate::xfer::{Transfer, TransferHandle, TransferState};
}

pub use error::{Error, Result};
