//! Per-element wiring handed out by the transfer orchestrator.

use crate::buffer::{Buffer, CHUNK_SIZE};
use crate::element::{Element, Mechanism};
use crate::error::{Error, Result};
use std::fs::File;
use std::io::{Read, Write};
use std::sync::Arc;

use crate::xfer::TransferRef;

/// Handle for receiving data from an upstream neighbor.
///
/// Encapsulates the negotiated mechanism of the upstream edge:
/// [`pull`](UpstreamLink::pull) either calls the neighbor's
/// `pull_buffer` or reads a chunk from the neighbor's file descriptor.
pub struct UpstreamLink {
    peer: Arc<dyn Element>,
    mech: Mechanism,
    fd: Option<File>,
}

impl UpstreamLink {
    pub(crate) fn new(peer: Arc<dyn Element>, mech: Mechanism, fd: Option<File>) -> Self {
        Self { peer, mech, fd }
    }

    /// The negotiated mechanism of this edge.
    pub fn mechanism(&self) -> Mechanism {
        self.mech
    }

    /// The upstream element's name.
    pub fn peer_name(&self) -> &str {
        self.peer.name()
    }

    /// Receive the next buffer from upstream; `Ok(None)` is EOF.
    pub fn pull(&self) -> Result<Option<Buffer>> {
        match self.mech {
            Mechanism::PullBuffer => self.peer.pull_buffer(),
            Mechanism::ReadFd => {
                let file = self.fd.as_ref().ok_or_else(|| {
                    Error::Protocol(format!("read-fd link to '{}' has no fd", self.peer.name()))
                })?;
                let mut chunk = vec![0u8; CHUNK_SIZE];
                let n = (&*file).read(&mut chunk)?;
                if n == 0 {
                    return Ok(None);
                }
                chunk.truncate(n);
                Ok(Some(Buffer::from(chunk)))
            }
            other => Err(Error::Protocol(format!(
                "upstream link to '{}' cannot pull over {other}",
                self.peer.name()
            ))),
        }
    }
}

impl std::fmt::Debug for UpstreamLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamLink")
            .field("peer", &self.peer.name())
            .field("mech", &self.mech)
            .finish()
    }
}

/// Handle for delivering data to a downstream neighbor.
///
/// [`send`](DownstreamLink::send) either calls the neighbor's
/// `push_buffer` or writes into the neighbor's file descriptor.
pub struct DownstreamLink {
    peer: Arc<dyn Element>,
    mech: Mechanism,
    fd: Option<File>,
}

impl DownstreamLink {
    pub(crate) fn new(peer: Arc<dyn Element>, mech: Mechanism, fd: Option<File>) -> Self {
        Self { peer, mech, fd }
    }

    /// The negotiated mechanism of this edge.
    pub fn mechanism(&self) -> Mechanism {
        self.mech
    }

    /// The downstream element's name.
    pub fn peer_name(&self) -> &str {
        self.peer.name()
    }

    /// Deliver a buffer downstream; `None` signals EOF.
    pub fn send(&self, buf: Option<Buffer>) -> Result<()> {
        match self.mech {
            Mechanism::PushBuffer => self.peer.push_buffer(buf),
            Mechanism::WriteFd => {
                let file = self.fd.as_ref().ok_or_else(|| {
                    Error::Protocol(format!("write-fd link to '{}' has no fd", self.peer.name()))
                })?;
                match buf {
                    Some(b) => {
                        (&*file).write_all(b.as_bytes())?;
                        Ok(())
                    }
                    // EOF: nothing to write; the fd is released when the
                    // link drops.
                    None => Ok(()),
                }
            }
            other => Err(Error::Protocol(format!(
                "downstream link to '{}' cannot send over {other}",
                self.peer.name()
            ))),
        }
    }
}

impl std::fmt::Debug for DownstreamLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownstreamLink")
            .field("peer", &self.peer.name())
            .field("mech", &self.mech)
            .finish()
    }
}

/// Everything an element needs to participate in a running transfer.
///
/// Built by the orchestrator after negotiation and passed to
/// [`Element::setup`]. Links are present only for the sides the element
/// itself drives inline; edges driven by a neighbor's worker (or by a
/// direct-TCP socket) have no link here.
#[derive(Debug)]
pub struct ElementContext {
    upstream: Option<UpstreamLink>,
    downstream: Option<DownstreamLink>,
    upstream_mech: Mechanism,
    downstream_mech: Mechanism,
    transfer: TransferRef,
}

impl ElementContext {
    pub(crate) fn new(
        upstream: Option<UpstreamLink>,
        downstream: Option<DownstreamLink>,
        upstream_mech: Mechanism,
        downstream_mech: Mechanism,
        transfer: TransferRef,
    ) -> Self {
        Self {
            upstream,
            downstream,
            upstream_mech,
            downstream_mech,
            transfer,
        }
    }

    /// Link for pulling from the upstream neighbor, if this element
    /// drives its upstream edge inline.
    pub fn upstream(&self) -> Option<&UpstreamLink> {
        self.upstream.as_ref()
    }

    /// Link for delivering to the downstream neighbor, if this element
    /// drives its downstream edge inline.
    pub fn downstream(&self) -> Option<&DownstreamLink> {
        self.downstream.as_ref()
    }

    /// The negotiated mechanism on the upstream side.
    pub fn upstream_mech(&self) -> Mechanism {
        self.upstream_mech
    }

    /// The negotiated mechanism on the downstream side.
    pub fn downstream_mech(&self) -> Mechanism {
        self.downstream_mech
    }

    /// Non-owning back-reference to the owning transfer.
    pub fn transfer(&self) -> &TransferRef {
        &self.transfer
    }
}
