//! Transfer mechanisms and mechanism pairings.

use smallvec::SmallVec;

/// The data-transfer calling convention an element supports on one side.
///
/// A mechanism describes *who drives* the edge between two adjacent
/// elements:
///
/// - [`PushBuffer`](Mechanism::PushBuffer): the producer calls the
///   consumer's `push_buffer`; the producer side drives.
/// - [`PullBuffer`](Mechanism::PullBuffer): the consumer calls the
///   producer's `pull_buffer`; the consumer side drives.
/// - [`ReadFd`](Mechanism::ReadFd): the consumer reads the producer's
///   file descriptor; the consumer side drives.
/// - [`WriteFd`](Mechanism::WriteFd): the producer writes into the
///   consumer's file descriptor; the producer side drives.
/// - [`DirectTcp`](Mechanism::DirectTcp): the elements open a socket
///   between themselves and stream peer-to-peer, bypassing the
///   orchestrator's process for that edge.
/// - [`None`](Mechanism::None): no connection on that side (the outer
///   side of a source or sink).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mechanism {
    /// No connection on this side.
    None,
    /// Producer pushes buffers into the consumer.
    PushBuffer,
    /// Consumer pulls buffers from the producer.
    PullBuffer,
    /// Consumer reads from a file descriptor the producer provides.
    ReadFd,
    /// Producer writes into a file descriptor the consumer provides.
    WriteFd,
    /// Peer-to-peer TCP connection negotiated between the two elements.
    DirectTcp,
}

impl Mechanism {
    /// Fixed global preference rank used during negotiation; higher wins.
    ///
    /// The order is `DirectTcp > PushBuffer > PullBuffer > ReadFd >
    /// WriteFd > None`, most specific first. This ordering is part of
    /// the crate's contract: it affects buffering and throughput, so it
    /// must stay stable across releases.
    pub fn preference(self) -> u8 {
        match self {
            Self::DirectTcp => 5,
            Self::PushBuffer => 4,
            Self::PullBuffer => 3,
            Self::ReadFd => 2,
            Self::WriteFd => 1,
            Self::None => 0,
        }
    }

    /// Whether the upstream (producer) side of an edge with this
    /// mechanism drives the data movement.
    pub fn upstream_drives(self) -> bool {
        matches!(self, Self::PushBuffer | Self::WriteFd)
    }

    /// Whether the downstream (consumer) side of an edge with this
    /// mechanism drives the data movement.
    pub fn downstream_drives(self) -> bool {
        matches!(self, Self::PullBuffer | Self::ReadFd)
    }
}

impl std::fmt::Display for Mechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::PushBuffer => "push-buffer",
            Self::PullBuffer => "pull-buffer",
            Self::ReadFd => "read-fd",
            Self::WriteFd => "write-fd",
            Self::DirectTcp => "direct-tcp",
        };
        f.write_str(s)
    }
}

/// One upstream/downstream mechanism pairing an element supports.
///
/// Elements advertise pairings rather than two independent capability
/// sets because the two sides can be coupled: a filter may support
/// pull-through and push-through but not an internal push-to-pull
/// buffer. The `weight` breaks ties between pairings that rank equally
/// in the global preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MechPair {
    /// Mechanism on the upstream (input) side.
    pub upstream: Mechanism,
    /// Mechanism on the downstream (output) side.
    pub downstream: Mechanism,
    /// Tie-break weight; larger is preferred.
    pub weight: u8,
}

impl MechPair {
    /// Create a pairing with the given tie-break weight.
    pub const fn new(upstream: Mechanism, downstream: Mechanism, weight: u8) -> Self {
        Self {
            upstream,
            downstream,
            weight,
        }
    }
}

/// An element's advertised mechanism pairings.
pub type MechPairs = SmallVec<[MechPair; 4]>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preference_order_is_stable() {
        let order = [
            Mechanism::DirectTcp,
            Mechanism::PushBuffer,
            Mechanism::PullBuffer,
            Mechanism::ReadFd,
            Mechanism::WriteFd,
            Mechanism::None,
        ];
        for pair in order.windows(2) {
            assert!(pair[0].preference() > pair[1].preference());
        }
    }

    #[test]
    fn test_exactly_one_driver_per_mechanism() {
        for mech in [
            Mechanism::PushBuffer,
            Mechanism::PullBuffer,
            Mechanism::ReadFd,
            Mechanism::WriteFd,
        ] {
            assert!(
                mech.upstream_drives() ^ mech.downstream_drives(),
                "{mech} must have exactly one driving side"
            );
        }
        // Direct-TCP edges are driven by the kernel socket between the
        // two elements, not by either pump loop.
        assert!(!Mechanism::DirectTcp.upstream_drives());
        assert!(!Mechanism::DirectTcp.downstream_drives());
    }
}
