//! Direct-TCP addressing.
//!
//! When two adjacent elements negotiate the [`Mechanism::DirectTcp`]
//! mechanism, the downstream element publishes a sentinel-terminated list
//! of [`DirectTcpAddr`] candidates it is listening on, and the upstream
//! element picks one and connects. From then on the data for that edge
//! flows socket-to-socket; the orchestrator only observes completion or
//! error.
//!
//! Only IPv4 is supported. This mirrors the wire protocol the mechanism
//! was built for and is a stated limitation, not an oversight.
//!
//! [`Mechanism::DirectTcp`]: crate::element::Mechanism::DirectTcp

use smallvec::SmallVec;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

/// An IPv4 address and port, as published during direct-TCP negotiation.
///
/// Lists of candidates are conventionally terminated by a sentinel entry
/// whose address and port are both zero; see [`terminate`] and
/// [`strip_sentinel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirectTcpAddr {
    /// IPv4 address as a host-order 32-bit integer.
    pub ipv4: u32,
    /// TCP port.
    pub port: u16,
}

impl DirectTcpAddr {
    /// The `{0, 0}` list terminator.
    pub const SENTINEL: Self = Self { ipv4: 0, port: 0 };

    /// Create an address from its parts.
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self {
            ipv4: u32::from(ip),
            port,
        }
    }

    /// Check whether this entry is the list terminator.
    pub fn is_sentinel(&self) -> bool {
        self.ipv4 == 0 && self.port == 0
    }

    /// The address part.
    pub fn ip(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.ipv4)
    }

    /// Convert to a socket address for connecting or binding.
    pub fn to_socket_addr(self) -> SocketAddrV4 {
        SocketAddrV4::new(self.ip(), self.port)
    }
}

impl std::fmt::Display for DirectTcpAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ip(), self.port)
    }
}

impl TryFrom<SocketAddr> for DirectTcpAddr {
    type Error = crate::Error;

    fn try_from(addr: SocketAddr) -> crate::Result<Self> {
        match addr {
            SocketAddr::V4(v4) => Ok(Self::new(*v4.ip(), v4.port())),
            SocketAddr::V6(_) => Err(crate::Error::Protocol(
                "direct-TCP supports IPv4 addresses only".into(),
            )),
        }
    }
}

/// A short list of direct-TCP address candidates.
pub type AddrList = SmallVec<[DirectTcpAddr; 4]>;

/// Append the `{0, 0}` sentinel to a candidate list.
pub fn terminate(addrs: impl IntoIterator<Item = DirectTcpAddr>) -> AddrList {
    let mut list: AddrList = addrs.into_iter().collect();
    list.push(DirectTcpAddr::SENTINEL);
    list
}

/// Truncate a published list at its sentinel.
///
/// Lists without a sentinel are returned whole; everything after the
/// first sentinel is ignored.
pub fn strip_sentinel(addrs: &[DirectTcpAddr]) -> &[DirectTcpAddr] {
    match addrs.iter().position(DirectTcpAddr::is_sentinel) {
        Some(i) => &addrs[..i],
        None => addrs,
    }
}
