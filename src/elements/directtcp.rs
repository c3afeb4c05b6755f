//! Direct-TCP edge elements.
//!
//! A direct-TCP edge moves data over a socket the two elements own
//! between themselves; no buffer crosses the pipeline on that edge. The
//! downstream side listens and publishes candidate addresses, the
//! upstream side connects to the first one that answers.

use crate::buffer::{Buffer, CHUNK_SIZE};
use crate::directtcp::{terminate, strip_sentinel, AddrList, DirectTcpAddr};
use crate::element::{CancelFlag, Element, ElementContext, MechPair, MechPairs, Mechanism};
use crate::error::{Error, Result};
use smallvec::smallvec;
use std::io::{Read, Write};
use std::net::{Ipv4Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

const ACCEPT_POLL: Duration = Duration::from_millis(5);
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Upstream side of a direct-TCP edge.
///
/// Pulls buffers from its upstream neighbor and writes them to the
/// socket established by [`connect`](Element::connect).
pub struct DirectTcpSend {
    name: String,
    stream: OnceLock<TcpStream>,
    ctx: OnceLock<ElementContext>,
    cancelled: CancelFlag,
}

impl DirectTcpSend {
    /// Create an unconnected sender.
    pub fn new() -> Self {
        Self {
            name: "directtcp-send".to_string(),
            stream: OnceLock::new(),
            ctx: OnceLock::new(),
            cancelled: CancelFlag::new(),
        }
    }

    /// Set a custom name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn stream(&self) -> Result<&TcpStream> {
        self.stream.get().ok_or_else(|| {
            Error::Protocol(format!("element '{}' has no connection", self.name))
        })
    }
}

impl Default for DirectTcpSend {
    fn default() -> Self {
        Self::new()
    }
}

impl Element for DirectTcpSend {
    fn name(&self) -> &str {
        &self.name
    }

    fn mech_pairs(&self) -> MechPairs {
        smallvec![
            MechPair::new(Mechanism::PullBuffer, Mechanism::DirectTcp, 1),
            MechPair::new(Mechanism::PushBuffer, Mechanism::DirectTcp, 1),
        ]
    }

    fn setup(&self, ctx: ElementContext) -> Result<()> {
        self.ctx
            .set(ctx)
            .map_err(|_| Error::Config(format!("element '{}' set up twice", self.name)))
    }

    fn connect(&self, addrs: &[DirectTcpAddr]) -> Result<()> {
        let candidates = strip_sentinel(addrs);
        if candidates.is_empty() {
            return Err(Error::Protocol(
                "no direct-TCP addresses to connect to".to_string(),
            ));
        }
        let mut last_err: Option<std::io::Error> = None;
        for addr in candidates {
            match TcpStream::connect(SocketAddr::V4(addr.to_socket_addr())) {
                Ok(stream) => {
                    self.stream.set(stream).map_err(|_| {
                        Error::Protocol(format!("element '{}' connected twice", self.name))
                    })?;
                    return Ok(());
                }
                Err(e) => last_err = Some(e),
            }
        }
        match last_err {
            Some(e) => Err(Error::Io(e)),
            None => Err(Error::Protocol("connect failed".to_string())),
        }
    }

    fn push_buffer(&self, buf: Option<Buffer>) -> Result<()> {
        if self.cancelled.is_cancelled() {
            return Ok(());
        }
        let stream = self.stream()?;
        match buf {
            Some(b) => {
                (&*stream).write_all(b.as_bytes())?;
                Ok(())
            }
            None => match stream.shutdown(Shutdown::Write) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
                Err(e) => Err(Error::Io(e)),
            },
        }
    }

    fn cancel(&self) {
        self.cancelled.cancel();
        // Unblock a worker stuck in write_all against a full socket.
        if let Some(stream) = self.stream.get() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.is_cancelled()
    }
}

/// Downstream side of a direct-TCP edge.
///
/// Listens for the sender's connection, then drains the socket on its
/// own worker, counting (and optionally recording) what arrives.
pub struct DirectTcpSink {
    name: String,
    listener: OnceLock<TcpListener>,
    bytes: AtomicU64,
    record: Option<Mutex<Vec<u8>>>,
    done: AtomicBool,
    cancelled: CancelFlag,
}

impl DirectTcpSink {
    /// Create a sink that only counts bytes.
    pub fn new() -> Self {
        Self {
            name: "directtcp-sink".to_string(),
            listener: OnceLock::new(),
            bytes: AtomicU64::new(0),
            record: None,
            done: AtomicBool::new(false),
            cancelled: CancelFlag::new(),
        }
    }

    /// Create a sink that also keeps a copy of every received byte.
    pub fn recording() -> Self {
        Self {
            record: Some(Mutex::new(Vec::new())),
            ..Self::new()
        }
    }

    /// Set a custom name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Bytes received over the socket so far.
    pub fn bytes_received(&self) -> u64 {
        self.bytes.load(Ordering::Acquire)
    }

    /// The recorded stream, if this sink was built with
    /// [`recording`](DirectTcpSink::recording).
    pub fn received(&self) -> Option<Vec<u8>> {
        self.record
            .as_ref()
            .map(|r| r.lock().unwrap().clone())
    }

    /// Whether the sender closed the connection cleanly.
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    fn accept(&self) -> Result<Option<TcpStream>> {
        let listener = self.listener.get().ok_or_else(|| {
            Error::Protocol(format!("element '{}' is not listening", self.name))
        })?;
        // Poll so a cancel during accept does not hang the worker.
        loop {
            if self.cancelled.is_cancelled() {
                return Ok(None);
            }
            match listener.accept() {
                Ok((stream, _)) => return Ok(Some(stream)),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(ACCEPT_POLL);
                }
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }
}

impl Default for DirectTcpSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Element for DirectTcpSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn mech_pairs(&self) -> MechPairs {
        smallvec![MechPair::new(Mechanism::DirectTcp, Mechanism::None, 1)]
    }

    fn listen(&self) -> Result<AddrList> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
        listener.set_nonblocking(true)?;
        let local = listener.local_addr()?;
        let addr = DirectTcpAddr::try_from(local)?;
        self.listener
            .set(listener)
            .map_err(|_| Error::Config(format!("element '{}' already listening", self.name)))?;
        Ok(terminate([addr]))
    }

    fn run_worker(&self) -> Result<()> {
        let stream = match self.accept()? {
            Some(stream) => stream,
            None => return Ok(()),
        };
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(READ_TIMEOUT))?;

        let mut chunk = vec![0u8; CHUNK_SIZE];
        loop {
            if self.cancelled.is_cancelled() {
                return Ok(());
            }
            match (&stream).read(&mut chunk) {
                Ok(0) => {
                    self.done.store(true, Ordering::Release);
                    return Ok(());
                }
                Ok(n) => {
                    self.bytes.fetch_add(n as u64, Ordering::AcqRel);
                    if let Some(record) = &self.record {
                        record.lock().unwrap().extend_from_slice(&chunk[..n]);
                    }
                }
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }

    fn cancel(&self) {
        self.cancelled.cancel();
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listen_publishes_terminated_loopback_addr() {
        let sink = DirectTcpSink::new();
        let addrs = sink.listen().unwrap();
        assert_eq!(addrs.len(), 2);
        assert_eq!(addrs[0].ip(), Ipv4Addr::LOCALHOST);
        assert_ne!(addrs[0].port, 0);
        assert!(addrs[1].is_sentinel());
    }

    #[test]
    fn test_send_and_drain_over_socket() {
        let sink = DirectTcpSink::recording();
        let addrs = sink.listen().unwrap();

        let send = DirectTcpSend::new();
        send.connect(&addrs).unwrap();

        let worker = std::thread::spawn(move || {
            send.push_buffer(Some(Buffer::from(b"over the wire".to_vec())))
                .unwrap();
            send.push_buffer(None).unwrap();
        });

        sink.run_worker().unwrap();
        worker.join().unwrap();

        assert!(sink.is_done());
        assert_eq!(sink.bytes_received(), 13);
        assert_eq!(sink.received().unwrap(), b"over the wire");
    }

    #[test]
    fn test_connect_skips_dead_candidates() {
        let sink = DirectTcpSink::new();
        let mut addrs = sink.listen().unwrap();
        // A port nothing listens on, ahead of the live one.
        let dead = {
            let scratch = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
            DirectTcpAddr::try_from(scratch.local_addr().unwrap()).unwrap()
        };
        addrs.insert(0, dead);

        let send = DirectTcpSend::new();
        send.connect(&addrs).unwrap();
        drop(send);
        sink.cancel();
        sink.run_worker().unwrap();
    }

    #[test]
    fn test_cancelled_sink_worker_returns_without_peer() {
        let sink = DirectTcpSink::new();
        sink.listen().unwrap();
        sink.cancel();
        sink.run_worker().unwrap();
        assert!(!sink.is_done());
    }
}
