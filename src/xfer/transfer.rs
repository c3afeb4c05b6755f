//! The transfer orchestrator.
//!
//! A [`Transfer`] owns a linear chain of elements, negotiates one
//! mechanism per edge, wires the elements together, and runs one worker
//! thread per driving element until the stream completes, fails, or is
//! cancelled.

use crate::element::{DownstreamLink, Element, ElementContext, Mechanism, UpstreamLink};
use crate::error::{Error, Result};
use crate::sync::Semaphore;
use std::fs::File;
use std::sync::{Arc, Mutex, Weak};
use std::thread::JoinHandle;
use tracing::{debug, error, warn};

use super::events::{EventReceiver, EventSender};
use super::negotiate::negotiate;
use super::XferEvent;

/// Lifecycle state of a transfer.
///
/// `Done`, `Cancelled`, and `Error` are terminal; once reached the
/// state never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// Built but not yet started.
    NotStarted,
    /// Workers are running.
    Started,
    /// The stream completed and every worker exited cleanly.
    Done,
    /// The transfer was cancelled before completing.
    Cancelled,
    /// A worker failed; the first error is kept.
    Error,
}

impl TransferState {
    /// Whether this state is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Cancelled | Self::Error)
    }
}

struct Inner {
    state: TransferState,
    /// First recorded failure, as (element name, message).
    error: Option<(String, String)>,
}

/// State shared between the transfer, its handle, its workers, and the
/// back-references handed to elements.
struct XferShared {
    elements: Vec<Arc<dyn Element>>,
    inner: Mutex<Inner>,
    /// Counts live workers; `wait` blocks until it drains to zero.
    workers: Semaphore,
    events: EventSender,
}

impl XferShared {
    fn new(elements: Vec<Arc<dyn Element>>) -> Self {
        Self {
            elements,
            inner: Mutex::new(Inner {
                state: TransferState::NotStarted,
                error: None,
            }),
            workers: Semaphore::new(0),
            events: EventSender::default(),
        }
    }

    fn state(&self) -> TransferState {
        self.lock().state
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    fn mark_started(&self) {
        let mut inner = self.lock();
        if inner.state == TransferState::NotStarted {
            inner.state = TransferState::Started;
            self.events
                .send_state_changed(TransferState::NotStarted, TransferState::Started);
        }
    }

    /// Move a non-terminal transfer to `Done`.
    fn finish(&self) {
        let mut inner = self.lock();
        if inner.state == TransferState::Started {
            inner.state = TransferState::Done;
            self.events
                .send_state_changed(TransferState::Started, TransferState::Done);
            self.events.send(XferEvent::Done);
        }
    }

    /// Record the first failure and tear the pipeline down.
    fn record_error(&self, element: String, message: String) {
        {
            let mut inner = self.lock();
            if inner.state.is_terminal() {
                return;
            }
            let from = inner.state;
            inner.state = TransferState::Error;
            inner.error = Some((element.clone(), message.clone()));
            self.events.send_state_changed(from, TransferState::Error);
            self.events.send_error(Some(element), message);
        }
        self.cancel_elements();
    }

    fn cancel(&self) {
        {
            let mut inner = self.lock();
            if inner.state.is_terminal() {
                return;
            }
            let from = inner.state;
            inner.state = TransferState::Cancelled;
            self.events
                .send_state_changed(from, TransferState::Cancelled);
            self.events.send(XferEvent::Cancelled);
        }
        self.cancel_elements();
    }

    fn cancel_elements(&self) {
        for elt in &self.elements {
            elt.cancel();
        }
    }
}

/// Non-owning back-reference to a running transfer.
///
/// Handed to elements in their [`ElementContext`] so they can check
/// for cancellation without keeping the transfer alive.
#[derive(Clone)]
pub struct TransferRef {
    shared: Weak<XferShared>,
}

impl TransferRef {
    /// Current state; a dropped transfer reads as `Cancelled`.
    pub fn state(&self) -> TransferState {
        match self.shared.upgrade() {
            Some(shared) => shared.state(),
            None => TransferState::Cancelled,
        }
    }

    /// Whether the transfer has been cancelled or has failed.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.state(), TransferState::Cancelled | TransferState::Error)
    }
}

impl std::fmt::Debug for TransferRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferRef").field("state", &self.state()).finish()
    }
}

/// A linear chain of elements ready to move data.
///
/// Build with the elements in stream order (source first), then call
/// [`start`](Transfer::start). Negotiation can be run ahead of time
/// with [`negotiate`](Transfer::negotiate) to inspect or validate the
/// mechanism choices.
pub struct Transfer {
    shared: Arc<XferShared>,
    mechanisms: Option<Vec<Mechanism>>,
}

impl Transfer {
    /// Create a transfer over the given chain.
    pub fn new(elements: Vec<Arc<dyn Element>>) -> Self {
        Self {
            shared: Arc::new(XferShared::new(elements)),
            mechanisms: None,
        }
    }

    /// Negotiate one mechanism per edge without starting.
    ///
    /// Idempotent; `start` runs it implicitly if it has not been called.
    pub fn negotiate(&mut self) -> Result<&[Mechanism]> {
        if self.mechanisms.is_none() {
            self.mechanisms = Some(negotiate(&self.shared.elements)?);
        }
        Ok(self.mechanisms.as_deref().unwrap_or_default())
    }

    /// The negotiated per-edge mechanisms, if negotiation has run.
    pub fn mechanisms(&self) -> Option<&[Mechanism]> {
        self.mechanisms.as_deref()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TransferState {
        self.shared.state()
    }

    /// Subscribe to transfer events.
    pub fn subscribe(&self) -> EventReceiver {
        self.shared.events.subscribe()
    }

    /// Cancel the transfer before it starts. Idempotent; a subsequent
    /// [`start`](Transfer::start) spawns no workers.
    pub fn cancel(&self) {
        self.shared.cancel();
    }

    /// Wire the chain, mark it started, and spawn the workers.
    ///
    /// Negotiation, direct-TCP connection setup, and element setup all
    /// happen before the state leaves `NotStarted`; a failure in any of
    /// them returns the error with no workers running.
    pub fn start(mut self) -> Result<TransferHandle> {
        if self.shared.state().is_terminal() {
            return Ok(TransferHandle {
                shared: self.shared,
                threads: Vec::new(),
            });
        }
        self.negotiate()?;
        let mechs = self.mechanisms.clone().unwrap_or_default();
        let elements = &self.shared.elements;

        if !elements[0].can_generate_eof() {
            warn!(
                element = elements[0].name(),
                "source cannot generate end-of-stream; the transfer may never finish"
            );
        }

        // Direct-TCP edges connect before anything moves: the consumer
        // listens and publishes addresses, the producer dials them.
        for (i, mech) in mechs.iter().enumerate() {
            if *mech == Mechanism::DirectTcp {
                let addrs = elements[i + 1]
                    .listen()
                    .map_err(|e| e.in_element(elements[i + 1].name()))?;
                elements[i]
                    .connect(&addrs)
                    .map_err(|e| e.in_element(elements[i].name()))?;
                debug!(
                    upstream = elements[i].name(),
                    downstream = elements[i + 1].name(),
                    "direct-TCP edge connected"
                );
            }
        }

        // One link per driven edge. The driving element ends up holding
        // it, either in its pump below or in its setup context.
        let mut up_links: Vec<Option<UpstreamLink>> = Vec::new();
        let mut down_links: Vec<Option<DownstreamLink>> = Vec::new();
        up_links.resize_with(elements.len(), || None);
        down_links.resize_with(elements.len(), || None);
        for (i, mech) in mechs.iter().enumerate() {
            if mech.downstream_drives() {
                let fd = match mech {
                    Mechanism::ReadFd => Some(File::from(
                        elements[i]
                            .reader_fd()
                            .map_err(|e| e.in_element(elements[i].name()))?,
                    )),
                    _ => None,
                };
                up_links[i + 1] = Some(UpstreamLink::new(elements[i].clone(), *mech, fd));
            }
            if mech.upstream_drives() {
                let fd = match mech {
                    Mechanism::WriteFd => Some(File::from(
                        elements[i + 1]
                            .writer_fd()
                            .map_err(|e| e.in_element(elements[i + 1].name()))?,
                    )),
                    _ => None,
                };
                down_links[i] = Some(DownstreamLink::new(elements[i + 1].clone(), *mech, fd));
            }
        }

        let transfer_ref = TransferRef {
            shared: Arc::downgrade(&self.shared),
        };

        enum Plan {
            /// Generic pump: produce upstream, deliver downstream.
            Pump {
                up: Option<UpstreamLink>,
                down: Option<DownstreamLink>,
            },
            /// Element runs its own worker body (direct-TCP consumer).
            SelfDriven,
            /// Driven entirely by neighbors.
            Passive,
        }

        let mut plans = Vec::with_capacity(elements.len());
        for (i, elt) in elements.iter().enumerate() {
            let up_mech = if i == 0 { Mechanism::None } else { mechs[i - 1] };
            let down_mech = *mechs.get(i).unwrap_or(&Mechanism::None);

            let active = (up_mech.downstream_drives() && !down_mech.downstream_drives())
                || (i == 0 && down_mech.upstream_drives());

            // Links an element uses inline, rather than from a pump of
            // its own, go into its setup context.
            let ctx_up = if active { None } else { up_links[i].take() };
            let ctx_down = if i == 0 { None } else { down_links[i].take() };
            let ctx = ElementContext::new(
                ctx_up,
                ctx_down,
                up_mech,
                down_mech,
                transfer_ref.clone(),
            );
            elt.setup(ctx).map_err(|e| e.in_element(elt.name()))?;

            plans.push(if active {
                Plan::Pump {
                    up: up_links[i].take(),
                    down: down_links[i].take(),
                }
            } else if up_mech == Mechanism::DirectTcp {
                Plan::SelfDriven
            } else {
                Plan::Passive
            });
        }

        self.shared.mark_started();

        let mut threads = Vec::new();
        for (elt, plan) in elements.iter().zip(plans) {
            let (up, down, self_driven) = match plan {
                Plan::Pump { up, down } => (up, down, false),
                Plan::SelfDriven => (None, None, true),
                Plan::Passive => continue,
            };
            let shared = self.shared.clone();
            let elt = elt.clone();
            let name = elt.name().to_string();
            shared.workers.increment(1);
            match std::thread::Builder::new()
                .name(format!("xfer-{}", name))
                .spawn(move || run_worker(shared, elt, up, down, self_driven))
            {
                Ok(thread) => threads.push(thread),
                Err(e) => {
                    // The worker never ran, so its slot comes back here;
                    // already-spawned workers must be torn down or a
                    // later wait on the shared count would hang.
                    self.shared.workers.decrement(1);
                    self.shared.cancel();
                    for thread in threads {
                        let _ = thread.join();
                    }
                    return Err(Error::Io(e).in_element(&name));
                }
            }
        }

        Ok(TransferHandle {
            shared: self.shared,
            threads,
        })
    }
}

impl std::fmt::Debug for Transfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transfer")
            .field(
                "elements",
                &self
                    .shared
                    .elements
                    .iter()
                    .map(|e| e.name())
                    .collect::<Vec<_>>(),
            )
            .field("state", &self.state())
            .finish()
    }
}

/// Worker thread body.
fn run_worker(
    shared: Arc<XferShared>,
    elt: Arc<dyn Element>,
    up: Option<UpstreamLink>,
    down: Option<DownstreamLink>,
    self_driven: bool,
) {
    let name = elt.name().to_string();
    shared.events.send_element_started(&name);
    debug!(element = %name, "worker started");

    let result = if self_driven {
        elt.run_worker()
    } else {
        pump(elt.as_ref(), up.as_ref(), down.as_ref())
    };

    match result {
        Ok(()) => debug!(element = %name, "worker finished"),
        Err(Error::Cancelled) => debug!(element = %name, "worker cancelled"),
        Err(e) => {
            error!(element = %name, error = %e, "worker failed");
            shared.record_error(name.clone(), e.to_string());
        }
    }

    shared.events.send_element_finished(&name);
    shared.workers.decrement(1);
}

/// Move buffers from the upstream side to the downstream side until
/// EOF propagates through.
fn pump(
    elt: &dyn Element,
    up: Option<&UpstreamLink>,
    down: Option<&DownstreamLink>,
) -> Result<()> {
    loop {
        let buf = match up {
            Some(link) => link.pull()?,
            None => elt.pull_buffer()?,
        };
        let eof = buf.is_none();
        match down {
            Some(link) => link.send(buf)?,
            None => elt.push_buffer(buf)?,
        }
        if eof {
            return Ok(());
        }
    }
}

/// Handle to a running transfer.
///
/// Returned by [`Transfer::start`]; the caller uses it to wait for
/// completion or to cancel.
pub struct TransferHandle {
    shared: Arc<XferShared>,
    threads: Vec<JoinHandle<()>>,
}

impl TransferHandle {
    /// Current lifecycle state.
    pub fn state(&self) -> TransferState {
        self.shared.state()
    }

    /// Subscribe to transfer events.
    pub fn subscribe(&self) -> EventReceiver {
        self.shared.events.subscribe()
    }

    /// Cancel the transfer. Idempotent; workers drain on their own.
    pub fn cancel(&self) {
        self.shared.cancel();
    }

    /// Block until every worker has exited, then report the outcome.
    ///
    /// Returns the terminal state on success (`Done` or `Cancelled`),
    /// or the first recorded worker error.
    pub fn wait(self) -> Result<TransferState> {
        self.shared.workers.wait_empty();
        for thread in self.threads {
            // Worker bodies catch their own errors; a panic here is a
            // bug in an element implementation.
            if thread.join().is_err() {
                self.shared
                    .record_error("<unknown>".to_string(), "worker panicked".to_string());
            }
        }
        self.shared.finish();

        let inner = self.shared.lock();
        match inner.state {
            TransferState::Error => {
                let (element, message) = inner
                    .error
                    .clone()
                    .unwrap_or_else(|| ("<unknown>".to_string(), "unknown error".to_string()));
                Err(Error::Element { element, message })
            }
            state => Ok(state),
        }
    }
}

impl std::fmt::Debug for TransferHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferHandle")
            .field("state", &self.state())
            .field("workers", &self.threads.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::{NullSink, PatternSource, Queue, RandomSource, XorFilter};

    #[test]
    fn test_pattern_to_sink_completes() {
        let sink = Arc::new(NullSink::recording());
        let transfer = Transfer::new(vec![
            Arc::new(PatternSource::new(b"XY", Some(25)).unwrap()),
            sink.clone(),
        ]);
        let handle = transfer.start().unwrap();
        assert_eq!(handle.wait().unwrap(), TransferState::Done);
        assert_eq!(sink.bytes_received(), 25);
        assert_eq!(sink.received(), b"XYXYXYXYXYXYXYXYXYXYXYXYX");
        assert!(sink.is_done());
    }

    #[test]
    fn test_four_element_chain() {
        let sink = Arc::new(NullSink::new());
        let transfer = Transfer::new(vec![
            Arc::new(RandomSource::new(0xcafe, Some(100_000))),
            Arc::new(XorFilter::new(0xa5)),
            Arc::new(Queue::new(4).unwrap()),
            sink.clone(),
        ]);
        let handle = transfer.start().unwrap();
        assert_eq!(handle.wait().unwrap(), TransferState::Done);
        assert_eq!(sink.bytes_received(), 100_000);
    }

    #[test]
    fn test_incompatible_chain_never_starts() {
        let transfer = Transfer::new(vec![
            Arc::new(PatternSource::new(b"A", Some(1)).unwrap()),
            Arc::new(PatternSource::new(b"B", Some(1)).unwrap()),
        ]);
        assert_eq!(transfer.state(), TransferState::NotStarted);
        assert!(matches!(transfer.start(), Err(Error::Config(_))));
    }

    #[test]
    fn test_cancel_drains_unbounded_source() {
        let sink = Arc::new(NullSink::new());
        let transfer = Transfer::new(vec![
            Arc::new(RandomSource::new(1, None)),
            Arc::new(XorFilter::new(0x3c)),
            Arc::new(Queue::new(2).unwrap()),
            sink.clone(),
        ]);
        let handle = transfer.start().unwrap();
        while sink.bytes_received() == 0 {
            std::thread::yield_now();
        }
        handle.cancel();
        assert_eq!(handle.wait().unwrap(), TransferState::Cancelled);
    }

    #[test]
    fn test_cancel_before_start_spawns_nothing() {
        let sink = Arc::new(NullSink::new());
        let transfer = Transfer::new(vec![
            Arc::new(RandomSource::new(11, None)),
            sink.clone(),
        ]);
        transfer.cancel();
        assert_eq!(transfer.state(), TransferState::Cancelled);

        let handle = transfer.start().unwrap();
        assert_eq!(handle.state(), TransferState::Cancelled);
        assert_eq!(handle.wait().unwrap(), TransferState::Cancelled);
        assert_eq!(sink.bytes_received(), 0);
    }

    #[test]
    fn test_events_bracket_the_run() {
        let transfer = Transfer::new(vec![
            Arc::new(PatternSource::new(b"Z", Some(3)).unwrap()),
            Arc::new(NullSink::new()),
        ]);
        let mut events = transfer.subscribe();
        let handle = transfer.start().unwrap();
        handle.wait().unwrap();

        let first = events.recv().unwrap();
        assert!(matches!(
            first,
            XferEvent::StateChanged {
                from: TransferState::NotStarted,
                to: TransferState::Started,
            }
        ));
        let mut saw_done = false;
        while let Some(event) = events.try_recv() {
            if matches!(event, XferEvent::Done) {
                saw_done = true;
            }
        }
        assert!(saw_done);
    }

    #[test]
    fn test_transfer_ref_reads_cancellation() {
        let transfer = Transfer::new(vec![
            Arc::new(RandomSource::new(7, None)),
            Arc::new(NullSink::new()),
        ]);
        let handle = transfer.start().unwrap();
        handle.cancel();
        assert_eq!(handle.wait().unwrap(), TransferState::Cancelled);
    }
}
