//! Integration tests for cancellation, failure, and the event feed.
//!
//! These tests verify that:
//! - Cancel stops unbounded transfers and releases blocked workers
//! - A worker failure lands the transfer in the error state with the
//!   failing element named
//! - Events bracket the run in order

use std::sync::Arc;
use xferline::element::{CancelFlag, Element, MechPair, MechPairs, Mechanism};
use xferline::elements::{NullSink, PatternSource, Queue, RandomSource, XorFilter};
use xferline::buffer::Buffer;
use xferline::xfer::{Transfer, TransferState, XferEvent};
use xferline::{Error, Result};

use smallvec::smallvec;

// ============================================================================
// Cancellation Tests
// ============================================================================

/// Test that cancelling an unbounded transfer terminates it.
#[test]
fn test_cancel_unbounded_transfer() {
    let sink = Arc::new(NullSink::new());
    let transfer = Transfer::new(vec![
        Arc::new(RandomSource::new(99, None)),
        Arc::new(XorFilter::new(0x11)),
        Arc::new(Queue::new(2).unwrap()),
        sink.clone(),
    ]);

    let handle = transfer.start().unwrap();
    // Let some data through first so workers are genuinely in flight.
    while sink.bytes_received() < 10240 {
        std::thread::yield_now();
    }

    handle.cancel();
    assert_eq!(handle.wait().unwrap(), TransferState::Cancelled);
}

/// Test that repeated cancels are idempotent.
#[test]
fn test_cancel_is_idempotent() {
    let transfer = Transfer::new(vec![
        Arc::new(PatternSource::new(b"A", Some(10)).unwrap()),
        Arc::new(NullSink::new()),
    ]);
    let handle = transfer.start().unwrap();
    handle.cancel();
    handle.cancel();
    assert_eq!(handle.wait().unwrap(), TransferState::Cancelled);
}

/// Test that a cancelled source reads as EOF on the very next pull.
#[test]
fn test_cancelled_source_serves_eof() {
    let src = PatternSource::new(b"AB", Some(1_000_000)).unwrap();
    assert!(src.pull_buffer().unwrap().is_some());
    src.cancel();
    assert!(src.pull_buffer().unwrap().is_none());
    assert!(src.pull_buffer().unwrap().is_none());
}

// ============================================================================
// Failure Tests
// ============================================================================

/// A sink that rejects every buffer it is given.
struct FailingSink {
    cancelled: CancelFlag,
}

impl FailingSink {
    fn new() -> Self {
        Self {
            cancelled: CancelFlag::new(),
        }
    }
}

impl Element for FailingSink {
    fn name(&self) -> &str {
        "failing-sink"
    }

    fn mech_pairs(&self) -> MechPairs {
        smallvec![MechPair::new(Mechanism::PullBuffer, Mechanism::None, 1)]
    }

    fn push_buffer(&self, _buf: Option<Buffer>) -> Result<()> {
        Err(Error::Protocol("disk on fire".to_string()))
    }

    fn cancel(&self) {
        self.cancelled.cancel();
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.is_cancelled()
    }
}

/// Test that a failing element lands the transfer in the error state
/// and the error names the element.
#[test]
fn test_worker_failure_is_reported() {
    let transfer = Transfer::new(vec![
        Arc::new(PatternSource::new(b"A", Some(100)).unwrap()),
        Arc::new(FailingSink::new()),
    ]);

    let handle = transfer.start().unwrap();
    let err = handle.wait().unwrap_err();
    match err {
        Error::Element { element, message } => {
            assert_eq!(element, "failing-sink");
            assert!(message.contains("disk on fire"));
        }
        other => panic!("expected element error, got {other}"),
    }
}

/// Test that a failure in one branch cancels the rest of the chain.
#[test]
fn test_failure_cancels_peer_elements() {
    let source = Arc::new(RandomSource::new(5, None));
    let transfer = Transfer::new(vec![source.clone(), Arc::new(FailingSink::new())]);

    let handle = transfer.start().unwrap();
    assert!(handle.wait().is_err());
    assert!(source.is_cancelled());
}

// ============================================================================
// Event Feed Tests
// ============================================================================

/// Test that events arrive in lifecycle order for a clean run.
#[test]
fn test_event_order_for_clean_run() {
    let transfer = Transfer::new(vec![
        Arc::new(PatternSource::new(b"E", Some(5)).unwrap()),
        Arc::new(NullSink::new()),
    ]);
    let mut events = transfer.subscribe();

    let handle = transfer.start().unwrap();
    handle.wait().unwrap();

    assert!(matches!(
        events.recv().unwrap(),
        XferEvent::StateChanged {
            from: TransferState::NotStarted,
            to: TransferState::Started,
        }
    ));

    let mut started = 0;
    let mut finished = 0;
    let mut saw_done = false;
    while let Some(event) = events.try_recv() {
        match event {
            XferEvent::ElementStarted { .. } => started += 1,
            XferEvent::ElementFinished { .. } => {
                finished += 1;
                assert!(started >= finished, "finish cannot precede start");
            }
            XferEvent::Done => saw_done = true,
            XferEvent::Error { .. } | XferEvent::Cancelled => {
                panic!("clean run must not report {event}")
            }
            XferEvent::StateChanged { .. } => {}
        }
    }
    assert_eq!(started, finished);
    assert!(saw_done);
}

/// Test that a cancelled run emits the cancelled event.
#[test]
fn test_cancelled_event_is_emitted() {
    let transfer = Transfer::new(vec![
        Arc::new(RandomSource::new(3, None)),
        Arc::new(NullSink::new()),
    ]);
    let mut events = transfer.subscribe();

    let handle = transfer.start().unwrap();
    handle.cancel();
    assert_eq!(handle.wait().unwrap(), TransferState::Cancelled);

    let mut saw_cancelled = false;
    while let Some(event) = events.try_recv() {
        if matches!(event, XferEvent::Cancelled) {
            saw_cancelled = true;
        }
    }
    assert!(saw_cancelled);
}
