//! Discarding/counting sink.

use crate::buffer::Buffer;
use crate::element::{CancelFlag, Element, MechPair, MechPairs, Mechanism};
use crate::error::Result;
use smallvec::smallvec;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

/// A sink that discards its input, counting the bytes.
///
/// In recording mode it also keeps the received bytes for inspection,
/// which makes it the standard verification endpoint in tests. Accepts
/// either a pushing upstream (passive) or a pull-capable upstream (the
/// orchestrator then gives the sink a worker that pulls).
#[derive(Debug, Default)]
pub struct NullSink {
    name: String,
    bytes: AtomicU64,
    record: Option<Mutex<Vec<u8>>>,
    done: AtomicBool,
    cancelled: CancelFlag,
}

impl NullSink {
    /// Create a counting sink that discards data.
    pub fn new() -> Self {
        Self {
            name: "null-sink".to_string(),
            ..Self::default()
        }
    }

    /// Create a sink that counts and records data.
    pub fn recording() -> Self {
        Self {
            name: "null-sink".to_string(),
            record: Some(Mutex::new(Vec::new())),
            ..Self::default()
        }
    }

    /// Set a custom name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Total bytes received so far.
    pub fn bytes_received(&self) -> u64 {
        self.bytes.load(Ordering::Acquire)
    }

    /// Copy of the recorded bytes (empty unless built with
    /// [`recording`](NullSink::recording)).
    pub fn received(&self) -> Vec<u8> {
        self.record
            .as_ref()
            .map(|r| r.lock().unwrap().clone())
            .unwrap_or_default()
    }

    /// Whether EOF has been received.
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

impl Element for NullSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn mech_pairs(&self) -> MechPairs {
        smallvec![
            MechPair::new(Mechanism::PushBuffer, Mechanism::None, 1),
            MechPair::new(Mechanism::PullBuffer, Mechanism::None, 1),
        ]
    }

    fn push_buffer(&self, buf: Option<Buffer>) -> Result<()> {
        if self.cancelled.is_cancelled() {
            return Ok(());
        }
        match buf {
            Some(b) => {
                self.bytes.fetch_add(b.len() as u64, Ordering::AcqRel);
                if let Some(record) = &self.record {
                    record.lock().unwrap().extend_from_slice(b.as_bytes());
                }
            }
            None => self.done.store(true, Ordering::Release),
        }
        Ok(())
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
    fn test_counts_bytes() {
        let sink = NullSink::new();
        sink.push_buffer(Some(Buffer::from(vec![0u8; 10]))).unwrap();
        sink.push_buffer(Some(Buffer::from(vec![0u8; 5]))).unwrap();
        assert_eq!(sink.bytes_received(), 15);
        assert!(!sink.is_done());
        sink.push_buffer(None).unwrap();
        assert!(sink.is_done());
    }

    #[test]
    fn test_recording_keeps_data() {
        let sink = NullSink::recording();
        sink.push_buffer(Some(Buffer::from(b"abc".to_vec()))).unwrap();
        sink.push_buffer(Some(Buffer::from(b"def".to_vec()))).unwrap();
        assert_eq!(sink.received(), b"abcdef");
    }

    #[test]
    fn test_cancelled_sink_discards_pushes() {
        let sink = NullSink::new();
        sink.cancel();
        sink.push_buffer(Some(Buffer::from(vec![1u8; 8]))).unwrap();
        assert_eq!(sink.bytes_received(), 0);
    }
}
