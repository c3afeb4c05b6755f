//! Pattern-repeating test source.

use crate::buffer::{Buffer, CHUNK_SIZE};
use crate::element::{CancelFlag, Element, MechPair, MechPairs, Mechanism};
use crate::error::{Error, Result};
use smallvec::smallvec;
use std::sync::Mutex;

struct PatternState {
    limited: bool,
    remaining: u64,
    cursor: usize,
}

/// A source that repeats a fixed byte pattern.
///
/// Emits the pattern cyclically up to an optional total length, in
/// chunks of at most [`CHUNK_SIZE`] bytes. With no length limit the
/// source never signals EOF on its own; it only stops after
/// cancellation.
///
/// # Example
///
/// ```rust
/// use xferline::elements::PatternSource;
/// use xferline::element::Element;
///
/// let src = PatternSource::new(b"AB", Some(5)).unwrap();
/// let buf = src.pull_buffer().unwrap().unwrap();
/// assert_eq!(buf.as_bytes(), b"ABABA");
/// assert!(src.pull_buffer().unwrap().is_none()); // EOF
/// ```
pub struct PatternSource {
    name: String,
    pattern: Box<[u8]>,
    state: Mutex<PatternState>,
    cancelled: CancelFlag,
}

impl PatternSource {
    /// Create a pattern source.
    ///
    /// `length` of `None` produces an unbounded stream. An empty
    /// pattern is a configuration error.
    pub fn new(pattern: &[u8], length: Option<u64>) -> Result<Self> {
        if pattern.is_empty() {
            return Err(Error::Config("pattern source needs a non-empty pattern".into()));
        }
        Ok(Self {
            name: "pattern-source".to_string(),
            pattern: pattern.into(),
            state: Mutex::new(PatternState {
                limited: length.is_some(),
                remaining: length.unwrap_or(0),
                cursor: 0,
            }),
            cancelled: CancelFlag::new(),
        })
    }

    /// Set a custom name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Element for PatternSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn mech_pairs(&self) -> MechPairs {
        smallvec![MechPair::new(Mechanism::None, Mechanism::PullBuffer, 1)]
    }

    fn can_generate_eof(&self) -> bool {
        true
    }

    fn pull_buffer(&self) -> Result<Option<Buffer>> {
        let mut state = self.state.lock().unwrap();

        // Cancellation reads as EOF, checked before anything else.
        if self.cancelled.is_cancelled() || (state.limited && state.remaining == 0) {
            return Ok(None);
        }

        let size = if state.limited {
            state.remaining.min(CHUNK_SIZE as u64) as usize
        } else {
            CHUNK_SIZE
        };
        if state.limited {
            state.remaining -= size as u64;
        }

        // Filled one byte at a time rather than block-copied, so this
        // source runs at roughly the same speed as RandomSource and the
        // two stay interchangeable in throughput benchmarks.
        let mut out = vec![0u8; size];
        let mut cursor = state.cursor;
        for slot in out.iter_mut() {
            *slot = self.pattern[cursor];
            cursor += 1;
            if cursor >= self.pattern.len() {
                cursor = 0;
            }
        }
        state.cursor = cursor;

        Ok(Some(Buffer::from(out)))
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

    fn drain(src: &PatternSource) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(buf) = src.pull_buffer().unwrap() {
            out.extend_from_slice(buf.as_bytes());
        }
        out
    }

    #[test]
    fn test_repeats_pattern_to_length() {
        let src = PatternSource::new(b"AB", Some(5)).unwrap();
        assert_eq!(drain(&src), b"ABABA");
    }

    #[test]
    fn test_cursor_persists_across_chunks() {
        // 2.5 chunks; the pattern must continue across chunk boundaries.
        let n = CHUNK_SIZE as u64 * 5 / 2;
        let src = PatternSource::new(b"XYZ", Some(n)).unwrap();
        let got = drain(&src);
        let expected: Vec<u8> = b"XYZ".iter().copied().cycle().take(n as usize).collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_chunk_sizing() {
        let src = PatternSource::new(b"A", Some(CHUNK_SIZE as u64 + 1)).unwrap();
        assert_eq!(src.pull_buffer().unwrap().unwrap().len(), CHUNK_SIZE);
        assert_eq!(src.pull_buffer().unwrap().unwrap().len(), 1);
        assert!(src.pull_buffer().unwrap().is_none());
    }

    #[test]
    fn test_unlimited_never_signals_eof() {
        let src = PatternSource::new(b"Q", None).unwrap();
        for _ in 0..100 {
            assert!(src.pull_buffer().unwrap().is_some());
        }
    }

    #[test]
    fn test_cancel_returns_eof_with_length_remaining() {
        let src = PatternSource::new(b"AB", Some(1_000_000)).unwrap();
        assert!(src.pull_buffer().unwrap().is_some());
        src.cancel();
        assert!(src.pull_buffer().unwrap().is_none());
    }

    #[test]
    fn test_empty_pattern_rejected() {
        assert!(PatternSource::new(b"", Some(10)).is_err());
    }
}
