//! Seeded pseudo-random test source.

use crate::buffer::{Buffer, CHUNK_SIZE};
use crate::element::{CancelFlag, Element, MechPair, MechPairs, Mechanism};
use crate::error::Result;
use smallvec::smallvec;
use std::sync::Mutex;

struct RandomState {
    limited: bool,
    remaining: u64,
    prng: u32,
}

/// A source that emits a reproducible pseudo-random byte stream.
///
/// The generator is a plain linear congruential sequence: given the same
/// seed, the stream is identical across runs, so a downstream verifier
/// seeded identically can check the data end to end. Deliberately cheap,
/// not cryptographic: this is traffic generation, and its per-byte cost
/// is the baseline [`PatternSource`](super::PatternSource) matches.
pub struct RandomSource {
    name: String,
    state: Mutex<RandomState>,
    cancelled: CancelFlag,
}

/// Advance the LCG and produce one byte.
fn next_byte(prng: &mut u32) -> u8 {
    *prng = prng.wrapping_mul(1_103_515_245).wrapping_add(12_345);
    (*prng >> 16) as u8
}

impl RandomSource {
    /// Create a random source with the given seed.
    ///
    /// `length` of `None` produces an unbounded stream.
    pub fn new(seed: u32, length: Option<u64>) -> Self {
        Self {
            name: "random-source".to_string(),
            state: Mutex::new(RandomState {
                limited: length.is_some(),
                remaining: length.unwrap_or(0),
                prng: seed,
            }),
            cancelled: CancelFlag::new(),
        }
    }

    /// Set a custom name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Generate the first `len` bytes of the stream for a given seed,
    /// for verification at the consuming end.
    pub fn expected_stream(seed: u32, len: usize) -> Vec<u8> {
        let mut prng = seed;
        (0..len).map(|_| next_byte(&mut prng)).collect()
    }
}

impl Element for RandomSource {
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

        let mut out = vec![0u8; size];
        for slot in out.iter_mut() {
            *slot = next_byte(&mut state.prng);
        }

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

    #[test]
    fn test_stream_is_reproducible() {
        let a = RandomSource::new(42, Some(100));
        let b = RandomSource::new(42, Some(100));
        let buf_a = a.pull_buffer().unwrap().unwrap();
        let buf_b = b.pull_buffer().unwrap().unwrap();
        assert_eq!(buf_a, buf_b);
        assert_eq!(buf_a.as_bytes(), RandomSource::expected_stream(42, 100));
    }

    #[test]
    fn test_different_seeds_differ() {
        let a = RandomSource::expected_stream(1, 64);
        let b = RandomSource::expected_stream(2, 64);
        assert_ne!(a, b);
    }

    #[test]
    fn test_length_limit_and_eof() {
        let src = RandomSource::new(7, Some(CHUNK_SIZE as u64 + 3));
        assert_eq!(src.pull_buffer().unwrap().unwrap().len(), CHUNK_SIZE);
        assert_eq!(src.pull_buffer().unwrap().unwrap().len(), 3);
        assert!(src.pull_buffer().unwrap().is_none());
    }

    #[test]
    fn test_cancel_reads_as_eof() {
        let src = RandomSource::new(7, None);
        assert!(src.pull_buffer().unwrap().is_some());
        src.cancel();
        assert!(src.pull_buffer().unwrap().is_none());
    }
}
