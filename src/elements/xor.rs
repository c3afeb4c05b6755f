//! XOR filter element.

use crate::buffer::Buffer;
use crate::element::{
    CancelFlag, Element, ElementContext, MechPair, MechPairs, Mechanism,
};
use crate::error::{Error, Result};
use smallvec::smallvec;
use std::sync::OnceLock;

/// A filter that XORs every byte with a fixed key.
///
/// XOR with the same key is its own inverse, so two identical filters in
/// a chain cancel out, which is convenient both for a lightweight obfuscation
/// stage and for exercising multi-element pipelines in tests.
///
/// The filter supports every driving arrangement a byte-wise transform
/// can: passive pull-through (its consumer pulls), passive push-through
/// (its producer pushes), and an active pull-upstream/push-downstream
/// pump, for which the orchestrator spawns a worker.
pub struct XorFilter {
    name: String,
    key: u8,
    ctx: OnceLock<ElementContext>,
    cancelled: CancelFlag,
}

impl XorFilter {
    /// Create the filter with the given key.
    pub fn new(key: u8) -> Self {
        Self {
            name: "xor-filter".to_string(),
            key,
            ctx: OnceLock::new(),
            cancelled: CancelFlag::new(),
        }
    }

    /// Set a custom name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn apply(&self, buf: Buffer) -> Buffer {
        let mut out = buf.as_bytes().to_vec();
        for b in &mut out {
            *b ^= self.key;
        }
        Buffer::from(out)
    }

    fn context(&self) -> Result<&ElementContext> {
        self.ctx
            .get()
            .ok_or_else(|| Error::Protocol(format!("element '{}' is not wired", self.name)))
    }
}

impl Element for XorFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn mech_pairs(&self) -> MechPairs {
        smallvec![
            MechPair::new(Mechanism::PushBuffer, Mechanism::PushBuffer, 1),
            MechPair::new(Mechanism::PullBuffer, Mechanism::PullBuffer, 1),
            MechPair::new(Mechanism::PullBuffer, Mechanism::PushBuffer, 1),
        ]
    }

    fn setup(&self, ctx: ElementContext) -> Result<()> {
        self.ctx
            .set(ctx)
            .map_err(|_| Error::Config(format!("element '{}' wired twice", self.name)))
    }

    fn pull_buffer(&self) -> Result<Option<Buffer>> {
        if self.cancelled.is_cancelled() {
            return Ok(None);
        }
        let upstream = self.context()?.upstream().ok_or_else(|| {
            Error::Protocol(format!("element '{}' has no upstream to pull", self.name))
        })?;
        Ok(upstream.pull()?.map(|b| self.apply(b)))
    }

    fn push_buffer(&self, buf: Option<Buffer>) -> Result<()> {
        if self.cancelled.is_cancelled() {
            return Ok(());
        }
        let downstream = self.context()?.downstream().ok_or_else(|| {
            Error::Protocol(format!("element '{}' has no downstream to push", self.name))
        })?;
        downstream.send(buf.map(|b| self.apply(b)))
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
    fn test_xor_is_involution() {
        let f = XorFilter::new(0x5a);
        let buf = Buffer::from(b"hello world".to_vec());
        let once = f.apply(buf.clone());
        assert_ne!(once, buf);
        assert_eq!(f.apply(once), buf);
    }

    #[test]
    fn test_unwired_filter_reports_protocol_error() {
        let f = XorFilter::new(1);
        assert!(matches!(f.pull_buffer(), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_cancelled_pull_is_eof() {
        let f = XorFilter::new(1);
        f.cancel();
        assert!(f.pull_buffer().unwrap().is_none());
    }
}
