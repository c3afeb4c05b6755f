//! Byte buffers passed between pipeline elements.

use bytes::Bytes;

/// Fixed transfer quantum, in bytes.
///
/// Every generating or pumping element moves data in chunks of at most
/// this size, which also bounds how much extra work can happen after a
/// cancellation is requested.
pub const CHUNK_SIZE: usize = 10240;

/// An immutable chunk of transfer data.
///
/// Buffers are cheap to clone ([`Bytes`] is reference-counted). End of
/// stream is not a buffer property: every pull/push boundary in the
/// pipeline uses `Option<Buffer>` with `None` meaning EOF, so an empty
/// buffer never doubles as a sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buffer {
    data: Bytes,
}

impl Buffer {
    /// Create a buffer from a byte vector.
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// View the buffer contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Take the underlying [`Bytes`].
    pub fn into_bytes(self) -> Bytes {
        self.data
    }

    /// Number of bytes in the buffer.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(v: Vec<u8>) -> Self {
        Self::from_bytes(v)
    }
}

impl AsRef<[u8]> for Buffer {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_roundtrip() {
        let buf = Buffer::from_bytes(vec![1u8, 2, 3]);
        assert_eq!(buf.len(), 3);
        assert!(!buf.is_empty());
        assert_eq!(buf.as_bytes(), &[1, 2, 3]);
    }

    #[test]
    fn test_clone_shares_data() {
        let buf = Buffer::from_bytes(vec![0u8; CHUNK_SIZE]);
        let clone = buf.clone();
        assert_eq!(buf, clone);
    }
}
