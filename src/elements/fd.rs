//! File-descriptor source and sink.

use crate::buffer::{Buffer, CHUNK_SIZE};
use crate::element::{CancelFlag, Element, MechPair, MechPairs, Mechanism};
use crate::error::Result;
use smallvec::smallvec;
use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::OwnedFd;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// A source that reads from an open file descriptor.
///
/// Serves pull-buffer chunks of at most [`CHUNK_SIZE`] bytes, or hands a
/// duplicated descriptor to a read-fd consumer so data never passes
/// through this process's buffers at all.
pub struct FdSource {
    name: String,
    file: File,
    cancelled: CancelFlag,
}

impl FdSource {
    /// Open a file for reading.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_file(File::open(path)?))
    }

    /// Wrap an already-open file.
    pub fn from_file(file: File) -> Self {
        Self {
            name: "fd-source".to_string(),
            file,
            cancelled: CancelFlag::new(),
        }
    }

    /// Set a custom name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Element for FdSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn mech_pairs(&self) -> MechPairs {
        smallvec![
            MechPair::new(Mechanism::None, Mechanism::PullBuffer, 1),
            MechPair::new(Mechanism::None, Mechanism::ReadFd, 1),
        ]
    }

    fn can_generate_eof(&self) -> bool {
        true
    }

    fn pull_buffer(&self) -> Result<Option<Buffer>> {
        if self.cancelled.is_cancelled() {
            return Ok(None);
        }
        let mut chunk = vec![0u8; CHUNK_SIZE];
        let n = (&self.file).read(&mut chunk)?;
        if n == 0 {
            return Ok(None);
        }
        chunk.truncate(n);
        Ok(Some(Buffer::from(chunk)))
    }

    fn reader_fd(&self) -> Result<OwnedFd> {
        Ok(self.file.try_clone()?.into())
    }

    fn cancel(&self) {
        self.cancelled.cancel();
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.is_cancelled()
    }
}

/// A sink that writes to an open file descriptor.
///
/// Accepts pushed buffers, pulls from a pull-capable upstream (via an
/// orchestrator worker), or hands a duplicated descriptor to a write-fd
/// producer.
pub struct FdSink {
    name: String,
    file: File,
    bytes: AtomicU64,
    cancelled: CancelFlag,
}

impl FdSink {
    /// Create (or truncate) a file for writing.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_file(File::create(path)?))
    }

    /// Wrap an already-open file.
    pub fn from_file(file: File) -> Self {
        Self {
            name: "fd-sink".to_string(),
            file,
            bytes: AtomicU64::new(0),
            cancelled: CancelFlag::new(),
        }
    }

    /// Set a custom name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Bytes written through `push_buffer` so far.
    ///
    /// Data a write-fd producer wrote directly to the descriptor is not
    /// counted here; it never passed through this element.
    pub fn bytes_written(&self) -> u64 {
        self.bytes.load(Ordering::Acquire)
    }
}

impl Element for FdSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn mech_pairs(&self) -> MechPairs {
        smallvec![
            MechPair::new(Mechanism::PushBuffer, Mechanism::None, 1),
            MechPair::new(Mechanism::PullBuffer, Mechanism::None, 1),
            MechPair::new(Mechanism::WriteFd, Mechanism::None, 1),
        ]
    }

    fn push_buffer(&self, buf: Option<Buffer>) -> Result<()> {
        if self.cancelled.is_cancelled() {
            return Ok(());
        }
        match buf {
            Some(b) => {
                (&self.file).write_all(b.as_bytes())?;
                self.bytes.fetch_add(b.len() as u64, Ordering::AcqRel);
            }
            None => (&self.file).flush()?,
        }
        Ok(())
    }

    fn writer_fd(&self) -> Result<OwnedFd> {
        Ok(self.file.try_clone()?.into())
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
    use std::io::Seek;

    #[test]
    fn test_fd_source_reads_in_chunks() {
        let mut tmp = tempfile::tempfile().unwrap();
        tmp.write_all(&vec![7u8; CHUNK_SIZE + 10]).unwrap();
        tmp.rewind().unwrap();

        let src = FdSource::from_file(tmp);
        assert_eq!(src.pull_buffer().unwrap().unwrap().len(), CHUNK_SIZE);
        assert_eq!(src.pull_buffer().unwrap().unwrap().len(), 10);
        assert!(src.pull_buffer().unwrap().is_none());
    }

    #[test]
    fn test_fd_sink_writes_and_counts() {
        let mut tmp = tempfile::tempfile().unwrap();
        let sink = FdSink::from_file(tmp.try_clone().unwrap());

        sink.push_buffer(Some(Buffer::from(b"backup data".to_vec())))
            .unwrap();
        sink.push_buffer(None).unwrap();
        assert_eq!(sink.bytes_written(), 11);

        tmp.rewind().unwrap();
        let mut got = Vec::new();
        tmp.read_to_end(&mut got).unwrap();
        assert_eq!(got, b"backup data");
    }

    #[test]
    fn test_cancelled_source_reads_as_eof() {
        let tmp = tempfile::tempfile().unwrap();
        let src = FdSource::from_file(tmp);
        src.cancel();
        assert!(src.pull_buffer().unwrap().is_none());
    }

    #[test]
    fn test_reader_fd_is_independent_handle() {
        let mut tmp = tempfile::tempfile().unwrap();
        tmp.write_all(b"xyz").unwrap();
        tmp.rewind().unwrap();

        let src = FdSource::from_file(tmp);
        let fd = src.reader_fd().unwrap();
        let mut dup = File::from(fd);
        let mut got = Vec::new();
        dup.read_to_end(&mut got).unwrap();
        assert_eq!(got, b"xyz");
    }
}
