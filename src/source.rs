//! Random-access byte sources the reader can open an archive from.
//!
//! The reader only ever needs two things from a source: its total length,
//! and a `Read` starting at an arbitrary offset. [`RandomAccessSource`] is
//! the seam a caller can implement against their own storage; this module
//! ships the two sources the engine needs itself — a file on disk, and an
//! in-memory buffer, useful for tests and for archives built elsewhere.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// A source the reader can seek around in and stream bytes from.
///
/// Implementations must be safe to use from multiple entry streams at
/// once — `reader_from` hands out an independent reader each time, so two
/// entries can be read concurrently without interfering with each other's
/// position.
pub trait RandomAccessSource: Send + Sync {
    /// Total length of the source, in bytes.
    fn len(&self) -> io::Result<u64>;

    /// Opens an independent reader positioned at `offset`.
    fn reader_from(&self, offset: u64) -> io::Result<Box<dyn Read + Send>>;

    /// Reads `buf.len()` bytes starting at `offset`. Used by the directory
    /// scan and trailer locator, which only need short bounded reads
    /// rather than a full streaming reader.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let mut reader = self.reader_from(offset)?;
        reader.read_exact(buf)
    }
}

/// A source backed by a file on disk.
pub struct FileSource {
    file: Mutex<File>,
    len: u64,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(FileSource { file: Mutex::new(file), len })
    }

    pub fn from_file(file: File) -> io::Result<Self> {
        let len = file.metadata()?.len();
        Ok(FileSource { file: Mutex::new(file), len })
    }
}

impl RandomAccessSource for FileSource {
    fn len(&self) -> io::Result<u64> {
        Ok(self.len)
    }

    fn reader_from(&self, offset: u64) -> io::Result<Box<dyn Read + Send>> {
        let guard = self.file.lock().unwrap();
        let mut clone = guard.try_clone()?;
        clone.seek(SeekFrom::Start(offset))?;
        Ok(Box::new(clone))
    }
}

/// A source backed by an in-memory buffer, shared by reference count so
/// opening several readers from it does not copy the archive.
#[derive(Clone)]
pub struct InMemorySource {
    data: Arc<Vec<u8>>,
}

impl InMemorySource {
    pub fn new(data: Vec<u8>) -> Self {
        InMemorySource { data: Arc::new(data) }
    }
}

impl From<Vec<u8>> for InMemorySource {
    fn from(data: Vec<u8>) -> Self {
        InMemorySource::new(data)
    }
}

struct ArcSliceReader {
    data: Arc<Vec<u8>>,
    position: u64,
}

impl Read for ArcSliceReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let start = self.position as usize;
        if start >= self.data.len() {
            return Ok(0);
        }
        let available = &self.data[start..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.position += n as u64;
        Ok(n)
    }
}

impl RandomAccessSource for InMemorySource {
    fn len(&self) -> io::Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn reader_from(&self, offset: u64) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(ArcSliceReader {
            data: self.data.clone(),
            position: offset,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_source_reads_from_an_offset() {
        let source = InMemorySource::new(b"0123456789".to_vec());
        let mut reader = source.reader_from(3).unwrap();
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"3456");
    }

    #[test]
    fn in_memory_source_read_at_is_bounds_checked_by_read_exact() {
        let source = InMemorySource::new(b"abc".to_vec());
        let mut buf = [0u8; 4];
        assert!(source.read_at(0, &mut buf).is_err());
    }

    #[test]
    fn file_source_reports_its_length() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        file.write_all(b"hello").unwrap();
        let source = FileSource::open(file.path()).unwrap();
        assert_eq!(source.len().unwrap(), 5);
    }
}
