//! The pluggable compression pipeline: a registry of compression
//! algorithms keyed by their APPNOTE method code, a decompressing `Read`
//! adapter that verifies CRC-32 and size at end of stream, and a driver
//! function that compresses a source into a sink while tallying the same
//! figures for the writer side.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::sync::Arc;

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::error::ZipError;

pub const METHOD_STORED: u16 = 0;
pub const METHOD_DEFLATE: u16 = 8;

fn format_error(message: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, ZipError::format(message))
}

/// A pluggable compression method, identified by its APPNOTE method code.
///
/// Implementations wrap a `Read`/`Write` with the algorithm's decoder or
/// encoder; they do not themselves track CRC-32 or byte counts — that is
/// layered on top by [`DecompressingReader`] and [`compress_to_sink`], so
/// an algorithm only has to implement the codec itself.
pub trait CompressionAlgorithm: Send + Sync {
    /// The method code this algorithm handles (8 for Deflate, for example).
    fn method_id(&self) -> u16;

    /// Wraps `inner`, a reader over compressed bytes, with a reader that
    /// yields decompressed bytes.
    fn wrap_decoder(&self, inner: Box<dyn Read + Send>) -> Box<dyn Read + Send>;

    /// Wraps `inner`, a writer that accepts compressed bytes, with a writer
    /// that accepts uncompressed bytes and compresses them as written.
    /// `finish` must be called once all input is written to flush any
    /// buffered state and return the underlying writer.
    fn wrap_encoder(&self, inner: Box<dyn Write + Send>) -> Box<dyn CompressorWrite>;
}

/// A `Write` that also supports finishing the compression stream and
/// recovering the wrapped writer.
pub trait CompressorWrite: Write + Send {
    /// Flushes any buffered compressed data and returns the wrapped writer.
    fn finish(self: Box<Self>) -> io::Result<Box<dyn Write + Send>>;
}

/// Method 0: no transformation at all.
pub struct Stored;

struct PassthroughEncoder(Box<dyn Write + Send>);

impl Write for PassthroughEncoder {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl CompressorWrite for PassthroughEncoder {
    fn finish(self: Box<Self>) -> io::Result<Box<dyn Write + Send>> {
        Ok(self.0)
    }
}

impl CompressionAlgorithm for Stored {
    fn method_id(&self) -> u16 {
        METHOD_STORED
    }
    fn wrap_decoder(&self, inner: Box<dyn Read + Send>) -> Box<dyn Read + Send> {
        inner
    }
    fn wrap_encoder(&self, inner: Box<dyn Write + Send>) -> Box<dyn CompressorWrite> {
        Box::new(PassthroughEncoder(inner))
    }
}

/// Method 8: DEFLATE, via `flate2`.
pub struct Deflate {
    level: Compression,
}

impl Deflate {
    pub fn new(level: u32) -> Self {
        Deflate { level: Compression::new(level) }
    }
}

impl Default for Deflate {
    fn default() -> Self {
        Deflate::new(6)
    }
}

struct DeflateEncoderWrite(DeflateEncoder<Box<dyn Write + Send>>);

impl Write for DeflateEncoderWrite {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl CompressorWrite for DeflateEncoderWrite {
    fn finish(self: Box<Self>) -> io::Result<Box<dyn Write + Send>> {
        self.0.finish()
    }
}

impl CompressionAlgorithm for Deflate {
    fn method_id(&self) -> u16 {
        METHOD_DEFLATE
    }
    fn wrap_decoder(&self, inner: Box<dyn Read + Send>) -> Box<dyn Read + Send> {
        Box::new(DeflateDecoder::new(inner))
    }
    fn wrap_encoder(&self, inner: Box<dyn Write + Send>) -> Box<dyn CompressorWrite> {
        Box::new(DeflateEncoderWrite(DeflateEncoder::new(inner, self.level)))
    }
}

/// A registry mapping method codes to algorithms, consulted by both the
/// reader (to decompress an entry) and the writer (to compress one).
///
/// Constructed with [`AlgorithmMap::with_defaults`] to get Stored and
/// Deflate pre-registered; callers can add further codes with
/// [`AlgorithmMap::register`] for methods this engine does not build in.
#[derive(Clone)]
pub struct AlgorithmMap {
    algorithms: HashMap<u16, Arc<dyn CompressionAlgorithm>>,
}

impl AlgorithmMap {
    pub fn new() -> Self {
        AlgorithmMap { algorithms: HashMap::new() }
    }

    pub fn with_defaults() -> Self {
        let mut map = Self::new();
        map.register(Arc::new(Stored));
        map.register(Arc::new(Deflate::default()));
        map
    }

    pub fn register(&mut self, algorithm: Arc<dyn CompressionAlgorithm>) {
        self.algorithms.insert(algorithm.method_id(), algorithm);
    }

    pub fn get(&self, method_id: u16) -> Option<Arc<dyn CompressionAlgorithm>> {
        self.algorithms.get(&method_id).cloned()
    }
}

impl Default for AlgorithmMap {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Wraps a decompressing reader and verifies CRC-32 and uncompressed size
/// once the stream is exhausted.
///
/// The check happens lazily, at the first `read` call that returns `Ok(0)`
/// — a caller that stops reading early (and so never reaches EOF) never
/// triggers the check. This mirrors the format engine's design: integrity
/// is a property of having consumed the whole stream, not of any single
/// read call.
pub struct DecompressingReader {
    inner: Box<dyn Read + Send>,
    hasher: crc32fast::Hasher,
    bytes_read: u64,
    expected_crc32: u32,
    expected_size: u64,
    checked: bool,
}

impl DecompressingReader {
    pub fn new(inner: Box<dyn Read + Send>, expected_crc32: u32, expected_size: u64) -> Self {
        DecompressingReader {
            inner,
            hasher: crc32fast::Hasher::new(),
            bytes_read: 0,
            expected_crc32,
            expected_size,
            checked: false,
        }
    }

    fn verify(&self) -> io::Result<()> {
        if self.bytes_read != self.expected_size {
            return Err(format_error("file size mismatch"));
        }
        let observed_crc32 = self.hasher.clone().finalize();
        if observed_crc32 != self.expected_crc32 {
            return Err(format_error("crc32 mismatch"));
        }
        Ok(())
    }
}

impl Read for DecompressingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 {
            if !self.checked {
                self.checked = true;
                self.verify()?;
            }
            return Ok(0);
        }
        self.hasher.update(&buf[..n]);
        self.bytes_read += n as u64;
        Ok(n)
    }
}

/// Result of driving a source through the compression pipeline: the
/// figures the caller needs for the local header, data descriptor, and
/// central directory entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompressionTally {
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
}

struct CompressedSizeCountingWrite {
    inner: Box<dyn Write + Send>,
    counter: Arc<std::sync::atomic::AtomicU64>,
}

impl Write for CompressedSizeCountingWrite {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.counter.fetch_add(n as u64, std::sync::atomic::Ordering::Relaxed);
        Ok(n)
    }
    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Reads all of `source`, compressing it with `algorithm` into `sink`, and
/// returns the CRC-32, compressed size, and uncompressed size observed
/// along the way. Used by the writer to fill in local header fields (when
/// known ahead of time), data descriptors, and central directory entries.
pub fn compress_to_sink(
    mut source: Box<dyn Read + Send>,
    algorithm: &dyn CompressionAlgorithm,
    sink: Box<dyn Write + Send>,
) -> io::Result<CompressionTally> {
    let compressed_bytes = Arc::new(std::sync::atomic::AtomicU64::new(0));
    let counting_sink: Box<dyn Write + Send> = Box::new(CompressedSizeCountingWrite {
        inner: sink,
        counter: compressed_bytes.clone(),
    });

    let mut encoder = algorithm.wrap_encoder(counting_sink);
    let mut hasher = crc32fast::Hasher::new();
    let mut uncompressed_size = 0u64;
    let mut buf = [0u8; 64 * 1024];

    loop {
        let n = source.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        uncompressed_size += n as u64;
        encoder.write_all(&buf[..n])?;
    }
    encoder.flush()?;
    let _ = encoder.finish()?;

    Ok(CompressionTally {
        crc32: hasher.finalize(),
        compressed_size: compressed_bytes.load(std::sync::atomic::Ordering::Relaxed),
        uncompressed_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn stored_round_trips_with_matching_crc_and_size() {
        let data = b"hello, zip world".to_vec();
        let sink = SharedSink::default();
        let tally = compress_to_sink(
            Box::new(Cursor::new(data.clone())),
            &Stored,
            Box::new(sink.clone()) as Box<dyn Write + Send>,
        )
        .unwrap();
        let compressed = sink.0.lock().unwrap().clone();
        assert_eq!(tally.uncompressed_size, data.len() as u64);
        assert_eq!(compressed, data);

        let mut reader = DecompressingReader::new(
            Box::new(Cursor::new(compressed)),
            tally.crc32,
            tally.uncompressed_size,
        );
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn deflate_round_trips() {
        let data = vec![b'a'; 10_000];
        let sink = SharedSink::default();
        let algorithm = Deflate::default();
        let tally = compress_to_sink(
            Box::new(Cursor::new(data.clone())),
            &algorithm,
            Box::new(sink.clone()) as Box<dyn Write + Send>,
        )
        .unwrap();
        let compressed = sink.0.lock().unwrap().clone();
        assert!(compressed.len() < data.len());

        let decoder = algorithm.wrap_decoder(Box::new(Cursor::new(compressed)));
        let mut reader = DecompressingReader::new(decoder, tally.crc32, tally.uncompressed_size);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn decompressing_reader_rejects_crc_mismatch() {
        let data = b"abc".to_vec();
        let mut reader = DecompressingReader::new(Box::new(Cursor::new(data)), 0xffff_ffff, 3);
        let mut out = Vec::new();
        assert!(reader.read_to_end(&mut out).is_err());
    }

    #[test]
    fn algorithm_map_resolves_built_in_methods() {
        let map = AlgorithmMap::with_defaults();
        assert!(map.get(METHOD_STORED).is_some());
        assert!(map.get(METHOD_DEFLATE).is_some());
        assert!(map.get(99).is_none());
    }
}
