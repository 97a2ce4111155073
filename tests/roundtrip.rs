use std::io::{Cursor, Read, Write};
use std::sync::{Arc, Mutex};

use zipstream::compression::{AlgorithmMap, CompressionAlgorithm, CompressorWrite};
use zipstream::{Entry, EntryOptions, FileSource, InMemorySource, ZipError, ZipReader, ZipWriter};

#[derive(Clone, Default)]
struct SharedVecSink(Arc<Mutex<Vec<u8>>>);

impl Write for SharedVecSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn read_entry(reader: &ZipReader, entry: &Entry) -> Vec<u8> {
    let mut stream = reader.open_entry(entry).unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).unwrap();
    out
}

fn entry_by_path<'a>(entries: &'a [Entry], path: &str) -> &'a Entry {
    entries.iter().find(|e| e.path() == path).unwrap_or_else(|| panic!("no entry named {path}"))
}

#[test]
fn empty_archive_with_a_comment_is_a_bare_eocdr() {
    let _ = env_logger::builder().is_test(true).try_init();

    let sink = Arc::new(Mutex::new(Vec::new()));
    let writer = ZipWriter::new(Box::new(SharedVecSink(sink.clone())));
    writer.finalize("nothing to see here").unwrap();
    let bytes = sink.lock().unwrap().clone();

    assert_eq!(bytes.len(), 22 + "nothing to see here".len());

    let reader = ZipReader::new(Arc::new(InMemorySource::new(bytes)));
    reader.open().unwrap();
    assert_eq!(reader.comment().unwrap(), "nothing to see here");
    assert!(reader.entries().unwrap().is_empty());
}

#[test]
fn mixed_entries_round_trip_with_exact_crc_and_size() {
    let sink = Arc::new(Mutex::new(Vec::new()));
    let writer = ZipWriter::new(Box::new(SharedVecSink(sink.clone())));

    writer
        .add_entry(EntryOptions::new("dir/"), None)
        .unwrap();

    writer
        .add_entry(
            EntryOptions::new("dir/stored.txt").comment("no compression"),
            Some(Box::new(Cursor::new(b"small and stored".to_vec()))),
        )
        .unwrap();

    let big = vec![b'q'; 200_000];
    writer
        .add_entry(
            EntryOptions::new("dir/deflated.bin").compression_method(8),
            Some(Box::new(Cursor::new(big.clone()))),
        )
        .unwrap();

    let unicode_path = "dir/\u{6587}\u{5b57}.txt";
    writer
        .add_entry(
            EntryOptions::new(unicode_path),
            Some(Box::new(Cursor::new(b"unicode path".to_vec()))),
        )
        .unwrap();

    writer.finalize("three real entries plus a directory").unwrap();
    let bytes = sink.lock().unwrap().clone();

    let reader = ZipReader::new(Arc::new(InMemorySource::new(bytes)));
    reader.open().unwrap();
    assert_eq!(reader.comment().unwrap(), "three real entries plus a directory");
    let entries = reader.entries().unwrap();
    assert_eq!(entries.len(), 4);

    let dir = entry_by_path(entries, "dir/");
    assert!(dir.is_directory());
    assert_eq!(dir.uncompressed_size(), 0);

    let stored = entry_by_path(entries, "dir/stored.txt");
    assert_eq!(stored.compression_method(), 0);
    assert_eq!(stored.comment(), "no compression");
    assert_eq!(read_entry(&reader, stored), b"small and stored");

    let deflated = entry_by_path(entries, "dir/deflated.bin");
    assert_eq!(deflated.compression_method(), 8);
    assert!(deflated.compressed_size() < big.len() as u64);
    assert_eq!(read_entry(&reader, deflated), big);

    let unicode = entry_by_path(entries, unicode_path);
    assert!(unicode.flags().has_utf8_strings());
    assert_eq!(read_entry(&reader, unicode), b"unicode path");
}

#[test]
fn large_archive_with_a_hundred_entries_preserves_order_and_content() {
    let sink = Arc::new(Mutex::new(Vec::new()));
    let writer = ZipWriter::new(Box::new(SharedVecSink(sink.clone())));

    for i in 0..100 {
        let name = format!("entries/file-{i:03}.txt");
        let content = format!("payload for entry {i}").into_bytes();
        writer
            .add_entry(EntryOptions::new(name).comment(format!("entry {i}")), Some(Box::new(Cursor::new(content))))
            .unwrap();
    }
    writer.finalize("a hundred small entries").unwrap();
    let bytes = sink.lock().unwrap().clone();

    let reader = ZipReader::new(Arc::new(InMemorySource::new(bytes)));
    reader.open().unwrap();
    let entries = reader.entries().unwrap();
    assert_eq!(entries.len(), 100);

    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.path(), format!("entries/file-{i:03}.txt"));
        assert_eq!(entry.comment(), format!("entry {i}"));
        let expected = format!("payload for entry {i}").into_bytes();
        assert_eq!(read_entry(&reader, entry), expected);
    }
}

#[test]
fn forcing_zip64_on_a_small_archive_still_round_trips() {
    let sink = Arc::new(Mutex::new(Vec::new()));
    let writer = ZipWriter::new(Box::new(SharedVecSink(sink.clone())));

    for i in 0..100 {
        let name = format!("z64/{i:03}.bin");
        let content = vec![i as u8; 64];
        writer
            .add_entry(EntryOptions::new(name).zip64(true), Some(Box::new(Cursor::new(content))))
            .unwrap();
    }
    writer.finalize("forced zip64").unwrap();
    let bytes = sink.lock().unwrap().clone();

    let reader = ZipReader::new(Arc::new(InMemorySource::new(bytes)));
    reader.open().unwrap();
    let entries = reader.entries().unwrap();
    assert_eq!(entries.len(), 100);
    assert!(entries.iter().all(|e| e.is_zip64()));

    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(read_entry(&reader, entry), vec![i as u8; 64]);
    }
}

struct CountingStored {
    calls: Arc<Mutex<u32>>,
}

struct CountingPassthrough(Box<dyn Write + Send>);

impl Write for CountingPassthrough {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        self.0.flush()
    }
}

impl CompressorWrite for CountingPassthrough {
    fn finish(self: Box<Self>) -> std::io::Result<Box<dyn Write + Send>> {
        Ok(self.0)
    }
}

impl CompressionAlgorithm for CountingStored {
    fn method_id(&self) -> u16 {
        99
    }
    fn wrap_decoder(&self, inner: Box<dyn Read + Send>) -> Box<dyn Read + Send> {
        inner
    }
    fn wrap_encoder(&self, inner: Box<dyn Write + Send>) -> Box<dyn CompressorWrite> {
        *self.calls.lock().unwrap() += 1;
        Box::new(CountingPassthrough(inner))
    }
}

#[test]
fn a_custom_compression_method_is_invoked_exactly_once_per_entry() {
    let calls = Arc::new(Mutex::new(0));
    let mut algorithms = AlgorithmMap::with_defaults();
    algorithms.register(Arc::new(CountingStored { calls: calls.clone() }));

    let sink = Arc::new(Mutex::new(Vec::new()));
    let writer = ZipWriter::new(Box::new(SharedVecSink(sink.clone()))).with_algorithms(algorithms.clone());

    writer
        .add_entry(
            EntryOptions::new("custom.bin").compression_method(99),
            Some(Box::new(Cursor::new(b"custom method payload".to_vec()))),
        )
        .unwrap();
    writer.finalize("").unwrap();
    assert_eq!(*calls.lock().unwrap(), 1);

    let bytes = sink.lock().unwrap().clone();
    let reader = ZipReader::new(Arc::new(InMemorySource::new(bytes))).with_algorithms(algorithms);
    reader.open().unwrap();
    let entries = reader.entries().unwrap();
    assert_eq!(read_entry(&reader, &entries[0]), b"custom method payload");
}

#[test]
fn a_precomputed_crc_that_does_not_match_the_data_is_rejected() {
    let writer = ZipWriter::new(Box::new(Vec::<u8>::new()));
    let options = EntryOptions::new("broken.txt").precomputed_metadata(0xdead_beef, 5, 5);
    let err = writer
        .add_entry(options, Some(Box::new(Cursor::new(b"hello".to_vec()))))
        .unwrap_err();
    assert!(matches!(err, zipstream::ZipError::Format(_)));
}

#[test]
fn reading_an_entry_with_mismatched_crc_fails_with_a_format_error() {
    let sink = Arc::new(Mutex::new(Vec::new()));
    let writer = ZipWriter::new(Box::new(SharedVecSink(sink.clone())));

    let marker: &[u8] = b"ZIPSTREAM-CRC-CANARY-0000000000";
    writer
        .add_entry(EntryOptions::new("corrupt.txt"), Some(Box::new(Cursor::new(marker.to_vec()))))
        .unwrap();
    writer.finalize("").unwrap();

    let mut bytes = sink.lock().unwrap().clone();
    // Flip a content byte after the fact: this leaves the recorded size
    // untouched (the data is stored, not compressed) but desyncs the CRC-32
    // in both the local header and the central directory entry from the
    // payload, so the reader's lazy end-of-stream check must catch it.
    let at = bytes.windows(marker.len()).position(|w| w == marker).unwrap();
    bytes[at] ^= 0xff;

    let reader = ZipReader::new(Arc::new(InMemorySource::new(bytes)));
    reader.open().unwrap();
    let entries = reader.entries().unwrap();
    let entry = entry_by_path(entries, "corrupt.txt");

    let mut stream = reader.open_entry(entry).unwrap();
    let mut out = Vec::new();
    let io_err = stream.read_to_end(&mut out).unwrap_err();
    let err = ZipError::from_io(io_err);
    match err {
        ZipError::Format(message) => assert_eq!(message, "crc32 mismatch"),
        other => panic!("expected ZipError::Format(\"crc32 mismatch\"), got {other:?}"),
    }
}

#[test]
fn a_file_backed_source_reads_back_the_same_archive_written_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("archive.zip");

    {
        let file = std::fs::File::create(&path).unwrap();
        let writer = ZipWriter::new(Box::new(file));
        writer
            .add_entry(EntryOptions::new("a.txt"), Some(Box::new(Cursor::new(b"on disk".to_vec()))))
            .unwrap();
        writer.finalize("disk-backed").unwrap();
    }

    let source = FileSource::open(&path).unwrap();
    let reader = ZipReader::new(Arc::new(source));
    reader.open().unwrap();
    assert_eq!(reader.comment().unwrap(), "disk-backed");
    let entries = reader.entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(read_entry(&reader, &entries[0]), b"on disk");
}
