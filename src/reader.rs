//! The random-access archive reader: locates the central directory, reads
//! it into an in-memory entry list, and opens per-entry data streams
//! lazily, only once a caller actually asks for one.

use std::io::{BufReader, Read};
use std::sync::{Arc, OnceLock};

use crate::attrs::{Attributes, Platform};
use crate::binary::{Cp437Codec, LegacyCodec};
use crate::compression::{AlgorithmMap, DecompressingReader};
use crate::dos_date;
use crate::entry::Entry;
use crate::error::{Result, ZipError};
use crate::extra::{ExtraFields, Zip64Mask};
use crate::flags::Flags;
use crate::records::{CentralDirectoryHeader, LocalFileHeader, LOCAL_FILE_HEADER_FIXED_SIZE};
use crate::source::RandomAccessSource;
use crate::trailer::{self, LocateResult};

/// Large enough to cover the maximum EOCDR comment (64 KiB - 1) plus the
/// fixed parts of every trailer record, with headroom.
const TAIL_SCAN_SIZE: u64 = 70_000;

/// Central directory entries are read through a buffer this large at a
/// time, refilled by the underlying `BufReader` as each entry's variable
/// fields are consumed.
const DIRECTORY_READ_BUFFER: usize = 1024 * 1024;

struct OpenedDirectory {
    entries: Vec<Entry>,
    comment: String,
}

/// A streaming, random-access reader over a ZIP/ZIP64 archive.
///
/// Construction is cheap and does no I/O; [`ZipReader::open`] performs the
/// actual directory scan, and is idempotent — calling it more than once
/// (even from multiple threads) only scans the archive once, via a
/// [`OnceLock`]. Every other accessor requires `open` to have succeeded
/// first.
pub struct ZipReader {
    source: Arc<dyn RandomAccessSource>,
    codec: Arc<dyn LegacyCodec>,
    algorithms: AlgorithmMap,
    state: OnceLock<std::result::Result<OpenedDirectory, Arc<ZipError>>>,
}

impl ZipReader {
    pub fn new(source: Arc<dyn RandomAccessSource>) -> Self {
        ZipReader {
            source,
            codec: Arc::new(Cp437Codec),
            algorithms: AlgorithmMap::with_defaults(),
            state: OnceLock::new(),
        }
    }

    /// Overrides the legacy code-page codec used for non-UTF-8 names and
    /// comments. Must be called before [`Self::open`].
    pub fn with_codec(mut self, codec: Arc<dyn LegacyCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Overrides the compression method registry consulted when opening
    /// entry data streams. Must be called before the first
    /// [`Self::open_entry`] call (it does not affect the directory scan).
    pub fn with_algorithms(mut self, algorithms: AlgorithmMap) -> Self {
        self.algorithms = algorithms;
        self
    }

    /// Locates the trailer and reads the central directory, if this has
    /// not already happened. Safe to call repeatedly or from multiple
    /// threads; only the first caller pays the cost of the scan.
    pub fn open(&self) -> Result<()> {
        let result = self.state.get_or_init(|| self.scan().map_err(Arc::new));
        match result {
            Ok(_) => Ok(()),
            Err(e) => Err(ZipError::format(e.to_string())),
        }
    }

    fn ensure_opened(&self) -> Result<&OpenedDirectory> {
        match self.state.get() {
            Some(Ok(dir)) => Ok(dir),
            Some(Err(e)) => Err(ZipError::format(e.to_string())),
            None => Err(ZipError::State("reader has not been opened; call open() first")),
        }
    }

    pub fn entries(&self) -> Result<&[Entry]> {
        Ok(&self.ensure_opened()?.entries)
    }

    pub fn comment(&self) -> Result<&str> {
        Ok(&self.ensure_opened()?.comment)
    }

    /// Opens a lazy, decompressing stream over `entry`'s data. The local
    /// header is re-read at this point (rather than cached from the
    /// directory scan) to learn the exact variable-field length that
    /// precedes the compressed bytes.
    pub fn open_entry(&self, entry: &Entry) -> Result<Box<dyn Read + Send>> {
        self.ensure_opened()?;

        let mut header_buf = [0u8; LOCAL_FILE_HEADER_FIXED_SIZE];
        self.source.read_at(entry.local_header_offset, &mut header_buf)?;
        let (_, name_len, extra_len) = LocalFileHeader::parse_fixed(&header_buf)?;

        let data_offset =
            entry.local_header_offset + LOCAL_FILE_HEADER_FIXED_SIZE as u64 + name_len as u64 + extra_len as u64;
        let raw = self.source.reader_from(data_offset)?;
        let bounded: Box<dyn Read + Send> = Box::new(raw.take(entry.compressed_size));

        let algorithm = self.algorithms.get(entry.compression_method).ok_or_else(|| {
            ZipError::format(format!("unsupported compression method {}", entry.compression_method))
        })?;
        let decoded = algorithm.wrap_decoder(bounded);
        Ok(Box::new(DecompressingReader::new(decoded, entry.crc32, entry.uncompressed_size)))
    }

    fn scan(&self) -> Result<OpenedDirectory> {
        let file_len = self.source.len()?;
        let buffer_start = file_len.saturating_sub(TAIL_SCAN_SIZE);
        let mut tail = vec![0u8; (file_len - buffer_start) as usize];
        self.source.read_at(buffer_start, &mut tail)?;

        let located = trailer::locate(&tail, buffer_start)?;
        let (eocdr, zip64_eocdr) = match located {
            LocateResult::Found { eocdr, zip64_eocdr, .. } => (eocdr, zip64_eocdr),
            LocateResult::NeedsTargetedRead { eocdr, zip64_eocdr_offset, zip64_eocdr_len, .. } => {
                let mut buf = vec![0u8; zip64_eocdr_len];
                self.source.read_at(zip64_eocdr_offset, &mut buf)?;
                let zip64 = crate::records::Zip64EndOfCentralDirectory::parse(&buf)?;
                (eocdr, Some(zip64))
            }
        };

        let (disk_number, cd_start_disk, entries_total, cd_offset) = if let Some(z) = &zip64_eocdr {
            (z.disk_number, z.cd_start_disk, z.entries_total, z.cd_offset)
        } else {
            (
                eocdr.disk_number as u32,
                eocdr.cd_start_disk as u32,
                eocdr.entries_total as u64,
                eocdr.cd_offset as u64,
            )
        };

        if disk_number != 0 || cd_start_disk != 0 {
            return Err(ZipError::MultiDisk);
        }

        let comment = self.codec.decode(&eocdr.comment);
        let entries = self.read_central_directory(cd_offset, entries_total)?;

        Ok(OpenedDirectory { entries, comment })
    }

    fn read_central_directory(&self, cd_offset: u64, entries_total: u64) -> Result<Vec<Entry>> {
        let raw = self.source.reader_from(cd_offset)?;
        let mut reader = BufReader::with_capacity(DIRECTORY_READ_BUFFER, raw);
        let mut entries = Vec::with_capacity(entries_total.min(1 << 20) as usize);

        for _ in 0..entries_total {
            let mut fixed = [0u8; crate::records::CENTRAL_DIRECTORY_HEADER_FIXED_SIZE];
            reader.read_exact(&mut fixed)?;
            let (header, name_len, extra_len, comment_len) = CentralDirectoryHeader::parse_fixed(&fixed)?;

            let mut name_raw = vec![0u8; name_len];
            reader.read_exact(&mut name_raw)?;
            let mut extra_raw = vec![0u8; extra_len];
            reader.read_exact(&mut extra_raw)?;
            let mut comment_raw = vec![0u8; comment_len];
            reader.read_exact(&mut comment_raw)?;

            entries.push(self.build_entry(header, name_raw, extra_raw, comment_raw)?);
        }

        Ok(entries)
    }

    fn build_entry(
        &self,
        header: CentralDirectoryHeader,
        name_raw: Vec<u8>,
        extra_raw: Vec<u8>,
        comment_raw: Vec<u8>,
    ) -> Result<Entry> {
        let flags = Flags::from_bits(header.flags);

        let zip64_mask = Zip64Mask::from_central_directory_fields(
            header.uncompressed_size,
            header.compressed_size,
            header.local_header_offset,
            header.disk_number_start,
        );
        let extra = ExtraFields::parse(&extra_raw, zip64_mask)?;

        let uncompressed_size = extra
            .zip64
            .and_then(|z| z.uncompressed_size)
            .unwrap_or(header.uncompressed_size as u64);
        let compressed_size = extra
            .zip64
            .and_then(|z| z.compressed_size)
            .unwrap_or(header.compressed_size as u64);
        let local_header_offset = extra
            .zip64
            .and_then(|z| z.header_offset)
            .unwrap_or(header.local_header_offset as u64);

        let path = if flags.has_utf8_strings() {
            String::from_utf8(name_raw.clone())
                .map_err(|_| ZipError::format("name flagged utf-8 but is not valid utf-8"))?
        } else if let Some(unicode) = &extra.unicode_path {
            if unicode.is_valid_for(&name_raw) {
                unicode.value.clone()
            } else {
                self.codec.decode(&name_raw)
            }
        } else {
            self.codec.decode(&name_raw)
        };

        let comment = if flags.has_utf8_strings() {
            String::from_utf8(comment_raw.clone())
                .map_err(|_| ZipError::format("comment flagged utf-8 but is not valid utf-8"))?
        } else if let Some(unicode) = &extra.unicode_comment {
            if unicode.is_valid_for(&comment_raw) {
                unicode.value.clone()
            } else {
                self.codec.decode(&comment_raw)
            }
        } else {
            self.codec.decode(&comment_raw)
        };

        let platform = Platform::from_byte((header.version_made_by & 0xFF) as u8)?;
        let attributes = Attributes::decode(platform, header.external_attrs);
        let modified = dos_date::unpack(header.dos_time_date).ok();

        Ok(Entry {
            path,
            path_raw: name_raw,
            comment,
            comment_raw,
            compression_method: header.compression_method,
            crc32: header.crc32,
            compressed_size,
            uncompressed_size,
            local_header_offset,
            modified,
            attributes,
            flags,
            version_needed: header.version_needed,
            extra,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::{compress_to_sink, Stored};
    use crate::records::EndOfCentralDirectory;
    use crate::source::InMemorySource;
    use std::io::Cursor;

    struct VecSink<'a>(&'a mut Vec<u8>);
    impl<'a> std::io::Write for VecSink<'a> {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn build_single_entry_archive(name: &str, content: &[u8]) -> Vec<u8> {
        let mut archive = Vec::new();
        let local_offset = archive.len() as u32;

        let mut compressed = Vec::new();
        let tally = compress_to_sink(
            Box::new(Cursor::new(content.to_vec())),
            &Stored,
            Box::new(VecSink(&mut compressed)),
        )
        .unwrap();

        let local_header = LocalFileHeader {
            version_needed: 20,
            flags: 0,
            compression_method: 0,
            dos_time_date: 0,
            crc32: tally.crc32,
            compressed_size: tally.compressed_size as u32,
            uncompressed_size: tally.uncompressed_size as u32,
            name: name.as_bytes().to_vec(),
            extra: Vec::new(),
        };
        local_header.write(&mut archive);
        archive.extend_from_slice(&compressed);

        let cd_offset = archive.len() as u32;
        let central_header = crate::records::CentralDirectoryHeader {
            version_made_by: (3 << 8) | 20,
            version_needed: 20,
            flags: 0,
            compression_method: 0,
            dos_time_date: 0,
            crc32: tally.crc32,
            compressed_size: tally.compressed_size as u32,
            uncompressed_size: tally.uncompressed_size as u32,
            disk_number_start: 0,
            internal_attrs: 0,
            external_attrs: 0,
            local_header_offset: local_offset,
            name: name.as_bytes().to_vec(),
            extra: Vec::new(),
            comment: Vec::new(),
        };
        central_header.write(&mut archive);
        let cd_size = archive.len() as u32 - cd_offset;

        let eocdr = EndOfCentralDirectory {
            disk_number: 0,
            cd_start_disk: 0,
            entries_this_disk: 1,
            entries_total: 1,
            cd_size,
            cd_offset,
            comment: b"hi".to_vec(),
        };
        eocdr.write(&mut archive);
        archive
    }

    #[test]
    fn reads_a_single_stored_entry_and_its_comment() {
        let archive = build_single_entry_archive("hello.txt", b"hello world");
        let reader = ZipReader::new(Arc::new(InMemorySource::new(archive)));
        reader.open().unwrap();

        assert_eq!(reader.comment().unwrap(), "hi");
        let entries = reader.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path(), "hello.txt");

        let mut stream = reader.open_entry(&entries[0]).unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn open_is_idempotent() {
        let archive = build_single_entry_archive("a", b"x");
        let reader = ZipReader::new(Arc::new(InMemorySource::new(archive)));
        reader.open().unwrap();
        reader.open().unwrap();
        assert_eq!(reader.entries().unwrap().len(), 1);
    }

    #[test]
    fn accessors_before_open_return_a_state_error() {
        let reader = ZipReader::new(Arc::new(InMemorySource::new(Vec::new())));
        assert!(matches!(reader.entries(), Err(ZipError::State(_))));
    }
}
