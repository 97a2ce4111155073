//! The sequential archive builder: serializes each entry's local header,
//! pipes its data through the compression pipeline, appends a data
//! descriptor when needed, and on [`ZipWriter::finalize`] writes the
//! central directory and trailer.
//!
//! `add_entry`/`finalize` are guarded by a single [`Mutex`] so that
//! concurrent callers serialize into a valid byte stream regardless of
//! scheduling, exactly as spec.md's concurrency model requires. A failure
//! anywhere poisons the writer: every later call returns
//! [`ZipError::State`] rather than risk appending to a sink left in an
//! unknown position.

use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

use log::{debug, trace};

use crate::attrs::{AttributeView, Attributes, Platform};
use crate::binary::{Cp437Codec, LegacyCodec};
use crate::compression::{self, compress_to_sink, AlgorithmMap};
use crate::dos_date;
use crate::entry::EntryOptions;
use crate::error::{Result, ZipError};
use crate::extra::{ExtraFields, Zip64Extra, Zip64Mask};
use crate::flags::Flags;
use crate::records::{
    CentralDirectoryHeader, DataDescriptor, EndOfCentralDirectory, LocalFileHeader,
    Zip64EndOfCentralDirectory, Zip64EndOfCentralDirectoryLocator,
};

/// Minimum "version needed to extract" for any entry.
const BASE_VERSION: u16 = 20;
/// Minimum version needed once the UTF-8 flag is set.
const UTF8_VERSION: u16 = 63;
/// Minimum version needed once Zip64 record layout is in effect.
const ZIP64_VERSION: u16 = 45;
/// An archive with more entries than this cannot be represented without
/// Zip64, regardless of any entry's individual size.
const MAX_ENTRIES_WITHOUT_ZIP64: u64 = 0xFFFF;

fn required_version(utf8: bool, zip64: bool) -> u16 {
    let mut v = BASE_VERSION;
    if utf8 {
        v = v.max(UTF8_VERSION);
    }
    if zip64 {
        v = v.max(ZIP64_VERSION);
    }
    v
}

/// One entry already committed to the in-memory central directory,
/// carrying everything [`ZipWriter::finalize`] needs to serialize its
/// header.
struct DirectoryRecord {
    header: CentralDirectoryHeader,
    version_needed: u16,
    is_zip64: bool,
}

struct OpenState {
    sink: Box<dyn Write + Send>,
    bytes_written: u64,
    starting_offset: u64,
    directory: Vec<DirectoryRecord>,
}

enum WriterState {
    Open(OpenState),
    Finalized,
    Poisoned,
}

/// A single-producer ZIP/ZIP64 archive builder over any [`Write`] sink.
///
/// Construction takes ownership of the sink; `add_entry` may be called any
/// number of times, and exactly one `finalize` call closes the archive.
/// Both are legal to call from multiple threads — the mutex makes the
/// interleaving safe, not concurrent (only one `add_entry`/`finalize`
/// actually runs at a time).
pub struct ZipWriter {
    state: Mutex<WriterState>,
    codec: Arc<dyn LegacyCodec>,
    algorithms: AlgorithmMap,
}

impl ZipWriter {
    /// Wraps `sink`, starting the archive at byte offset 0 of whatever the
    /// sink eventually contains.
    pub fn new(sink: Box<dyn Write + Send>) -> Self {
        Self::with_starting_offset(sink, 0)
    }

    /// Wraps `sink`, treating `starting_offset` bytes as already having
    /// been written to it before this writer's first byte (for example, a
    /// self-extracting stub prepended outside this engine). Every offset
    /// this writer records — local header offsets, the directory offset —
    /// is relative to the start of the underlying file, not to this
    /// writer's own first byte.
    pub fn with_starting_offset(sink: Box<dyn Write + Send>, starting_offset: u64) -> Self {
        ZipWriter {
            state: Mutex::new(WriterState::Open(OpenState {
                sink,
                bytes_written: 0,
                starting_offset,
                directory: Vec::new(),
            })),
            codec: Arc::new(Cp437Codec),
            algorithms: AlgorithmMap::with_defaults(),
        }
    }

    /// Overrides the legacy code-page codec used to encode non-UTF-8 names
    /// and comments. Must be called before the first `add_entry`.
    pub fn with_codec(mut self, codec: Arc<dyn LegacyCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Overrides the compression method registry consulted when an
    /// entry's method is not Stored or Deflate.
    pub fn with_algorithms(mut self, algorithms: AlgorithmMap) -> Self {
        self.algorithms = algorithms;
        self
    }

    fn poison(&self, mut guard: std::sync::MutexGuard<'_, WriterState>) {
        *guard = WriterState::Poisoned;
    }

    /// Adds one entry: serializes its local header, pipes `source` (if
    /// any) through the compression pipeline, appends a data descriptor if
    /// the metadata was not fully known up front, and records a central
    /// directory entry for [`Self::finalize`] to emit later.
    ///
    /// `source` is `None` for a directory entry or any other
    /// zero-length member.
    pub fn add_entry(&self, options: EntryOptions, source: Option<Box<dyn Read + Send>>) -> Result<()> {
        let mut guard = self.state.lock().unwrap();
        let open = match &mut *guard {
            WriterState::Open(open) => open,
            WriterState::Finalized => return Err(ZipError::State("add_entry called after finalize")),
            WriterState::Poisoned => return Err(ZipError::State("writer is poisoned by a prior error")),
        };

        match self.add_entry_locked(open, options, source) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.poison(guard);
                Err(e)
            }
        }
    }

    fn add_entry_locked(
        &self,
        open: &mut OpenState,
        options: EntryOptions,
        source: Option<Box<dyn Read + Send>>,
    ) -> Result<()> {
        let local_header_offset = open.starting_offset + open.bytes_written;

        // A source-less entry (a directory, or any other deliberately empty
        // member) has fully known metadata the moment it's added: all zero.
        // No data descriptor is needed for it even if the caller never
        // called `precomputed_metadata`.
        let (declared_crc32, declared_compressed, declared_uncompressed) = if source.is_none() {
            (Some(options.crc32.unwrap_or(0)), Some(options.compressed_size.unwrap_or(0)), Some(options.uncompressed_size.unwrap_or(0)))
        } else {
            (options.crc32, options.compressed_size, options.uncompressed_size)
        };
        let has_data_descriptor =
            declared_crc32.is_none() || declared_compressed.is_none() || declared_uncompressed.is_none();

        let representable = options.resolve_representability(self.codec.as_ref());
        let utf8 = match options.utf8 {
            Some(false) if !representable => {
                return Err(ZipError::Invariant(
                    "utf8=false requested but path or comment is not representable in the legacy code page".into(),
                ))
            }
            Some(value) => value,
            None => !representable,
        };

        let declared_sizes_exceed_u32 = options
            .uncompressed_size
            .map(|v| v > u32::MAX as u64)
            .unwrap_or(false)
            || options.compressed_size.map(|v| v > u32::MAX as u64).unwrap_or(false);
        let offset_exceeds_u32 = local_header_offset > u32::MAX as u64;
        let pre_zip64_forced = offset_exceeds_u32 || declared_sizes_exceed_u32;
        let pre_zip64 = match options.zip64 {
            Some(false) if pre_zip64_forced => {
                return Err(ZipError::Invariant(
                    "zip64=false requested but the local header offset or a declared size exceeds 2^32-1".into(),
                ))
            }
            Some(value) => value,
            None => pre_zip64_forced,
        };

        let platform = options.platform();
        let is_directory = options
            .attributes
            .map(|a| a.is_directory())
            .unwrap_or_else(|| options.path.ends_with('/'));
        let attributes = options.attributes.unwrap_or_else(|| {
            if is_directory {
                Attributes::new_directory(platform)
            } else {
                Attributes::new_file(platform)
            }
        });

        let method = options.compression_method.unwrap_or_else(|| {
            let empty = source.is_none() || options.uncompressed_size == Some(0);
            if empty {
                compression::METHOD_STORED
            } else {
                compression::METHOD_DEFLATE
            }
        });
        let algorithm = self
            .algorithms
            .get(method)
            .ok_or_else(|| ZipError::format(format!("unknown compression method {method}")))?;

        let pre_required = required_version(utf8, pre_zip64);
        let version_needed_local = match options.version_needed {
            Some(v) if v < pre_required => {
                return Err(ZipError::Invariant(format!(
                    "requested version_needed {v} is lower than the required {pre_required}"
                )))
            }
            Some(v) => v,
            None => pre_required,
        };

        let mut flags = Flags::default();
        flags.set_utf8(utf8);
        flags.set_data_descriptor(has_data_descriptor);

        let name_bytes = encode_name(&options.path, utf8, self.codec.as_ref())?;
        let comment_bytes = encode_name(&options.comment, utf8, self.codec.as_ref())?;

        let declared = (declared_uncompressed, declared_compressed, declared_crc32);
        let local_mask = if pre_zip64 {
            Zip64Mask { uncompressed_size: true, compressed_size: true, header_offset: false, disk_number: false }
        } else {
            Zip64Mask::default()
        };
        let local_extra_bytes = {
            let mut buf = Vec::new();
            if pre_zip64 {
                let extra = Zip64Extra {
                    uncompressed_size: Some(declared.0.unwrap_or(0)),
                    compressed_size: Some(declared.1.unwrap_or(0)),
                    header_offset: None,
                    disk_number: None,
                };
                extra.write(local_mask, &mut buf);
            }
            buf
        };

        let local_header = LocalFileHeader {
            version_needed: version_needed_local,
            flags: flags.bits(),
            compression_method: method,
            dos_time_date: dos_date::pack(&options.modified.unwrap_or_else(default_modified)),
            crc32: if has_data_descriptor { 0 } else { declared.2.unwrap() },
            compressed_size: if has_data_descriptor {
                0
            } else if pre_zip64 {
                u32::MAX
            } else {
                declared.1.unwrap() as u32
            },
            uncompressed_size: if has_data_descriptor {
                0
            } else if pre_zip64 {
                u32::MAX
            } else {
                declared.0.unwrap() as u32
            },
            name: name_bytes.clone(),
            extra: local_extra_bytes,
        };

        let mut header_bytes = Vec::new();
        local_header.write(&mut header_bytes);
        open.sink.write_all(&header_bytes)?;
        open.bytes_written += header_bytes.len() as u64;
        trace!("wrote local header for {:?} at offset {}", options.path, local_header_offset);

        let tally = if let Some(source) = source {
            let compressed = Arc::new(Mutex::new(Vec::new()));
            let tally = compress_to_sink(
                source,
                algorithm.as_ref(),
                Box::new(SharedVecSink(compressed.clone())),
            )?;
            let bytes = Arc::try_unwrap(compressed).unwrap().into_inner().unwrap();
            open.sink.write_all(&bytes)?;
            open.bytes_written += bytes.len() as u64;
            tally
        } else {
            compression::CompressionTally::default()
        };

        for (field, declared_value, actual_value) in [
            ("crc32", declared.2.map(|v| v as u64), Some(tally.crc32 as u64)),
            ("compressedSize", declared.1, Some(tally.compressed_size)),
            ("uncompressedSize", declared.0, Some(tally.uncompressed_size)),
        ] {
            if let Some(declared_value) = declared_value {
                if Some(declared_value) != actual_value {
                    return Err(ZipError::format(format!("{field} was supplied but is invalid")));
                }
            }
        }

        let post_zip64_forced =
            offset_exceeds_u32 || tally.compressed_size > u32::MAX as u64 || tally.uncompressed_size > u32::MAX as u64;
        let is_zip64 = match options.zip64 {
            Some(false) if post_zip64_forced => {
                return Err(ZipError::Invariant(
                    "zip64=false requested but the entry's final size or offset exceeds 2^32-1".into(),
                ))
            }
            Some(value) => value,
            None => post_zip64_forced,
        };

        if has_data_descriptor {
            let descriptor = if is_zip64 {
                DataDescriptor::Size64 {
                    crc32: tally.crc32,
                    compressed_size: tally.compressed_size,
                    uncompressed_size: tally.uncompressed_size,
                }
            } else {
                DataDescriptor::Size32 {
                    crc32: tally.crc32,
                    compressed_size: tally.compressed_size as u32,
                    uncompressed_size: tally.uncompressed_size as u32,
                }
            };
            let mut buf = Vec::new();
            descriptor.write(&mut buf);
            open.sink.write_all(&buf)?;
            open.bytes_written += buf.len() as u64;
        }

        let final_required = required_version(utf8, is_zip64);
        let version_needed_final = match options.version_needed {
            Some(v) if v < final_required => {
                return Err(ZipError::Invariant(format!(
                    "requested version_needed {v} is lower than the required {final_required}"
                )))
            }
            Some(v) => v,
            None => final_required,
        };

        let zip64_mask = if is_zip64 {
            Zip64Mask { uncompressed_size: true, compressed_size: true, header_offset: true, disk_number: false }
        } else {
            Zip64Mask::default()
        };
        let zip64_extra = if is_zip64 {
            Some(Zip64Extra {
                uncompressed_size: Some(tally.uncompressed_size),
                compressed_size: Some(tally.compressed_size),
                header_offset: Some(local_header_offset),
                disk_number: None,
            })
        } else {
            None
        };
        let mut extra_bytes = Vec::new();
        ExtraFields { zip64: zip64_extra, unicode_path: None, unicode_comment: None, unknown: Vec::new() }
            .write(zip64_mask, &mut extra_bytes);

        let header = CentralDirectoryHeader {
            version_made_by: ((platform.to_byte() as u16) << 8) | version_needed_final,
            version_needed: version_needed_final,
            flags: flags.bits(),
            compression_method: method,
            dos_time_date: dos_date::pack(&options.modified.unwrap_or_else(default_modified)),
            crc32: tally.crc32,
            compressed_size: if is_zip64 { u32::MAX } else { tally.compressed_size as u32 },
            uncompressed_size: if is_zip64 { u32::MAX } else { tally.uncompressed_size as u32 },
            disk_number_start: 0,
            internal_attrs: 0,
            external_attrs: attributes.encode(),
            local_header_offset: if local_header_offset > u32::MAX as u64 {
                u32::MAX
            } else {
                local_header_offset as u32
            },
            name: name_bytes,
            extra: extra_bytes,
            comment: comment_bytes,
        };

        debug!(
            "finished entry {:?}: {} -> {} bytes",
            options.path, tally.uncompressed_size, tally.compressed_size
        );

        open.directory.push(DirectoryRecord { header, version_needed: version_needed_final, is_zip64 });

        Ok(())
    }

    /// Writes the central directory and trailer, then closes the sink.
    /// Exactly one call succeeds; any `add_entry` or further `finalize`
    /// call afterward is a [`ZipError::State`].
    pub fn finalize(&self, comment: &str) -> Result<()> {
        let mut guard = self.state.lock().unwrap();
        let open = match &mut *guard {
            WriterState::Open(open) => open,
            WriterState::Finalized => return Err(ZipError::State("finalize called a second time")),
            WriterState::Poisoned => return Err(ZipError::State("writer is poisoned by a prior error")),
        };

        match self.finalize_locked(open, comment) {
            Ok(()) => {
                *guard = WriterState::Finalized;
                Ok(())
            }
            Err(e) => {
                self.poison(guard);
                Err(e)
            }
        }
    }

    fn finalize_locked(&self, open: &mut OpenState, comment: &str) -> Result<()> {
        let directory_offset = open.starting_offset + open.bytes_written;
        let entry_count = open.directory.len() as u64;

        let mut cd_bytes = Vec::new();
        for record in &open.directory {
            record.header.write(&mut cd_bytes);
        }
        open.sink.write_all(&cd_bytes)?;
        open.bytes_written += cd_bytes.len() as u64;

        let cd_size = cd_bytes.len() as u64;
        let trailer_offset = directory_offset + cd_size;
        let needs_zip64 = open.directory.iter().any(|r| r.is_zip64)
            || entry_count > MAX_ENTRIES_WITHOUT_ZIP64
            || directory_offset >= u32::MAX as u64
            || trailer_offset >= u32::MAX as u64;

        debug!("finalizing archive: {entry_count} entries, cd_size={cd_size}, zip64={needs_zip64}");

        if needs_zip64 {
            let version_needed =
                open.directory.iter().map(|r| r.version_needed).max().unwrap_or(ZIP64_VERSION).max(ZIP64_VERSION);
            let zip64_eocdr = Zip64EndOfCentralDirectory {
                version_made_by: ((Platform::Unix.to_byte() as u16) << 8) | version_needed,
                version_needed,
                disk_number: 0,
                cd_start_disk: 0,
                entries_this_disk: entry_count,
                entries_total: entry_count,
                cd_size,
                cd_offset: directory_offset,
                extensible_data: Vec::new(),
            };
            let zip64_eocdr_offset = open.starting_offset + open.bytes_written;
            let mut buf = Vec::new();
            zip64_eocdr.write(&mut buf);
            open.sink.write_all(&buf)?;
            open.bytes_written += buf.len() as u64;

            let locator = Zip64EndOfCentralDirectoryLocator {
                disk_with_zip64_eocdr: 0,
                zip64_eocdr_offset,
                total_disks: 1,
            };
            let mut buf = Vec::new();
            locator.write(&mut buf);
            open.sink.write_all(&buf)?;
            open.bytes_written += buf.len() as u64;
        }

        let comment_bytes =
            encode_name(comment, false, self.codec.as_ref()).or_else(|_| encode_name(comment, true, self.codec.as_ref()))?;

        let eocdr = EndOfCentralDirectory {
            disk_number: 0,
            cd_start_disk: 0,
            entries_this_disk: if needs_zip64 { u16::MAX } else { entry_count as u16 },
            entries_total: if needs_zip64 { u16::MAX } else { entry_count as u16 },
            cd_size: if needs_zip64 { u32::MAX } else { cd_size as u32 },
            cd_offset: if needs_zip64 { u32::MAX } else { directory_offset as u32 },
            comment: comment_bytes,
        };
        let mut buf = Vec::new();
        eocdr.write(&mut buf);
        open.sink.write_all(&buf)?;
        open.bytes_written += buf.len() as u64;

        open.sink.flush()?;
        Ok(())
    }
}

fn default_modified() -> chrono::NaiveDateTime {
    chrono::NaiveDate::from_ymd_opt(1980, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()
}

/// Encodes `value` as either raw UTF-8 bytes (`utf8 = true`) or through the
/// legacy codec (`utf8 = false`), failing if the legacy codec cannot
/// represent it.
fn encode_name(value: &str, utf8: bool, codec: &dyn LegacyCodec) -> Result<Vec<u8>> {
    if utf8 {
        Ok(value.as_bytes().to_vec())
    } else {
        codec
            .encode(value)
            .ok_or_else(|| ZipError::Invariant(format!("{value:?} is not representable in the legacy code page")))
    }
}

/// A `Write` sink over a shared, owned buffer. Used as the intermediate
/// target for [`compress_to_sink`] (which takes ownership of its sink) so
/// the compressed bytes can be recovered afterward and appended to the
/// writer's real sink with their length tallied as the compressed size.
#[derive(Clone)]
struct SharedVecSink(Arc<Mutex<Vec<u8>>>);

impl Write for SharedVecSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
