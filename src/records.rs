//! Parsers and serializers for the fixed-layout records that make up a ZIP
//! archive: local file headers, central directory headers, data
//! descriptors, and the three trailer records (EOCDR, Zip64 EOCDR, Zip64
//! EOCDL).
//!
//! Every record here deals only in raw fields — masking 32-bit size fields
//! to `0xFFFFFFFF` when a Zip64 extra field carries the real value is the
//! caller's job (see [`crate::extra::Zip64Mask`]), not this module's.

use crate::binary::{BinaryView, BinaryWrite};
use crate::error::{Result, ZipError};

pub const SIG_LOCAL_FILE_HEADER: u32 = 0x0403_4b50;
pub const SIG_CENTRAL_DIRECTORY_HEADER: u32 = 0x0201_4b50;
pub const SIG_DATA_DESCRIPTOR: u32 = 0x0807_4b50;
pub const SIG_EOCDR: u32 = 0x0605_4b50;
pub const SIG_ZIP64_EOCDR: u32 = 0x0606_4b50;
pub const SIG_ZIP64_EOCDL: u32 = 0x0706_4b50;

pub const LOCAL_FILE_HEADER_FIXED_SIZE: usize = 30;
pub const CENTRAL_DIRECTORY_HEADER_FIXED_SIZE: usize = 46;
pub const EOCDR_FIXED_SIZE: usize = 22;
pub const ZIP64_EOCDR_FIXED_SIZE: usize = 56;
pub const ZIP64_EOCDL_SIZE: usize = 20;

fn check_signature(view: &BinaryView, record: &'static str, expected: u32) -> Result<()> {
    let observed = view.read_u32(0)?;
    if observed != expected {
        return Err(ZipError::signature(record, observed));
    }
    Ok(())
}

/// The fixed 30-byte portion of a local file header, plus its variable-
/// length name and extra-field bytes.
#[derive(Debug, Clone)]
pub struct LocalFileHeader {
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub dos_time_date: u32,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub name: Vec<u8>,
    pub extra: Vec<u8>,
}

impl LocalFileHeader {
    /// Parses the fixed 30-byte header from `data`. `data` must be at least
    /// 30 bytes; the caller is responsible for then reading
    /// `name_len + extra_len` more bytes for the variable-length fields.
    pub fn parse_fixed(data: &[u8]) -> Result<(Self, usize, usize)> {
        let view = BinaryView::new(data);
        check_signature(&view, "local file header", SIG_LOCAL_FILE_HEADER)?;

        let header = LocalFileHeader {
            version_needed: view.read_u16(4)?,
            flags: view.read_u16(6)?,
            compression_method: view.read_u16(8)?,
            dos_time_date: view.read_u32(10)?,
            crc32: view.read_u32(14)?,
            compressed_size: view.read_u32(18)?,
            uncompressed_size: view.read_u32(22)?,
            name: Vec::new(),
            extra: Vec::new(),
        };
        let name_len = view.read_u16(26)? as usize;
        let extra_len = view.read_u16(28)? as usize;
        Ok((header, name_len, extra_len))
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.put_u32(SIG_LOCAL_FILE_HEADER);
        out.put_u16(self.version_needed);
        out.put_u16(self.flags);
        out.put_u16(self.compression_method);
        out.put_u32(self.dos_time_date);
        out.put_u32(self.crc32);
        out.put_u32(self.compressed_size);
        out.put_u32(self.uncompressed_size);
        out.put_u16(self.name.len() as u16);
        out.put_u16(self.extra.len() as u16);
        out.extend_from_slice(&self.name);
        out.extend_from_slice(&self.extra);
    }
}

/// The fixed 46-byte portion of a central directory header, plus its
/// variable-length name, extra-field, and comment bytes.
#[derive(Debug, Clone)]
pub struct CentralDirectoryHeader {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub dos_time_date: u32,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub disk_number_start: u16,
    pub internal_attrs: u16,
    pub external_attrs: u32,
    pub local_header_offset: u32,
    pub name: Vec<u8>,
    pub extra: Vec<u8>,
    pub comment: Vec<u8>,
}

impl CentralDirectoryHeader {
    /// Parses the fixed 46-byte header from `data` plus the three variable
    /// lengths (name, extra, comment), returning the header with its
    /// variable fields still empty.
    pub fn parse_fixed(data: &[u8]) -> Result<(Self, usize, usize, usize)> {
        let view = BinaryView::new(data);
        check_signature(&view, "central directory header", SIG_CENTRAL_DIRECTORY_HEADER)?;

        let header = CentralDirectoryHeader {
            version_made_by: view.read_u16(4)?,
            version_needed: view.read_u16(6)?,
            flags: view.read_u16(8)?,
            compression_method: view.read_u16(10)?,
            dos_time_date: view.read_u32(12)?,
            crc32: view.read_u32(16)?,
            compressed_size: view.read_u32(20)?,
            uncompressed_size: view.read_u32(24)?,
            disk_number_start: view.read_u16(34)?,
            internal_attrs: view.read_u16(36)?,
            external_attrs: view.read_u32(38)?,
            local_header_offset: view.read_u32(42)?,
            name: Vec::new(),
            extra: Vec::new(),
            comment: Vec::new(),
        };
        let name_len = view.read_u16(28)? as usize;
        let extra_len = view.read_u16(30)? as usize;
        let comment_len = view.read_u16(32)? as usize;

        if header.disk_number_start != 0 && header.disk_number_start != 0xFFFF {
            return Err(ZipError::MultiDisk);
        }

        Ok((header, name_len, extra_len, comment_len))
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.put_u32(SIG_CENTRAL_DIRECTORY_HEADER);
        out.put_u16(self.version_made_by);
        out.put_u16(self.version_needed);
        out.put_u16(self.flags);
        out.put_u16(self.compression_method);
        out.put_u32(self.dos_time_date);
        out.put_u32(self.crc32);
        out.put_u32(self.compressed_size);
        out.put_u32(self.uncompressed_size);
        out.put_u16(self.name.len() as u16);
        out.put_u16(self.extra.len() as u16);
        out.put_u16(self.comment.len() as u16);
        out.put_u16(self.disk_number_start);
        out.put_u16(self.internal_attrs);
        out.put_u32(self.external_attrs);
        out.put_u32(self.local_header_offset);
        out.extend_from_slice(&self.name);
        out.extend_from_slice(&self.extra);
        out.extend_from_slice(&self.comment);
    }
}

/// A data descriptor, in either its 32-bit or 64-bit size form. The leading
/// signature is optional per APPUNOTE but this engine always writes it and
/// always checks for it on read.
#[derive(Debug, Clone, Copy)]
pub enum DataDescriptor {
    Size32 { crc32: u32, compressed_size: u32, uncompressed_size: u32 },
    Size64 { crc32: u32, compressed_size: u64, uncompressed_size: u64 },
}

impl DataDescriptor {
    pub fn write(&self, out: &mut Vec<u8>) {
        out.put_u32(SIG_DATA_DESCRIPTOR);
        match self {
            DataDescriptor::Size32 { crc32, compressed_size, uncompressed_size } => {
                out.put_u32(*crc32);
                out.put_u32(*compressed_size);
                out.put_u32(*uncompressed_size);
            }
            DataDescriptor::Size64 { crc32, compressed_size, uncompressed_size } => {
                out.put_u32(*crc32);
                out.put_u64(*compressed_size);
                out.put_u64(*uncompressed_size);
            }
        }
    }

    /// Parses a data descriptor from `data`, which must start at the
    /// descriptor's first byte (the optional signature, if present, is
    /// consumed here). `zip64` selects the 64-bit field width; there is no
    /// way to tell the two forms apart from the bytes alone.
    pub fn parse(data: &[u8], zip64: bool) -> Result<Self> {
        let view = BinaryView::new(data);
        let mut offset = 0;
        if view.read_u32(0)? == SIG_DATA_DESCRIPTOR {
            offset = 4;
        }
        let crc32 = view.read_u32(offset)?;
        if zip64 {
            Ok(DataDescriptor::Size64 {
                crc32,
                compressed_size: view.read_u64(offset + 4)?,
                uncompressed_size: view.read_u64(offset + 12)?,
            })
        } else {
            Ok(DataDescriptor::Size32 {
                crc32,
                compressed_size: view.read_u32(offset + 4)?,
                uncompressed_size: view.read_u32(offset + 8)?,
            })
        }
    }

    /// Byte length of this descriptor including its leading signature.
    pub fn wire_len(&self) -> usize {
        match self {
            DataDescriptor::Size32 { .. } => 16,
            DataDescriptor::Size64 { .. } => 24,
        }
    }
}

/// The classic End Of Central Directory Record.
#[derive(Debug, Clone)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub cd_start_disk: u16,
    pub entries_this_disk: u16,
    pub entries_total: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment: Vec<u8>,
}

impl EndOfCentralDirectory {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let view = BinaryView::new(data);
        check_signature(&view, "end of central directory record", SIG_EOCDR)?;

        let disk_number = view.read_u16(4)?;
        let cd_start_disk = view.read_u16(6)?;
        let entries_this_disk = view.read_u16(8)?;
        let entries_total = view.read_u16(10)?;
        let cd_size = view.read_u32(12)?;
        let cd_offset = view.read_u32(16)?;
        let comment_len = view.read_u16(20)? as usize;
        let comment = view.read_bytes(22, comment_len)?.to_vec();

        if (disk_number != 0 && disk_number != 0xFFFF) || (cd_start_disk != 0 && cd_start_disk != 0xFFFF) {
            return Err(ZipError::MultiDisk);
        }
        if entries_this_disk != entries_total {
            return Err(ZipError::MultiDisk);
        }

        Ok(EndOfCentralDirectory {
            disk_number,
            cd_start_disk,
            entries_this_disk,
            entries_total,
            cd_size,
            cd_offset,
            comment,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.put_u32(SIG_EOCDR);
        out.put_u16(self.disk_number);
        out.put_u16(self.cd_start_disk);
        out.put_u16(self.entries_this_disk);
        out.put_u16(self.entries_total);
        out.put_u32(self.cd_size);
        out.put_u32(self.cd_offset);
        out.put_u16(self.comment.len() as u16);
        out.extend_from_slice(&self.comment);
    }

    /// True if any field is the Zip64 sentinel and a Zip64 EOCDR/EOCDL pair
    /// should be consulted instead.
    pub fn needs_zip64(&self) -> bool {
        self.disk_number == u16::MAX
            || self.cd_start_disk == u16::MAX
            || self.entries_this_disk == u16::MAX
            || self.entries_total == u16::MAX
            || self.cd_size == u32::MAX
            || self.cd_offset == u32::MAX
    }
}

/// The Zip64 End Of Central Directory Record.
///
/// The record's own `size` field (bytes 4..12) stores "size of this record
/// minus 12" — i.e. it does not count the leading signature and size field
/// themselves. [`Self::fixed_size_in_file`] always returns the true
/// on-disk fixed size (56), independent of any trailing extensible data.
#[derive(Debug, Clone)]
pub struct Zip64EndOfCentralDirectory {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub disk_number: u32,
    pub cd_start_disk: u32,
    pub entries_this_disk: u64,
    pub entries_total: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
    pub extensible_data: Vec<u8>,
}

impl Zip64EndOfCentralDirectory {
    /// Fixed portion length as it appears on disk (56 bytes), regardless of
    /// any trailing extensible data this record carries.
    pub fn fixed_size_in_file() -> usize {
        ZIP64_EOCDR_FIXED_SIZE
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        let view = BinaryView::new(data);
        check_signature(&view, "zip64 end of central directory record", SIG_ZIP64_EOCDR)?;

        let record_size = view.read_u64(4)?;
        let version_made_by = view.read_u16(12)?;
        let version_needed = view.read_u16(14)?;
        let disk_number = view.read_u32(16)?;
        let cd_start_disk = view.read_u32(20)?;
        let entries_this_disk = view.read_u64(24)?;
        let entries_total = view.read_u64(32)?;
        let cd_size = view.read_u64(40)?;
        let cd_offset = view.read_u64(48)?;

        // record_size counts everything after the signature+size field
        // itself, i.e. bytes from offset 12 onward.
        let extensible_len = (record_size as usize).saturating_sub(ZIP64_EOCDR_FIXED_SIZE - 12);
        let extensible_data = if extensible_len > 0 {
            view.read_bytes(ZIP64_EOCDR_FIXED_SIZE, extensible_len)?.to_vec()
        } else {
            Vec::new()
        };

        Ok(Zip64EndOfCentralDirectory {
            version_made_by,
            version_needed,
            disk_number,
            cd_start_disk,
            entries_this_disk,
            entries_total,
            cd_size,
            cd_offset,
            extensible_data,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        let record_size = (ZIP64_EOCDR_FIXED_SIZE - 12 + self.extensible_data.len()) as u64;
        out.put_u32(SIG_ZIP64_EOCDR);
        out.put_u64(record_size);
        out.put_u16(self.version_made_by);
        out.put_u16(self.version_needed);
        out.put_u32(self.disk_number);
        out.put_u32(self.cd_start_disk);
        out.put_u64(self.entries_this_disk);
        out.put_u64(self.entries_total);
        out.put_u64(self.cd_size);
        out.put_u64(self.cd_offset);
        out.extend_from_slice(&self.extensible_data);
    }
}

/// The Zip64 End Of Central Directory Locator, always immediately before
/// the classic EOCDR.
#[derive(Debug, Clone, Copy)]
pub struct Zip64EndOfCentralDirectoryLocator {
    pub disk_with_zip64_eocdr: u32,
    pub zip64_eocdr_offset: u64,
    pub total_disks: u32,
}

impl Zip64EndOfCentralDirectoryLocator {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let view = BinaryView::new(data);
        check_signature(&view, "zip64 end of central directory locator", SIG_ZIP64_EOCDL)?;

        let disk_with_zip64_eocdr = view.read_u32(4)?;
        let zip64_eocdr_offset = view.read_u64(8)?;
        let total_disks = view.read_u32(16)?;

        if disk_with_zip64_eocdr != 0 || total_disks != 1 {
            return Err(ZipError::MultiDisk);
        }

        Ok(Zip64EndOfCentralDirectoryLocator { disk_with_zip64_eocdr, zip64_eocdr_offset, total_disks })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.put_u32(SIG_ZIP64_EOCDL);
        out.put_u32(self.disk_with_zip64_eocdr);
        out.put_u64(self.zip64_eocdr_offset);
        out.put_u32(self.total_disks);
    }
}
