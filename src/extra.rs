//! The variable-length "extra field" area carried by local headers and
//! central directory headers, and the three tags this engine understands:
//! Zip64 extended information (0x0001), Unicode path (0x7075), and Unicode
//! comment (0x6375). Any other tag is preserved as an opaque blob but never
//! interpreted.

use crate::binary::{BinaryView, BinaryWrite};
use crate::error::{Result, ZipError};

pub const TAG_ZIP64: u16 = 0x0001;
pub const TAG_UNICODE_PATH: u16 = 0x7075;
pub const TAG_UNICODE_COMMENT: u16 = 0x6375;

/// Which 64-bit slots the Zip64 extra field carries, derived from which of
/// the owning record's ordinary 32-bit fields are the `0xFFFFFFFF` sentinel.
///
/// Per APPNOTE, the Zip64 extra field's slots are present *only* for fields
/// that overflowed in the fixed-size record, and always in this fixed
/// order: uncompressed size, compressed size, local header offset, disk
/// number. A reader must consult the sentinel fields to know which slots
/// exist — the extra field's own length is not enough to disambiguate,
/// since e.g. a record with both sizes masked but not the offset has a
/// different byte length than one with the offset masked too.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Zip64Mask {
    pub uncompressed_size: bool,
    pub compressed_size: bool,
    pub header_offset: bool,
    pub disk_number: bool,
}

impl Zip64Mask {
    /// Builds the mask from a central directory header's raw 32-bit fields.
    pub fn from_central_directory_fields(
        uncompressed_size: u32,
        compressed_size: u32,
        header_offset: u32,
        disk_number: u16,
    ) -> Self {
        Zip64Mask {
            uncompressed_size: uncompressed_size == u32::MAX,
            compressed_size: compressed_size == u32::MAX,
            header_offset: header_offset == u32::MAX,
            disk_number: disk_number == u16::MAX,
        }
    }

    /// Builds the mask from a local header's raw 32-bit fields (no disk
    /// number or header offset field exists in a local header).
    pub fn from_local_header_fields(uncompressed_size: u32, compressed_size: u32) -> Self {
        Zip64Mask {
            uncompressed_size: uncompressed_size == u32::MAX,
            compressed_size: compressed_size == u32::MAX,
            header_offset: false,
            disk_number: false,
        }
    }

    pub fn any(&self) -> bool {
        self.uncompressed_size || self.compressed_size || self.header_offset || self.disk_number
    }

    /// Number of bytes the masked payload occupies (8 bytes per `u64` slot,
    /// 4 bytes for the disk number slot).
    pub fn payload_len(&self) -> usize {
        let mut len = 0;
        if self.uncompressed_size {
            len += 8;
        }
        if self.compressed_size {
            len += 8;
        }
        if self.header_offset {
            len += 8;
        }
        if self.disk_number {
            len += 4;
        }
        len
    }
}

/// The decoded Zip64 extended information extra field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Zip64Extra {
    pub uncompressed_size: Option<u64>,
    pub compressed_size: Option<u64>,
    pub header_offset: Option<u64>,
    pub disk_number: Option<u32>,
}

impl Zip64Extra {
    /// Parses the Zip64 payload (the bytes after the tag/length header),
    /// consuming only the slots `mask` says are present.
    pub fn parse(payload: &[u8], mask: Zip64Mask) -> Result<Self> {
        let view = BinaryView::new(payload);
        let mut offset = 0;
        let mut extra = Zip64Extra::default();

        if mask.uncompressed_size {
            extra.uncompressed_size = Some(view.read_u64(offset)?);
            offset += 8;
        }
        if mask.compressed_size {
            extra.compressed_size = Some(view.read_u64(offset)?);
            offset += 8;
        }
        if mask.header_offset {
            extra.header_offset = Some(view.read_u64(offset)?);
            offset += 8;
        }
        if mask.disk_number {
            extra.disk_number = Some(view.read_u32(offset)?);
        }
        Ok(extra)
    }

    /// Serializes the full 0x0001 tag/length/payload record for the slots
    /// that `mask` says are present.
    pub fn write(&self, mask: Zip64Mask, out: &mut Vec<u8>) {
        if !mask.any() {
            return;
        }
        out.put_u16(TAG_ZIP64);
        out.put_u16(mask.payload_len() as u16);
        if mask.uncompressed_size {
            out.put_u64(self.uncompressed_size.unwrap_or(0));
        }
        if mask.compressed_size {
            out.put_u64(self.compressed_size.unwrap_or(0));
        }
        if mask.header_offset {
            out.put_u64(self.header_offset.unwrap_or(0));
        }
        if mask.disk_number {
            out.put_u32(self.disk_number.unwrap_or(0) as u32);
        }
    }
}

/// A decoded Unicode path or Unicode comment extra field (tags 0x7075 and
/// 0x6375 share the same layout).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnicodeExtra {
    pub crc32: u32,
    pub value: String,
}

impl UnicodeExtra {
    const VERSION: u8 = 1;

    fn parse(payload: &[u8]) -> Result<Self> {
        let view = BinaryView::new(payload);
        if view.len() < 5 {
            return Err(ZipError::format("unicode extra field shorter than its fixed 5-byte prefix"));
        }
        let version = view.read_u8(0)?;
        if version != Self::VERSION {
            return Err(ZipError::format(format!("unicode extra field version {version} != 1")));
        }
        let crc32 = view.read_u32(1)?;
        let utf8_bytes = view.read_bytes(5, view.len() - 5)?;
        let value = std::str::from_utf8(utf8_bytes)
            .map_err(|_| ZipError::format("unicode extra field value is not valid utf-8"))?
            .to_string();
        Ok(UnicodeExtra { crc32, value })
    }

    /// Only honored if `crc32` matches the CRC-32 of the legacy-encoded
    /// bytes it was computed over; otherwise the legacy-decoded value in
    /// the owning record should be kept instead.
    pub fn is_valid_for(&self, legacy_bytes: &[u8]) -> bool {
        crc32fast::hash(legacy_bytes) == self.crc32
    }

    fn write(&self, tag: u16, out: &mut Vec<u8>) {
        let payload_len = 5 + self.value.len();
        out.put_u16(tag);
        out.put_u16(payload_len as u16);
        out.put_u8(Self::VERSION);
        out.put_u32(self.crc32);
        out.extend_from_slice(self.value.as_bytes());
    }
}

/// The full set of extra-field records attached to a local header or
/// central directory header.
#[derive(Debug, Clone, Default)]
pub struct ExtraFields {
    pub zip64: Option<Zip64Extra>,
    pub unicode_path: Option<UnicodeExtra>,
    pub unicode_comment: Option<UnicodeExtra>,
    /// Tags this engine does not interpret, preserved verbatim as
    /// `(tag, payload)` so a read-then-write round trip does not silently
    /// drop unrelated metadata other tools attached.
    pub unknown: Vec<(u16, Vec<u8>)>,
}

impl ExtraFields {
    /// Walks the tag/length/payload records in `data`, routing each to its
    /// decoded field or to `unknown`. `zip64_mask` tells the Zip64 decoder
    /// which slots to expect; pass `Zip64Mask::default()` if the owning
    /// record has no masked fields.
    pub fn parse(data: &[u8], zip64_mask: Zip64Mask) -> Result<Self> {
        let view = BinaryView::new(data);
        let mut fields = ExtraFields::default();
        let mut offset = 0;

        while offset + 4 <= view.len() {
            let tag = view.read_u16(offset)?;
            let len = view.read_u16(offset + 2)? as usize;
            let payload = view.read_bytes(offset + 4, len)?;
            offset += 4 + len;

            match tag {
                TAG_ZIP64 if zip64_mask.any() => {
                    fields.zip64 = Some(Zip64Extra::parse(payload, zip64_mask)?);
                }
                TAG_UNICODE_PATH => {
                    fields.unicode_path = Some(UnicodeExtra::parse(payload)?);
                }
                TAG_UNICODE_COMMENT => {
                    fields.unicode_comment = Some(UnicodeExtra::parse(payload)?);
                }
                _ => fields.unknown.push((tag, payload.to_vec())),
            }
        }

        Ok(fields)
    }

    /// Serializes every populated field back into wire form, in the order
    /// Zip64, Unicode path, Unicode comment, then unknown tags.
    pub fn write(&self, zip64_mask: Zip64Mask, out: &mut Vec<u8>) {
        if let Some(zip64) = &self.zip64 {
            zip64.write(zip64_mask, out);
        }
        if let Some(path) = &self.unicode_path {
            path.write(TAG_UNICODE_PATH, out);
        }
        if let Some(comment) = &self.unicode_comment {
            comment.write(TAG_UNICODE_COMMENT, out);
        }
        for (tag, payload) in &self.unknown {
            out.put_u16(*tag);
            out.put_u16(payload.len() as u16);
            out.extend_from_slice(payload);
        }
    }
}

pub fn unsupported_platform_error(byte: u8) -> ZipError {
    ZipError::format(format!("unsupported platform byte: {byte}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zip64_mask_round_trips_through_write_and_parse() {
        let mask = Zip64Mask {
            uncompressed_size: true,
            compressed_size: true,
            header_offset: false,
            disk_number: false,
        };
        let extra = Zip64Extra {
            uncompressed_size: Some(5_000_000_000),
            compressed_size: Some(4_000_000_000),
            header_offset: None,
            disk_number: None,
        };
        let mut buf = Vec::new();
        extra.write(mask, &mut buf);

        let fields = ExtraFields::parse(&buf, mask).unwrap();
        let parsed = fields.zip64.unwrap();
        assert_eq!(parsed.uncompressed_size, Some(5_000_000_000));
        assert_eq!(parsed.compressed_size, Some(4_000_000_000));
        assert_eq!(parsed.header_offset, None);
    }

    #[test]
    fn unknown_tags_survive_a_parse_then_write_round_trip() {
        let mut raw = Vec::new();
        raw.put_u16(0x9999);
        raw.put_u16(3);
        raw.extend_from_slice(&[1, 2, 3]);

        let fields = ExtraFields::parse(&raw, Zip64Mask::default()).unwrap();
        assert_eq!(fields.unknown, vec![(0x9999, vec![1, 2, 3])]);

        let mut out = Vec::new();
        fields.write(Zip64Mask::default(), &mut out);
        assert_eq!(out, raw);
    }

    #[test]
    fn unicode_path_validity_depends_on_matching_crc() {
        let legacy = b"caf\x82.txt";
        let extra = UnicodeExtra {
            crc32: crc32fast::hash(legacy),
            value: "café.txt".to_string(),
        };
        assert!(extra.is_valid_for(legacy));
        assert!(!extra.is_valid_for(b"other"));
    }

    #[test]
    fn unicode_extra_with_bad_version_is_a_format_error() {
        let mut payload = Vec::new();
        payload.put_u8(2);
        payload.put_u32(0);
        payload.extend_from_slice(b"x");
        assert!(matches!(UnicodeExtra::parse(&payload), Err(ZipError::Format(_))));
    }

    #[test]
    fn unicode_extra_too_short_is_a_format_error() {
        let payload = [1u8, 0, 0, 0];
        assert!(matches!(UnicodeExtra::parse(&payload), Err(ZipError::Format(_))));
    }
}
