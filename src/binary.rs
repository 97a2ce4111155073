//! Bounded little-endian accessor over a byte buffer, plus the legacy
//! code-page codec used for paths and comments when the UTF-8 flag is clear.

use std::borrow::Cow;

use codepage_437::{BorrowFromCp437, CP437_CONTROL};

use crate::error::{Result, ZipError};

/// A non-owning, bounds-checked window into a byte buffer.
///
/// Every accessor takes an offset relative to the view's own start; an
/// out-of-range access returns [`ZipError::Bounds`] rather than panicking.
#[derive(Debug, Clone, Copy)]
pub struct BinaryView<'a> {
    data: &'a [u8],
}

impl<'a> BinaryView<'a> {
    /// Wraps `data` as a view starting at its first byte.
    pub fn new(data: &'a [u8]) -> Self {
        BinaryView { data }
    }

    /// Length of the underlying buffer.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the underlying buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn slice(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        offset
            .checked_add(len)
            .and_then(|end| self.data.get(offset..end))
            .ok_or(ZipError::Bounds)
    }

    /// Reads a single byte at `offset`.
    pub fn read_u8(&self, offset: usize) -> Result<u8> {
        Ok(self.slice(offset, 1)?[0])
    }

    /// Reads a little-endian `u16` at `offset`.
    pub fn read_u16(&self, offset: usize) -> Result<u16> {
        let bytes: [u8; 2] = self.slice(offset, 2)?.try_into().unwrap();
        Ok(u16::from_le_bytes(bytes))
    }

    /// Reads a little-endian `u32` at `offset`.
    pub fn read_u32(&self, offset: usize) -> Result<u32> {
        let bytes: [u8; 4] = self.slice(offset, 4)?.try_into().unwrap();
        Ok(u32::from_le_bytes(bytes))
    }

    /// Reads a little-endian `u64` at `offset`.
    ///
    /// Rust's native `u64` holds the full 64-bit range, so unlike
    /// implementations in languages without a native 64-bit integer type,
    /// this never needs a "safe integer" ceiling check.
    pub fn read_u64(&self, offset: usize) -> Result<u64> {
        let bytes: [u8; 8] = self.slice(offset, 8)?.try_into().unwrap();
        Ok(u64::from_le_bytes(bytes))
    }

    /// Returns the `len` raw bytes starting at `offset`.
    pub fn read_bytes(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        self.slice(offset, len)
    }

    /// Decodes `len` bytes starting at `offset` using `codec`.
    pub fn read_string(&self, offset: usize, len: usize, codec: &dyn LegacyCodec) -> Result<String> {
        let bytes = self.slice(offset, len)?;
        Ok(codec.decode(bytes))
    }
}

/// Writes fixed-width little-endian integers onto the end of a growing
/// buffer. Record serializers use this to build up local headers, central
/// directory headers, and the various trailer records.
pub trait BinaryWrite {
    /// Appends `value` as a little-endian `u16`.
    fn put_u16(&mut self, value: u16);
    /// Appends `value` as a little-endian `u32`.
    fn put_u32(&mut self, value: u32);
    /// Appends `value` as a little-endian `u64`.
    fn put_u64(&mut self, value: u64);
    /// Appends a single byte.
    fn put_u8(&mut self, value: u8);
}

impl BinaryWrite for Vec<u8> {
    fn put_u16(&mut self, value: u16) {
        self.extend_from_slice(&value.to_le_bytes());
    }

    fn put_u32(&mut self, value: u32) {
        self.extend_from_slice(&value.to_le_bytes());
    }

    fn put_u64(&mut self, value: u64) {
        self.extend_from_slice(&value.to_le_bytes());
    }

    fn put_u8(&mut self, value: u8) {
        self.push(value);
    }
}

/// Translates between a legacy single-byte code page and Unicode.
///
/// The full bidirectional CP437 table is treated, per the format engine's
/// design, as an externally supplied lookup: decoding is backed by the
/// `codepage_437` crate's full table, but encoding only recognizes the
/// ASCII subset, which is common to CP437 and UTF-8 alike. Anything outside
/// ASCII is reported as not representable, which causes the writer to set
/// the UTF-8 flag rather than attempt a lossy legacy encoding.
pub trait LegacyCodec: Send + Sync {
    /// Decodes `bytes` from the legacy code page into a Rust string.
    fn decode(&self, bytes: &[u8]) -> String;

    /// True if `value` can be encoded without setting the UTF-8 flag.
    fn is_representable(&self, value: &str) -> bool;

    /// Encodes `value` into the legacy code page, if representable.
    fn encode(&self, value: &str) -> Option<Vec<u8>>;
}

/// The default [`LegacyCodec`]: CP437 decode via the `codepage_437` crate,
/// ASCII-subset encode.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cp437Codec;

impl LegacyCodec for Cp437Codec {
    fn decode(&self, bytes: &[u8]) -> String {
        let decoded: Cow<str> = Cow::borrow_from_cp437(bytes, &CP437_CONTROL);
        decoded.into_owned()
    }

    fn is_representable(&self, value: &str) -> bool {
        value.is_ascii()
    }

    fn encode(&self, value: &str) -> Option<Vec<u8>> {
        if value.is_ascii() {
            Some(value.as_bytes().to_vec())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_are_bounds_checked() {
        let buf = [1u8, 2, 3, 4];
        let view = BinaryView::new(&buf);
        assert_eq!(view.read_u16(0).unwrap(), 0x0201);
        assert_eq!(view.read_u32(0).unwrap(), 0x04030201);
        assert!(matches!(view.read_u32(1), Err(ZipError::Bounds)));
        assert!(matches!(view.read_u64(0), Err(ZipError::Bounds)));
    }

    #[test]
    fn cp437_roundtrips_ascii() {
        let codec = Cp437Codec;
        assert!(codec.is_representable("hello.txt"));
        assert_eq!(codec.encode("hello.txt"), Some(b"hello.txt".to_vec()));
        assert_eq!(codec.decode(b"hello.txt"), "hello.txt");
    }

    #[test]
    fn cp437_rejects_non_ascii_for_encoding() {
        let codec = Cp437Codec;
        assert!(!codec.is_representable("path 2\u{fe0f}\u{20e3}"));
        assert_eq!(codec.encode("path 2\u{fe0f}\u{20e3}"), None);
    }
}
