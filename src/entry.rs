//! The reader-facing [`Entry`] view and the writer-facing [`EntryOptions`]
//! builder.

use chrono::NaiveDateTime;

use crate::attrs::{Attributes, Platform};
use crate::binary::LegacyCodec;
use crate::extra::ExtraFields;
use crate::flags::Flags;

/// A single archive member, as produced by reading a central directory
/// header.
///
/// `path`/`comment` are decoded strings — from the Unicode extra field if
/// one was present and its CRC-32 matched the legacy bytes, otherwise from
/// the legacy code page. The raw on-disk bytes are kept alongside in case a
/// caller needs to distinguish the two.
#[derive(Debug, Clone)]
pub struct Entry {
    pub(crate) path: String,
    pub(crate) path_raw: Vec<u8>,
    pub(crate) comment: String,
    pub(crate) comment_raw: Vec<u8>,
    pub(crate) compression_method: u16,
    pub(crate) crc32: u32,
    pub(crate) compressed_size: u64,
    pub(crate) uncompressed_size: u64,
    pub(crate) local_header_offset: u64,
    pub(crate) modified: Option<NaiveDateTime>,
    pub(crate) attributes: Attributes,
    pub(crate) flags: Flags,
    pub(crate) version_needed: u16,
    pub(crate) extra: ExtraFields,
}

impl Entry {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn path_bytes(&self) -> &[u8] {
        &self.path_raw
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn comment_bytes(&self) -> &[u8] {
        &self.comment_raw
    }

    pub fn compression_method(&self) -> u16 {
        self.compression_method
    }

    pub fn crc32(&self) -> u32 {
        self.crc32
    }

    pub fn compressed_size(&self) -> u64 {
        self.compressed_size
    }

    pub fn uncompressed_size(&self) -> u64 {
        self.uncompressed_size
    }

    /// Naive local timestamp decoded from the DOS date/time fields. `None`
    /// if the packed value did not form a valid calendar date/time.
    pub fn modified(&self) -> Option<NaiveDateTime> {
        self.modified
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn version_needed(&self) -> u16 {
        self.version_needed
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn is_zip64(&self) -> bool {
        self.extra.zip64.is_some()
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags.is_encrypted() || self.flags.is_strong_encrypted()
    }

    /// A path ending in `/` with zero size is the conventional way a ZIP
    /// archive represents a directory entry; the platform attributes are
    /// consulted first since they are authoritative when present.
    pub fn is_directory(&self) -> bool {
        self.attributes.is_directory_like(&self.path, self.uncompressed_size)
    }

    pub fn is_file(&self) -> bool {
        !self.is_directory()
    }
}

// `Attributes::is_directory` alone does not account for archivers (notably
// some older zip tools) that emit DOS attribute byte 0 for directories and
// rely purely on the trailing slash convention; `is_directory_like` folds
// both signals together for `Entry::is_directory`.
use crate::attrs::AttributeView;
impl Attributes {
    pub(crate) fn is_directory_like(&self, path: &str, uncompressed_size: u64) -> bool {
        self.is_directory() || (uncompressed_size == 0 && path.ends_with('/'))
    }
}

/// Builder for the metadata of an entry being added to a [`crate::writer::ZipWriter`].
///
/// Only `path` is required; every other property has a default derived
/// from the data and from the writer's own configuration at `add_entry`
/// time (see the writer's per-entry protocol for exactly how `utf8`,
/// `zip64`, and `version_needed` are resolved when left unset here).
#[derive(Debug, Clone)]
pub struct EntryOptions {
    pub(crate) path: String,
    pub(crate) comment: String,
    pub(crate) modified: Option<NaiveDateTime>,
    pub(crate) compression_method: Option<u16>,
    pub(crate) attributes: Option<Attributes>,
    pub(crate) utf8: Option<bool>,
    pub(crate) zip64: Option<bool>,
    pub(crate) version_needed: Option<u16>,
    pub(crate) crc32: Option<u32>,
    pub(crate) compressed_size: Option<u64>,
    pub(crate) uncompressed_size: Option<u64>,
}

impl EntryOptions {
    pub fn new(path: impl Into<String>) -> Self {
        EntryOptions {
            path: path.into(),
            comment: String::new(),
            modified: None,
            compression_method: None,
            attributes: None,
            utf8: None,
            zip64: None,
            version_needed: None,
            crc32: None,
            compressed_size: None,
            uncompressed_size: None,
        }
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn modified(mut self, modified: NaiveDateTime) -> Self {
        self.modified = Some(modified);
        self
    }

    pub fn compression_method(mut self, method: u16) -> Self {
        self.compression_method = Some(method);
        self
    }

    pub fn attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = Some(attributes);
        self
    }

    /// Forces the UTF-8 flag on (`Some(true)`) or off (`Some(false)`).
    /// Requesting `false` when the path is not representable in the legacy
    /// code page is an error at `add_entry` time, not here.
    pub fn utf8(mut self, value: bool) -> Self {
        self.utf8 = Some(value);
        self
    }

    /// Forces Zip64 record layout on or off. Requesting `false` when the
    /// entry's sizes or offset exceed the 32-bit range is an error at
    /// `add_entry` time.
    pub fn zip64(mut self, value: bool) -> Self {
        self.zip64 = Some(value);
        self
    }

    /// Requests a minimum `version needed to extract`. A value lower than
    /// what the entry's actual properties require is an error at
    /// `add_entry` time.
    pub fn version_needed(mut self, value: u16) -> Self {
        self.version_needed = Some(value);
        self
    }

    /// Declares exact metadata up front instead of deriving it by streaming
    /// the source through the compression pipeline. If all three of
    /// `crc32`/`compressed_size`/`uncompressed_size` are declared this way,
    /// the writer omits the data descriptor and writes a complete local
    /// header immediately.
    pub fn precomputed_metadata(mut self, crc32: u32, compressed_size: u64, uncompressed_size: u64) -> Self {
        self.crc32 = Some(crc32);
        self.compressed_size = Some(compressed_size);
        self.uncompressed_size = Some(uncompressed_size);
        self
    }

    pub(crate) fn platform(&self) -> Platform {
        self.attributes.map(|a| a.platform()).unwrap_or(Platform::Unix)
    }

    pub(crate) fn resolve_representability(&self, codec: &dyn LegacyCodec) -> bool {
        codec.is_representable(&self.path) && codec.is_representable(&self.comment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_options_builder_applies_overrides() {
        let options = EntryOptions::new("dir/file.txt")
            .comment("a comment")
            .compression_method(8)
            .utf8(true)
            .zip64(false);
        assert_eq!(options.path, "dir/file.txt");
        assert_eq!(options.comment, "a comment");
        assert_eq!(options.compression_method, Some(8));
        assert_eq!(options.utf8, Some(true));
        assert_eq!(options.zip64, Some(false));
    }

    #[test]
    fn precomputed_metadata_sets_all_three_fields() {
        let options = EntryOptions::new("a").precomputed_metadata(1, 2, 3);
        assert_eq!(options.crc32, Some(1));
        assert_eq!(options.compressed_size, Some(2));
        assert_eq!(options.uncompressed_size, Some(3));
    }
}
