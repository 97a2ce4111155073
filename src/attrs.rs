//! External file attributes: the platform-tagged 32-bit field carried by
//! each central directory header.
//!
//! APPNOTE splits the field in two: the low byte of the "version made by"
//! field names the originating platform, and the 32-bit external attributes
//! field is interpreted according to that platform. This engine only
//! recognizes the two platforms that matter in practice — DOS (byte 0) and
//! UNIX (byte 3) — and treats anything else as a format error rather than
//! silently misinterpreting the bits.

use crate::error::{Result, ZipError};

const DOS_READONLY: u8 = 1 << 0;
const DOS_HIDDEN: u8 = 1 << 1;
const DOS_SYSTEM: u8 = 1 << 2;
const DOS_DIRECTORY: u8 = 1 << 4;

const S_IFMT: u32 = 0o170000;
const S_IFREG: u32 = 0o100000;
const S_IFDIR: u32 = 0o040000;
const S_IFLNK: u32 = 0o120000;
const PERM_WRITE_OWNER: u32 = 0o200;
const EXEC_BITS: u32 = 0o111;

/// Platform byte of the "version made by" field: DOS is 0, UNIX is 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Dos,
    Unix,
}

impl Platform {
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(Platform::Dos),
            3 => Ok(Platform::Unix),
            other => Err(ZipError::format(format!(
                "unsupported platform byte in version-made-by field: {other}"
            ))),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Platform::Dos => 0,
            Platform::Unix => 3,
        }
    }
}

/// A decoded external-attributes value, tagged by the platform that produced
/// it.
///
/// Both variants expose the same capability view through [`AttributeView`];
/// callers that don't care which platform produced an entry can work purely
/// in terms of `is_directory`/`is_file`/`is_read_only`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attributes {
    Dos(u8),
    Unix(u32),
}

impl Attributes {
    /// Decodes the 32-bit external attributes field for the given platform.
    pub fn decode(platform: Platform, raw: u32) -> Self {
        match platform {
            Platform::Dos => Attributes::Dos(raw as u8),
            Platform::Unix => Attributes::Unix(raw >> 16),
        }
    }

    /// Re-encodes into the 32-bit external attributes field, as it would
    /// appear in a central directory header.
    pub fn encode(&self) -> u32 {
        match self {
            Attributes::Dos(bits) => *bits as u32,
            Attributes::Unix(mode) => (*mode) << 16,
        }
    }

    /// The platform byte this value should be paired with in the
    /// "version made by" field.
    pub fn platform(&self) -> Platform {
        match self {
            Attributes::Dos(_) => Platform::Dos,
            Attributes::Unix(_) => Platform::Unix,
        }
    }

    /// A plain regular-file attributes value for the given platform.
    pub fn new_file(platform: Platform) -> Self {
        match platform {
            Platform::Dos => Attributes::Dos(0),
            Platform::Unix => Attributes::Unix(S_IFREG | 0o644),
        }
    }

    /// A plain directory attributes value for the given platform.
    pub fn new_directory(platform: Platform) -> Self {
        match platform {
            Platform::Dos => Attributes::Dos(DOS_DIRECTORY),
            Platform::Unix => Attributes::Unix(S_IFDIR | 0o755),
        }
    }
}

/// The common capability view shared by [`Attributes::Dos`] and
/// [`Attributes::Unix`].
pub trait AttributeView {
    fn is_directory(&self) -> bool;
    fn is_file(&self) -> bool;
    fn is_symlink(&self) -> bool;
    fn is_read_only(&self) -> bool;

    /// Sets whether this entry is a plain file.
    ///
    /// Setting `true` is always accepted. Setting `false` is rejected with
    /// [`ZipError::Range`]: a file can be turned into something else only
    /// by choosing a more specific constructor (`new_directory`), not by
    /// clearing a flag on an existing value.
    fn set_is_file(&mut self, value: bool) -> Result<()>;
}

impl AttributeView for Attributes {
    fn is_directory(&self) -> bool {
        match self {
            Attributes::Dos(bits) => bits & DOS_DIRECTORY != 0,
            Attributes::Unix(mode) => mode & S_IFMT == S_IFDIR,
        }
    }

    fn is_file(&self) -> bool {
        match self {
            Attributes::Dos(bits) => bits & DOS_DIRECTORY == 0,
            Attributes::Unix(mode) => mode & S_IFMT == S_IFREG,
        }
    }

    fn is_symlink(&self) -> bool {
        match self {
            Attributes::Dos(_) => false,
            Attributes::Unix(mode) => mode & S_IFMT == S_IFLNK,
        }
    }

    fn is_read_only(&self) -> bool {
        match self {
            Attributes::Dos(bits) => bits & DOS_READONLY != 0,
            Attributes::Unix(mode) => mode & PERM_WRITE_OWNER == 0,
        }
    }

    fn set_is_file(&mut self, value: bool) -> Result<()> {
        if !value {
            return Err(ZipError::Range(
                "cannot clear is_file on an attributes value; construct a directory instead".into(),
            ));
        }
        match self {
            Attributes::Dos(bits) => *bits &= !DOS_DIRECTORY,
            Attributes::Unix(mode) => {
                *mode = (*mode & !S_IFMT) | S_IFREG;
            }
        }
        Ok(())
    }
}

impl Attributes {
    /// True if the UNIX executable bits are set. DOS attributes have no
    /// equivalent and always report `false`.
    pub fn is_executable(&self) -> bool {
        match self {
            Attributes::Dos(_) => false,
            Attributes::Unix(mode) => mode & EXEC_BITS != 0,
        }
    }

    /// True if the DOS hidden bit is set. UNIX attributes have no equivalent
    /// and always report `false`.
    pub fn is_hidden(&self) -> bool {
        matches!(self, Attributes::Dos(bits) if bits & DOS_HIDDEN != 0)
    }

    /// True if the DOS system bit is set. UNIX attributes have no
    /// equivalent and always report `false`.
    pub fn is_system(&self) -> bool {
        matches!(self, Attributes::Dos(bits) if bits & DOS_SYSTEM != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dos_directory_round_trips() {
        let attrs = Attributes::new_directory(Platform::Dos);
        assert!(attrs.is_directory());
        assert!(!attrs.is_file());
        let raw = attrs.encode();
        assert_eq!(Attributes::decode(Platform::Dos, raw), attrs);
    }

    #[test]
    fn unix_mode_round_trips_through_upper_16_bits() {
        let attrs = Attributes::Unix(S_IFREG | 0o755);
        let raw = attrs.encode();
        assert_eq!(raw >> 16, S_IFREG | 0o755);
        assert_eq!(Attributes::decode(Platform::Unix, raw), attrs);
        assert!(attrs.is_file());
        assert!(attrs.is_executable());
    }

    #[test]
    fn set_is_file_false_is_rejected() {
        let mut attrs = Attributes::new_file(Platform::Unix);
        assert!(attrs.set_is_file(false).is_err());
        assert!(attrs.is_file());
    }

    #[test]
    fn set_is_file_true_clears_directory_bit() {
        let mut attrs = Attributes::new_directory(Platform::Dos);
        attrs.set_is_file(true).unwrap();
        assert!(attrs.is_file());
        assert!(!attrs.is_directory());
    }

    #[test]
    fn unknown_platform_byte_is_a_format_error() {
        assert!(Platform::from_byte(7).is_err());
    }
}
