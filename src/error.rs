//! Error taxonomy for the ZIP format engine.

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, ZipError>;

/// Errors the format engine can raise.
///
/// Each variant corresponds to one of the error kinds in the engine's
/// design: a structural violation is always `Format`, a bounds violation on
/// the binary view is always `Bounds`, and so on. `Io` is the ambient
/// variant for failures from the underlying reader/writer/sink.
#[derive(Debug, Error)]
pub enum ZipError {
    /// Underlying I/O failure (source read, sink write, file open, ...).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record's magic signature did not match what was expected.
    #[error("bad {record} signature: observed 0x{observed:08x}")]
    Signature {
        /// Name of the record whose signature was checked.
        record: &'static str,
        /// The 4-byte signature actually found, as a little-endian integer.
        observed: u32,
    },

    /// A structural violation: unknown compression method, malformed extra
    /// field, missing trailer, CRC/size mismatch, unrecognized platform
    /// byte, and similar.
    #[error("invalid zip format: {0}")]
    Format(String),

    /// Any field in a record indicated more than one disk.
    #[error("multi-disk archives are not supported")]
    MultiDisk,

    /// A read on the bounded binary view ran past the end of the buffer.
    #[error("read past end of buffer")]
    Bounds,

    /// An out-of-range value: an invalid DOS date/time component, or an
    /// attempt to clear `isFile` on an attributes value.
    #[error("value out of range: {0}")]
    Range(String),

    /// The caller demanded a property (`utf8 = false`, `zip64 = false`, a
    /// `versionNeeded` lower than required) that the entry's actual content
    /// makes impossible.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// An operation was attempted in a state that forbids it: `add_entry`
    /// after `finalize`, a second `finalize`, or a reader accessor used
    /// before `open()`.
    #[error("invalid state: {0}")]
    State(&'static str),
}

impl ZipError {
    pub(crate) fn signature(record: &'static str, observed: u32) -> Self {
        ZipError::Signature { record, observed }
    }

    pub(crate) fn format(message: impl Into<String>) -> Self {
        ZipError::Format(message.into())
    }

    /// Recovers a `ZipError` from an `io::Error` produced by this crate's own
    /// `Read`/`Write` adapters (the decompression pipeline embeds the typed
    /// error as the `io::Error`'s source so format violations discovered
    /// mid-stream — a CRC or size mismatch, for example — are not flattened
    /// into an opaque `Io` variant). An `io::Error` from any other source
    /// (the underlying random-access source, a real file) comes back as
    /// `Io` unchanged.
    pub fn from_io(err: std::io::Error) -> Self {
        if err.get_ref().map(|inner| inner.is::<ZipError>()).unwrap_or(false) {
            let inner = err.into_inner().expect("checked Some via get_ref above");
            return *inner.downcast::<ZipError>().expect("checked is::<ZipError> above");
        }
        ZipError::Io(err)
    }
}
