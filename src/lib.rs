//! # zipstream: streaming ZIP/ZIP64 archive reader and writer
//!
//! A library for reading and building PKWARE ZIP archives, including the
//! ZIP64 extension, without requiring the whole archive in memory at once.
//! Entry content flows through `std::io::Read`/`Write` so it composes with
//! anything else in the Rust I/O ecosystem: network sockets, pipes,
//! in-memory buffers, or files.
//!
//! ## Reading
//!
//! ```no_run
//! use std::sync::Arc;
//! use zipstream::{FileSource, ZipReader};
//!
//! # fn main() -> zipstream::Result<()> {
//! let source = Arc::new(FileSource::open("archive.zip")?);
//! let reader = ZipReader::new(source);
//! reader.open()?;
//!
//! for entry in reader.entries()? {
//!     println!("{}: {} bytes", entry.path(), entry.uncompressed_size());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Writing
//!
//! ```no_run
//! use std::io::Cursor;
//! use zipstream::{EntryOptions, ZipWriter};
//!
//! # fn main() -> zipstream::Result<()> {
//! let writer = ZipWriter::new(Box::new(Vec::new()));
//! writer.add_entry(
//!     EntryOptions::new("hello.txt"),
//!     Some(Box::new(Cursor::new(b"Hello, World!".to_vec()))),
//! )?;
//! writer.finalize("")?;
//! # Ok(())
//! # }
//! ```

pub mod attrs;
pub mod binary;
pub mod compression;
pub mod dos_date;
pub mod entry;
pub mod error;
pub mod extra;
pub mod flags;
pub mod reader;
pub mod records;
pub mod source;
pub mod stream;
pub mod trailer;
pub mod writer;

pub use attrs::{AttributeView, Attributes, Platform};
pub use binary::{Cp437Codec, LegacyCodec};
pub use compression::{AlgorithmMap, CompressionAlgorithm, Deflate, Stored};
pub use entry::{Entry, EntryOptions};
pub use error::{Result, ZipError};
pub use reader::ZipReader;
pub use source::{FileSource, InMemorySource, RandomAccessSource};
pub use writer::ZipWriter;
