//! # zipstream
//!
//! Streaming ZIP archive assembly over restartable asynchronous chunk
//! sources.
//!
//! This library composes archives rather than unpacking them: an ordered
//! list of `(name, chunk source)` entries becomes the byte stream of a
//! valid ZIP archive, produced lazily as the consumer pulls. Sizes and
//! checksums are computed while streaming (data-descriptor layout), so an
//! entry's length never needs to be known up front and no entry is ever
//! buffered whole.
//!
//! ## Features
//!
//! - Entries are lazy chunk producers, not paths: anything that can yield
//!   byte chunks can be archived
//! - Restartable sources via [`ResourceStream`], so a whole archive can be
//!   replayed on retry or redirect
//! - Per-archive STORED or DEFLATE compression, computed incrementally
//! - ZIP64 records whenever a size, offset, or entry count outgrows the
//!   classic format
//! - Pluggable entry-name deduplication (`"a.txt"`, `"a (1).txt"`, ...)
//!
//! ## Example
//!
//! ```
//! use zipstream::{zip_stream, ChunkSource, ZipEntry, ZipStreamOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let entries = vec![
//!         ZipEntry::from_bytes("readme.txt", b"hello".to_vec()),
//!         ZipEntry::from_bytes("data/raw.bin", vec![0u8; 1024]),
//!     ];
//!
//!     let mut archive = zip_stream(entries, ZipStreamOptions::default());
//!     while let Some(chunk) = archive.next_chunk().await {
//!         let chunk = chunk?;
//!         // write the chunk to a socket, file, or request body
//!         # let _ = chunk;
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod source;
pub mod zip;

pub use error::ZipStreamError;
pub use source::{
    resource_stream_fn, BytesSource, ChunkSource, ChunkSourceExt, ResourceStream, StreamSource,
};
pub use zip::{
    default_deduplicator, default_name_reconstructor, zip_stream, zip_stream_resource,
    CompressionMethod, DefaultDeduplicator, Deduplication, NameDeduplicator, NameReconstructor,
    ZipEntry, ZipStreamEncoder, ZipStreamOptions, DEFAULT_NAME_PATTERN,
};
