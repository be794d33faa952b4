//! Error types for the streaming core.

use thiserror::Error;

/// Errors produced by the crate itself.
///
/// Failures raised by an entry's own chunk source are *not* represented
/// here: the encoder propagates them verbatim as the [`anyhow::Error`] the
/// source produced, without translation. Everything the crate can fail with
/// on its own is one of these kinds.
#[derive(Debug, Error)]
pub enum ZipStreamError {
    /// A one-shot chunk source was opened a second time.
    ///
    /// Happens when an archive built over non-restartable sources is
    /// re-iterated (e.g. through [`zip_stream_resource`]). Wrap the producer
    /// in a [`ResourceStream`] to make it restartable.
    ///
    /// [`zip_stream_resource`]: crate::zip_stream_resource
    /// [`ResourceStream`]: crate::ResourceStream
    #[error("chunk source already consumed and not restartable")]
    SourceExhausted,

    /// The name deduplicator failed to produce a name; the archive is
    /// aborted.
    #[error("name deduplication failed")]
    Deduplication(#[source] anyhow::Error),

    /// An entry name does not fit the ZIP header's 16-bit length field.
    ///
    /// Sizes, offsets, and entry counts extend into ZIP64 automatically;
    /// the name length is the one counter with no 64-bit escape hatch.
    #[error("entry name of {0} bytes exceeds the zip name length limit")]
    NameTooLong(usize),

    /// The incremental deflater reported an internal failure.
    #[error("deflate compression failed")]
    Compression(#[from] flate2::CompressError),
}
