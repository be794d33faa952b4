mod resource;

pub(crate) use resource::SourceFactory;
pub use resource::{resource_stream_fn, ResourceStream};

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};

/// Trait for an asynchronous producer of byte chunks.
///
/// A chunk source is lazy, finite, and forward-only: `next_chunk` is pulled
/// until it returns `None` (end of data) or `Some(Err(_))` (failure), after
/// which it must not be pulled again. A source is consumed at most once;
/// [`ResourceStream`] is the restartable exception.
///
/// Zero-length chunks are valid and must be passed through by adapters.
#[async_trait]
pub trait ChunkSource: Send {
    /// Produce the next chunk of data.
    ///
    /// Returns `Some(Ok(chunk))` while data remains, `None` at the end of
    /// the sequence, or `Some(Err(_))` if the producer failed. Consumers
    /// propagate failures outward verbatim.
    async fn next_chunk(&mut self) -> Option<Result<Vec<u8>>>;
}

/// Chunk source over a fully-buffered byte string.
///
/// Yields the buffer as a single chunk (empty buffers included), then ends.
pub struct BytesSource {
    data: Option<Vec<u8>>,
}

impl BytesSource {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: Some(data.into()),
        }
    }
}

#[async_trait]
impl ChunkSource for BytesSource {
    async fn next_chunk(&mut self) -> Option<Result<Vec<u8>>> {
        self.data.take().map(Ok)
    }
}

/// Adapter from a [`futures::Stream`] of byte results to a [`ChunkSource`].
///
/// Bridges producers written against the stream ecosystem (HTTP bodies,
/// channel receivers) into the chunk-source contract. The stream is consumed
/// in place; restartability, if needed, is layered on with a
/// [`ResourceStream`] whose factory builds a fresh stream.
pub struct StreamSource<S> {
    inner: S,
}

impl<S> StreamSource<S>
where
    S: Stream<Item = Result<Vec<u8>>> + Send + Unpin,
{
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S> ChunkSource for StreamSource<S>
where
    S: Stream<Item = Result<Vec<u8>>> + Send + Unpin,
{
    async fn next_chunk(&mut self) -> Option<Result<Vec<u8>>> {
        self.inner.next().await
    }
}

/// Extension methods for every [`ChunkSource`].
pub trait ChunkSourceExt: ChunkSource + Sized {
    /// Adapt this source into a [`futures::Stream`] of byte results.
    ///
    /// The returned stream pulls the source lazily, one chunk per poll, so
    /// it can be handed to anything that consumes streams (a request body,
    /// a writer task) without buffering.
    fn into_stream(self) -> futures::stream::BoxStream<'static, Result<Vec<u8>>>
    where
        Self: 'static,
    {
        futures::stream::unfold(self, |mut source| async move {
            source.next_chunk().await.map(|item| (item, source))
        })
        .boxed()
    }
}

impl<S: ChunkSource + Sized> ChunkSourceExt for S {}
