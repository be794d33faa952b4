//! Restartable chunk sources.
//!
//! A plain [`ChunkSource`] is consumed at most once. A [`ResourceStream`]
//! instead captures the *recipe* for a producer (a factory plus whatever
//! arguments the factory closure owns) and starts a fresh producer for each
//! consumption, which is what retry and redirect handling need: the body of
//! a request can be replayed because nothing about the first attempt is
//! cached.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use super::ChunkSource;

pub(crate) type SourceFactory = dyn Fn() -> Box<dyn ChunkSource> + Send + Sync;

/// A chunk source that is restartable because it carries a factory rather
/// than live producer state.
///
/// Construction performs no work and never fails; the factory runs only when
/// the stream is consumed. Each consumption (an explicit [`open`], or
/// pulling the stream itself after a previous run ended) starts an
/// independent producer, so repeated runs yield byte-identical sequences
/// exactly when the factory is deterministic. Nothing produced is observed
/// or cached by the wrapper.
///
/// Clones share the factory but never an active producer.
///
/// ```
/// use zipstream::{ChunkSource, BytesSource, ResourceStream};
///
/// # tokio_test::block_on(async {
/// let mut stream = ResourceStream::new(|| BytesSource::new(b"payload".to_vec()));
/// assert_eq!(stream.next_chunk().await.unwrap().unwrap(), b"payload");
/// assert!(stream.next_chunk().await.is_none());
/// // A finished run restarts transparently.
/// assert_eq!(stream.next_chunk().await.unwrap().unwrap(), b"payload");
/// # });
/// ```
///
/// [`open`]: ResourceStream::open
pub struct ResourceStream {
    factory: Arc<SourceFactory>,
    active: Option<Box<dyn ChunkSource>>,
}

impl ResourceStream {
    /// Wrap a factory into a restartable stream.
    ///
    /// Arguments are curried by closure capture: `ResourceStream::new(move
    /// || make_source(url.clone()))` carries `url` by ownership without
    /// copying it defensively.
    pub fn new<F, S>(factory: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
        S: ChunkSource + 'static,
    {
        Self {
            factory: Arc::new(move || Box::new(factory()) as Box<dyn ChunkSource>),
            active: None,
        }
    }

    /// Start one fresh producer from the captured factory.
    ///
    /// Every call is independent; two open producers share no state.
    pub fn open(&self) -> Box<dyn ChunkSource> {
        (self.factory)()
    }

    /// Shared handle on the captured factory.
    pub(crate) fn factory(&self) -> Arc<SourceFactory> {
        Arc::clone(&self.factory)
    }
}

impl Clone for ResourceStream {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
            active: None,
        }
    }
}

#[async_trait]
impl ChunkSource for ResourceStream {
    /// Pull from the active producer, starting one on demand.
    ///
    /// After the producer ends or fails it is dropped, so the next pull
    /// begins a new run. Failures surface only here, never at wrap time.
    async fn next_chunk(&mut self) -> Option<Result<Vec<u8>>> {
        let factory = &self.factory;
        let source = self.active.get_or_insert_with(|| (factory)());

        match source.next_chunk().await {
            Some(Ok(chunk)) => Some(Ok(chunk)),
            Some(Err(error)) => {
                self.active = None;
                Some(Err(error))
            }
            None => {
                self.active = None;
                None
            }
        }
    }
}

/// Decorator that turns a chunk-source factory into a resource-stream
/// factory.
///
/// The returned closure has the same call shape as `function` (factories
/// taking several parameters take them as a tuple) but returns a
/// [`ResourceStream`] carrying the call instead of starting the producer.
///
/// ```
/// use zipstream::{resource_stream_fn, BytesSource};
///
/// let open_greeting = resource_stream_fn(|name: String| {
///     BytesSource::new(format!("hello {name}").into_bytes())
/// });
/// // Same call-site syntax; the producer has not started.
/// let stream = open_greeting("zip".to_string());
/// # let _ = stream;
/// ```
pub fn resource_stream_fn<F, A, S>(function: F) -> impl Fn(A) -> ResourceStream
where
    F: Fn(A) -> S + Clone + Send + Sync + 'static,
    A: Clone + Send + Sync + 'static,
    S: ChunkSource + 'static,
{
    move |args: A| {
        let function = function.clone();
        ResourceStream::new(move || function(args.clone()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::source::BytesSource;

    async fn drain(source: &mut dyn ChunkSource) -> Vec<Vec<u8>> {
        let mut chunks = Vec::new();
        while let Some(chunk) = source.next_chunk().await {
            chunks.push(chunk.unwrap());
        }
        chunks
    }

    #[tokio::test]
    async fn wrapping_performs_no_work() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let stream = ResourceStream::new(move || {
            counted.fetch_add(1, Ordering::SeqCst);
            BytesSource::new(b"x".to_vec())
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        drop(stream);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn two_iterations_yield_identical_sequences() {
        let mut stream = ResourceStream::new(|| BytesSource::new(b"hello".to_vec()));
        let first = drain(&mut stream).await;
        let second = drain(&mut stream).await;
        assert_eq!(first, second);
        assert_eq!(first, vec![b"hello".to_vec()]);
    }

    #[tokio::test]
    async fn open_producers_are_independent() {
        let stream = ResourceStream::new(|| BytesSource::new(b"ab".to_vec()));
        let mut one = stream.open();
        let mut two = stream.open();
        assert_eq!(one.next_chunk().await.unwrap().unwrap(), b"ab");
        // Consuming `one` never advanced `two`.
        assert_eq!(two.next_chunk().await.unwrap().unwrap(), b"ab");
    }

    #[tokio::test]
    async fn decorator_keeps_call_shape() {
        let open_repeated = resource_stream_fn(|(byte, count): (u8, usize)| {
            BytesSource::new(vec![byte; count])
        });
        let mut stream = open_repeated((b'z', 3));
        assert_eq!(drain(&mut stream).await, vec![b"zzz".to_vec()]);
        // And again, from the same captured arguments.
        assert_eq!(drain(&mut stream).await, vec![b"zzz".to_vec()]);
    }
}
