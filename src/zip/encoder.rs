//! Streaming ZIP archive assembly.
//!
//! The encoder walks its entries in order and emits, per entry, a local
//! file header, the (optionally deflated) payload as it is produced, and a
//! data descriptor carrying the sizes and CRC that were unknown when the
//! header went out. After the last entry it emits the central directory
//! from an internal journal, then the end records. The whole archive is
//! itself a [`ChunkSource`]: nothing is read from any entry until the
//! consumer pulls, and at most one entry source is live at a time.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use crate::error::ZipStreamError;
use crate::source::{BytesSource, ChunkSource, ResourceStream, SourceFactory};

use super::compress::{Compressor, EntryCounters};
use super::dedup::{Deduplication, NameDeduplicator};
use super::structures::{
    CentralDirectoryFileHeader, CompressionMethod, DataDescriptor, EndOfCentralDirectory,
    EntryRecord, LocalFileHeader, Zip64EndOfCentralDirectory, Zip64EocdLocator,
    FLAG_DATA_DESCRIPTOR, FLAG_UTF8, ZIP32_ENTRY_LIMIT, ZIP32_VALUE_LIMIT,
};

/// One file to be written into an archive: a name and the chunk source that
/// produces its bytes.
///
/// Construction performs no I/O; the source is first pulled when the
/// encoder reaches the entry's payload. Neither a size nor a CRC is carried
/// up front, both are computed while streaming.
pub struct ZipEntry {
    name: String,
    source: EntrySource,
}

impl ZipEntry {
    /// Entry over a one-shot chunk source.
    ///
    /// The source is consumed the first time an encoder streams this entry;
    /// streaming it again (a restarted [`zip_stream_resource`] archive)
    /// fails with [`ZipStreamError::SourceExhausted`]. Use
    /// [`ZipEntry::from_resource`] when the entry must survive restarts.
    pub fn new(name: impl Into<String>, source: impl ChunkSource + 'static) -> Self {
        Self {
            name: name.into(),
            source: EntrySource::Once(Mutex::new(Some(Box::new(source)))),
        }
    }

    /// Entry over a fully-buffered payload. Restartable.
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            source: EntrySource::Bytes(data.into()),
        }
    }

    /// Entry over a restartable resource stream: each archive run starts a
    /// fresh producer from the stream's factory.
    pub fn from_resource(name: impl Into<String>, resource: ResourceStream) -> Self {
        Self {
            name: name.into(),
            source: EntrySource::Resource(resource.factory()),
        }
    }

    /// The entry name as given, before deduplication.
    pub fn name(&self) -> &str {
        &self.name
    }
}

enum EntrySource {
    Bytes(Vec<u8>),
    Once(Mutex<Option<Box<dyn ChunkSource>>>),
    Resource(Arc<SourceFactory>),
}

impl EntrySource {
    fn open(&self) -> Result<Box<dyn ChunkSource>, ZipStreamError> {
        match self {
            EntrySource::Bytes(data) => Ok(Box::new(BytesSource::new(data.clone()))),
            EntrySource::Once(slot) => slot
                .lock()
                .expect("entry source lock poisoned")
                .take()
                .ok_or(ZipStreamError::SourceExhausted),
            EntrySource::Resource(factory) => Ok(factory()),
        }
    }
}

/// Per-archive configuration
#[derive(Clone, Default)]
pub struct ZipStreamOptions {
    /// Name deduplication policy, [`Deduplication::Default`] unless set
    pub deduplication: Deduplication,
    /// Compression method applied to every entry, deflate unless set
    pub compression: CompressionMethod,
}

/// Phase of the emission state machine.
///
/// `Payload` owns the entry's live source and compressor, so replacing the
/// phase releases both; a dropped encoder releases whatever entry was in
/// flight the same way.
enum Phase {
    /// Emit the local file header of entry `i` (deduplicating its name), or
    /// move on to the central directory when all entries are done
    Header(usize),
    /// Stream entry `i`'s payload; the source opens on the first pull
    Payload {
        index: usize,
        source: Option<Box<dyn ChunkSource>>,
        compressor: Compressor,
        counters: EntryCounters,
    },
    /// Emit the data descriptor recorded after entry `i`'s payload
    Descriptor { index: usize, descriptor: DataDescriptor },
    /// Emit the central-directory record for journal entry `i`
    Central(usize),
    Zip64End,
    Zip64Locator,
    End { zip64: bool },
    Done,
    /// A failure was surfaced; the stream is terminal
    Failed,
}

/// Streaming ZIP encoder; see [`zip_stream`].
pub struct ZipStreamEncoder {
    entries: Arc<Vec<ZipEntry>>,
    deduplicator: Option<Box<dyn NameDeduplicator>>,
    method: CompressionMethod,
    /// Central-directory journal, one record per entry already written
    journal: Vec<EntryRecord>,
    /// Bytes emitted so far
    position: u64,
    cd_offset: u64,
    cd_size: u64,
    eocd64_offset: u64,
    phase: Phase,
}

impl ZipStreamEncoder {
    fn new(entries: Arc<Vec<ZipEntry>>, options: &ZipStreamOptions) -> Self {
        Self {
            deduplicator: options.deduplication.instantiate(),
            method: options.compression,
            journal: Vec::with_capacity(entries.len()),
            position: 0,
            cd_offset: 0,
            cd_size: 0,
            eocd64_offset: 0,
            phase: Phase::Header(0),
            entries,
        }
    }

    fn fail(&mut self, error: ZipStreamError) -> Option<Result<Vec<u8>>> {
        self.phase = Phase::Failed;
        Some(Err(error.into()))
    }
}

#[async_trait]
impl ChunkSource for ZipStreamEncoder {
    async fn next_chunk(&mut self) -> Option<Result<Vec<u8>>> {
        loop {
            match &mut self.phase {
                Phase::Header(index) => {
                    let index = *index;
                    if index == self.entries.len() {
                        self.cd_offset = self.position;
                        self.phase = Phase::Central(0);
                        continue;
                    }

                    let entry = &self.entries[index];
                    let name = match &mut self.deduplicator {
                        Some(deduplicator) => match deduplicator.accept(&entry.name) {
                            Ok(name) => name,
                            Err(error) => {
                                return self.fail(ZipStreamError::Deduplication(error));
                            }
                        },
                        None => entry.name.clone(),
                    };
                    tracing::debug!(name = %name, offset = self.position, "zip entry start");

                    let name = name.into_bytes();
                    let flags = FLAG_DATA_DESCRIPTOR | FLAG_UTF8;
                    let header = LocalFileHeader {
                        method: self.method,
                        flags,
                        name: &name,
                    };
                    let chunk = match header.to_bytes() {
                        Ok(chunk) => chunk,
                        Err(error) => return self.fail(error),
                    };

                    self.journal.push(EntryRecord {
                        name,
                        crc32: 0,
                        compressed_size: 0,
                        uncompressed_size: 0,
                        method: self.method,
                        flags,
                        offset: self.position,
                    });
                    self.position += chunk.len() as u64;
                    self.phase = Phase::Payload {
                        index,
                        source: None,
                        compressor: Compressor::new(self.method),
                        counters: EntryCounters::new(),
                    };
                    return Some(Ok(chunk));
                }

                Phase::Payload {
                    index,
                    source,
                    compressor,
                    counters,
                } => {
                    let index = *index;
                    let active = match source {
                        Some(active) => active,
                        None => match self.entries[index].source.open() {
                            Ok(opened) => source.insert(opened),
                            Err(error) => return self.fail(error),
                        },
                    };

                    match active.next_chunk().await {
                        Some(Ok(chunk)) => {
                            let out = match compressor.process(counters, &chunk) {
                                Ok(out) => out,
                                Err(error) => return self.fail(error),
                            };
                            if out.is_empty() {
                                continue;
                            }
                            self.position += out.len() as u64;
                            return Some(Ok(out));
                        }
                        // Entry source failures pass through untranslated.
                        Some(Err(error)) => {
                            self.phase = Phase::Failed;
                            return Some(Err(error));
                        }
                        None => {
                            let tail = match compressor.finish(counters) {
                                Ok(tail) => tail,
                                Err(error) => return self.fail(error),
                            };
                            let descriptor = DataDescriptor {
                                crc32: counters.finalize_crc(),
                                compressed_size: counters.compressed_size,
                                uncompressed_size: counters.uncompressed_size,
                            };
                            if let Some(record) = self.journal.last_mut() {
                                record.crc32 = descriptor.crc32;
                                record.compressed_size = descriptor.compressed_size;
                                record.uncompressed_size = descriptor.uncompressed_size;
                            }
                            // Replacing the phase drops the entry's source.
                            self.phase = Phase::Descriptor { index, descriptor };
                            if tail.is_empty() {
                                continue;
                            }
                            self.position += tail.len() as u64;
                            return Some(Ok(tail));
                        }
                    }
                }

                Phase::Descriptor { index, descriptor } => {
                    let index = *index;
                    let chunk = descriptor.to_bytes();
                    self.position += chunk.len() as u64;
                    self.phase = Phase::Header(index + 1);
                    return Some(Ok(chunk));
                }

                Phase::Central(index) => {
                    let index = *index;
                    if index == self.journal.len() {
                        let zip64 = self.journal.len() as u64 > ZIP32_ENTRY_LIMIT
                            || self.cd_offset > ZIP32_VALUE_LIMIT
                            || self.cd_size > ZIP32_VALUE_LIMIT;
                        self.eocd64_offset = self.position;
                        self.phase = if zip64 {
                            Phase::Zip64End
                        } else {
                            Phase::End { zip64: false }
                        };
                        continue;
                    }
                    let chunk = CentralDirectoryFileHeader {
                        record: &self.journal[index],
                    }
                    .to_bytes();
                    self.position += chunk.len() as u64;
                    self.cd_size += chunk.len() as u64;
                    self.phase = Phase::Central(index + 1);
                    return Some(Ok(chunk));
                }

                Phase::Zip64End => {
                    let chunk = Zip64EndOfCentralDirectory {
                        entries: self.journal.len() as u64,
                        cd_size: self.cd_size,
                        cd_offset: self.cd_offset,
                    }
                    .to_bytes();
                    self.position += chunk.len() as u64;
                    self.phase = Phase::Zip64Locator;
                    return Some(Ok(chunk));
                }

                Phase::Zip64Locator => {
                    let chunk = Zip64EocdLocator {
                        eocd64_offset: self.eocd64_offset,
                    }
                    .to_bytes();
                    self.position += chunk.len() as u64;
                    self.phase = Phase::End { zip64: true };
                    return Some(Ok(chunk));
                }

                Phase::End { zip64 } => {
                    let chunk = EndOfCentralDirectory {
                        entries: self.journal.len() as u64,
                        cd_size: self.cd_size,
                        cd_offset: self.cd_offset,
                        zip64: *zip64,
                    }
                    .to_bytes();
                    self.position += chunk.len() as u64;
                    self.phase = Phase::Done;
                    tracing::debug!(
                        entries = self.journal.len(),
                        bytes = self.position,
                        "zip archive complete"
                    );
                    return Some(Ok(chunk));
                }

                Phase::Done | Phase::Failed => return None,
            }
        }
    }
}

/// Build a streaming archive over the given entries.
///
/// Pure construction: no entry source is pulled and no byte is produced
/// until the returned encoder is. Entries are emitted in input order, each
/// name passing through the configured deduplication policy immediately
/// before its local header.
///
/// ```
/// use zipstream::{zip_stream, ChunkSource, ZipEntry, ZipStreamOptions};
///
/// # tokio_test::block_on(async {
/// let mut archive = zip_stream(
///     vec![ZipEntry::from_bytes("hello.txt", b"hello".to_vec())],
///     ZipStreamOptions::default(),
/// );
/// while let Some(chunk) = archive.next_chunk().await {
///     let chunk = chunk?;
///     // hand the chunk to a socket, a file, a request body ...
/// }
/// # anyhow::Ok(())
/// # }).unwrap();
/// ```
pub fn zip_stream(entries: Vec<ZipEntry>, options: ZipStreamOptions) -> ZipStreamEncoder {
    ZipStreamEncoder::new(Arc::new(entries), &options)
}

/// Build a restartable archive stream.
///
/// The returned [`ResourceStream`] re-creates the encoder from the frozen
/// entry list on every iteration. A restart replays usefully only when
/// every entry is itself restartable ([`ZipEntry::from_bytes`] or
/// [`ZipEntry::from_resource`]); an entry over a one-shot source fails the
/// second run with [`ZipStreamError::SourceExhausted`].
pub fn zip_stream_resource(entries: Vec<ZipEntry>, options: ZipStreamOptions) -> ResourceStream {
    let entries = Arc::new(entries);
    ResourceStream::new(move || ZipStreamEncoder::new(Arc::clone(&entries), &options))
}
