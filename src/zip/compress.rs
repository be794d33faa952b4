//! Per-entry payload processing: CRC-32, size counters, and incremental
//! raw-deflate compression.

use crc32fast::Hasher;
use flate2::{Compress, Compression, FlushCompress, Status};

use crate::error::ZipStreamError;
use super::structures::CompressionMethod;

/// Running counters for the entry currently being streamed.
///
/// CRC and the uncompressed size advance with every input chunk; the
/// compressed size advances with every output fragment. The final values go
/// into the data descriptor and the central-directory journal.
#[derive(Default)]
pub(crate) struct EntryCounters {
    crc: Hasher,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
}

impl EntryCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finish the CRC computation; counters are read directly afterwards.
    pub fn finalize_crc(&mut self) -> u32 {
        std::mem::take(&mut self.crc).finalize()
    }
}

/// Payload processor for one entry, selected by the archive's compression
/// method.
///
/// `process` consumes one input chunk and returns the bytes to emit (which
/// may be empty while the deflater buffers); `finish` flushes whatever the
/// deflater still holds. Both update the entry's counters as a side effect.
pub(crate) enum Compressor {
    Stored,
    Deflate(Box<Compress>),
}

impl Compressor {
    pub fn new(method: CompressionMethod) -> Self {
        match method {
            CompressionMethod::Stored => Compressor::Stored,
            // Raw deflate: ZIP payloads carry no zlib header or checksum.
            CompressionMethod::Deflate => {
                Compressor::Deflate(Box::new(Compress::new(Compression::new(5), false)))
            }
        }
    }

    pub fn process(
        &mut self,
        counters: &mut EntryCounters,
        chunk: &[u8],
    ) -> Result<Vec<u8>, ZipStreamError> {
        counters.crc.update(chunk);
        counters.uncompressed_size += chunk.len() as u64;

        match self {
            Compressor::Stored => {
                counters.compressed_size += chunk.len() as u64;
                Ok(chunk.to_vec())
            }
            Compressor::Deflate(compress) => {
                let mut out = Vec::with_capacity(chunk.len() / 2 + 64);
                let mut input = chunk;
                while !input.is_empty() {
                    let consumed_before = compress.total_in();
                    compress.compress_vec(input, &mut out, FlushCompress::None)?;
                    let consumed = (compress.total_in() - consumed_before) as usize;
                    input = &input[consumed..];
                    if !input.is_empty() {
                        out.reserve(input.len() / 2 + 64);
                    }
                }
                counters.compressed_size += out.len() as u64;
                Ok(out)
            }
        }
    }

    /// Flush the compressor state after the last input chunk.
    pub fn finish(&mut self, counters: &mut EntryCounters) -> Result<Vec<u8>, ZipStreamError> {
        match self {
            Compressor::Stored => Ok(Vec::new()),
            Compressor::Deflate(compress) => {
                let mut out = Vec::with_capacity(64);
                loop {
                    let status = compress.compress_vec(&[], &mut out, FlushCompress::Finish)?;
                    match status {
                        Status::StreamEnd => break,
                        // Output buffer filled before the tail completed.
                        Status::Ok | Status::BufError => out.reserve(128),
                    }
                }
                counters.compressed_size += out.len() as u64;
                Ok(out)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::DeflateDecoder;

    use super::*;

    #[test]
    fn stored_passes_bytes_through_and_counts() {
        let mut counters = EntryCounters::new();
        let mut compressor = Compressor::new(CompressionMethod::Stored);
        let out = compressor.process(&mut counters, b"hi").unwrap();
        assert_eq!(out, b"hi");
        assert!(compressor.finish(&mut counters).unwrap().is_empty());
        assert_eq!(counters.uncompressed_size, 2);
        assert_eq!(counters.compressed_size, 2);
        assert_eq!(counters.finalize_crc(), crc32fast::hash(b"hi"));
    }

    #[test]
    fn deflate_round_trips_across_chunks() {
        let mut counters = EntryCounters::new();
        let mut compressor = Compressor::new(CompressionMethod::Deflate);

        let mut compressed = Vec::new();
        for chunk in [&b"hello "[..], &b"streaming "[..], &b"world"[..]] {
            compressed.extend(compressor.process(&mut counters, chunk).unwrap());
        }
        compressed.extend(compressor.finish(&mut counters).unwrap());

        assert_eq!(counters.uncompressed_size, 21);
        assert_eq!(counters.compressed_size, compressed.len() as u64);

        let mut inflated = Vec::new();
        DeflateDecoder::new(&compressed[..])
            .read_to_end(&mut inflated)
            .unwrap();
        assert_eq!(inflated, b"hello streaming world");
    }

    #[test]
    fn deflate_of_empty_payload_still_produces_a_tail() {
        let mut counters = EntryCounters::new();
        let mut compressor = Compressor::new(CompressionMethod::Deflate);
        let tail = compressor.finish(&mut counters).unwrap();
        assert!(!tail.is_empty());

        let mut inflated = Vec::new();
        DeflateDecoder::new(&tail[..])
            .read_to_end(&mut inflated)
            .unwrap();
        assert!(inflated.is_empty());
    }

    #[test]
    fn empty_chunks_pass_through_without_effect() {
        let mut counters = EntryCounters::new();
        let mut compressor = Compressor::new(CompressionMethod::Stored);
        let out = compressor.process(&mut counters, b"").unwrap();
        assert!(out.is_empty());
        assert_eq!(counters.uncompressed_size, 0);
    }
}
