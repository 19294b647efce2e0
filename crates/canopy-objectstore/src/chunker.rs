//! Payload chunking for streaming transfer
//!
//! Splits object payloads into bounded-size chunks and reassembles them in
//! arrival order. Chunking is zero-copy: every chunk is a slice of the source
//! buffer.

use crate::{ObjectStoreError, Result, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
use bytes::{Bytes, BytesMut};

/// Configuration for the chunker
#[derive(Clone, Debug)]
pub struct ChunkerConfig {
    /// Size of each chunk in bytes
    pub chunk_size: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl ChunkerConfig {
    /// Create with a custom chunk size
    pub fn with_chunk_size(chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
            return Err(ObjectStoreError::Configuration(format!(
                "chunk size must be between 1 and {} bytes",
                MAX_CHUNK_SIZE
            )));
        }
        Ok(Self { chunk_size })
    }
}

/// Chunker for splitting payloads into transfer chunks
#[derive(Clone, Debug, Default)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    /// Create a new chunker with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom configuration
    pub fn with_config(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Create a chunker for `chunk_size`, rejecting a zero size
    pub fn with_chunk_size(chunk_size: usize) -> Result<Self> {
        ChunkerConfig::with_chunk_size(chunk_size).map(Self::with_config)
    }

    /// Lazily split `payload` into chunks.
    ///
    /// Every chunk holds exactly `chunk_size` bytes except the last one, which
    /// holds the remainder. An empty payload yields no chunks.
    pub fn split(&self, payload: Bytes) -> Chunks {
        Chunks {
            remaining: payload,
            chunk_size: self.config.chunk_size,
        }
    }

    /// Reassemble chunks back into a payload, in iteration order
    pub fn reassemble<I>(&self, chunks: I) -> Bytes
    where
        I: IntoIterator<Item = Bytes>,
    {
        let mut reassembler = Reassembler::new();
        for chunk in chunks {
            reassembler.push(&chunk);
        }
        reassembler.finish()
    }

    /// Get the chunk size
    pub fn chunk_size(&self) -> usize {
        self.config.chunk_size
    }
}

/// Forward-only iterator over the chunks of a payload
#[derive(Clone, Debug)]
pub struct Chunks {
    remaining: Bytes,
    chunk_size: usize,
}

impl Iterator for Chunks {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        if self.remaining.is_empty() {
            return None;
        }
        let take = self.chunk_size.min(self.remaining.len());
        Some(self.remaining.split_to(take))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let count = calculate_chunk_count(self.remaining.len() as u64, self.chunk_size);
        (count, Some(count))
    }
}

impl ExactSizeIterator for Chunks {}

/// Incremental accumulation buffer for received chunks
#[derive(Debug, Default)]
pub struct Reassembler {
    buffer: BytesMut,
    chunks_received: usize,
}

impl Reassembler {
    /// Create an empty reassembler
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk at the end of the payload
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        self.chunks_received += 1;
    }

    /// Bytes accumulated so far
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if no bytes were accumulated
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Number of chunks pushed so far
    pub fn chunks_received(&self) -> usize {
        self.chunks_received
    }

    /// Take the full payload
    pub fn finish(self) -> Bytes {
        self.buffer.freeze()
    }
}

/// Calculate how many chunks will be needed for a given size
pub fn calculate_chunk_count(size: u64, chunk_size: usize) -> usize {
    if size == 0 {
        return 0;
    }
    (size as usize).div_ceil(chunk_size)
}

/// Calculate the size of the last chunk
pub fn last_chunk_size(total_size: u64, chunk_size: usize) -> usize {
    if total_size == 0 {
        return 0;
    }
    let remainder = (total_size as usize) % chunk_size;
    if remainder == 0 {
        chunk_size
    } else {
        remainder
    }
}
