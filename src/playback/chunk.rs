//! Audio chunk moved between pipeline stages.

use std::ops::Deref;

/// An immutable, non-empty run of raw PCM bytes.
///
/// Produced by the reader with whatever a single source read returned, so
/// the final chunk of a stream may be shorter than the buffer size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    data: Box<[u8]>,
}

impl AudioChunk {
    /// Wrap bytes in a chunk. Returns `None` for empty input.
    pub fn new(data: impl Into<Box<[u8]>>) -> Option<Self> {
        let data = data.into();
        if data.is_empty() {
            None
        } else {
            Some(Self { data })
        }
    }

    /// Copy a slice into a new chunk. Returns `None` for empty input.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        Self::new(bytes.to_vec())
    }

    /// Chunk contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume the chunk, returning the bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data.into_vec()
    }
}

impl Deref for AudioChunk {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl AsRef<[u8]> for AudioChunk {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}
