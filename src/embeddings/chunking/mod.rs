#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Result;
use crate::config::ConfigError;

/// A contiguous window of one document's text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Identity of the document this chunk was cut from
    pub source: String,
    /// The chunk text
    pub text: String,
    /// Position of this chunk within the document, starting at 0
    pub chunk_index: usize,
    /// Character offset (inclusive) of the first character in the document
    pub start_offset: usize,
    /// Character offset (exclusive) one past the last character in the document
    pub end_offset: usize,
}

impl Chunk {
    /// Stable identifier derived from the source and the chunk position
    #[inline]
    pub fn id(&self) -> String {
        chunk_id(&self.source, self.chunk_index)
    }

    /// Number of characters covered by this chunk
    #[inline]
    pub fn char_len(&self) -> usize {
        self.end_offset - self.start_offset
    }
}

#[inline]
pub fn chunk_id(source: &str, chunk_index: usize) -> String {
    format!("{source}#{chunk_index}")
}

/// Sliding-window parameters, measured in characters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Window size
    pub chunk_size: usize,
    /// Characters shared by two consecutive windows
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 500,
            overlap: 50,
        }
    }
}

impl ChunkingConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_window(self.chunk_size, self.overlap)
    }

    /// Distance between the starts of two consecutive chunks
    #[inline]
    pub fn stride(&self) -> usize {
        self.chunk_size.saturating_sub(self.overlap)
    }
}

fn validate_window(chunk_size: usize, overlap: usize) -> Result<(), ConfigError> {
    if chunk_size == 0 {
        return Err(ConfigError::InvalidChunkSize(chunk_size));
    }
    if overlap >= chunk_size {
        return Err(ConfigError::OverlapTooLarge {
            overlap,
            chunk_size,
        });
    }
    Ok(())
}

/// Split `text` into overlapping windows of `chunk_size` characters.
///
/// Each window starts `chunk_size - overlap` characters after the previous
/// one; the final window is cut short at the end of the text. Empty text
/// yields no chunks.
#[inline]
pub fn split(text: &str, source: &str, chunk_size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    validate_window(chunk_size, overlap)?;

    if text.is_empty() {
        return Ok(Vec::new());
    }

    // Byte position of every char, plus the end of the text, so that windows
    // are cut on char boundaries.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(byte_index, _)| byte_index)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = boundaries.len() - 1;
    let stride = chunk_size - overlap;

    let mut chunks = Vec::with_capacity(expected_chunk_count(char_count, chunk_size, overlap));
    let mut start = 0;

    loop {
        let end = (start + chunk_size).min(char_count);
        let window = text
            .get(boundaries[start]..boundaries[end])
            .unwrap_or_default();

        chunks.push(Chunk {
            source: source.to_string(),
            text: window.to_string(),
            chunk_index: chunks.len(),
            start_offset: start,
            end_offset: end,
        });

        if end == char_count {
            break;
        }
        start += stride;
    }

    debug!(
        "Split '{}' ({} chars) into {} chunks (size {}, overlap {})",
        source,
        char_count,
        chunks.len(),
        chunk_size,
        overlap
    );

    Ok(chunks)
}

/// Split with the window taken from a [`ChunkingConfig`]
#[inline]
pub fn split_with(text: &str, source: &str, config: &ChunkingConfig) -> Result<Vec<Chunk>> {
    split(text, source, config.chunk_size, config.overlap)
}

/// Number of chunks [`split`] produces for a text of `char_count` characters
#[inline]
pub fn expected_chunk_count(char_count: usize, chunk_size: usize, overlap: usize) -> usize {
    if char_count == 0 {
        return 0;
    }
    if char_count <= overlap || chunk_size <= overlap {
        return 1;
    }
    (char_count - overlap).div_ceil(chunk_size - overlap)
}
