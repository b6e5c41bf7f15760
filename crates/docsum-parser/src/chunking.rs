//! Overlapping text chunking
//!
//! Text is cut into chunks of at most `chunk_size` characters where each
//! chunk starts exactly `overlap` characters before the previous chunk
//! ended. Dropping the first `overlap` characters of every chunk after the
//! first and concatenating therefore yields the original text.
//!
//! Cut points prefer, in order: paragraph breaks, sentence ends, line
//! breaks, whitespace. Only when none of these falls in the second half of
//! the window is the text cut at exactly `chunk_size` characters.
//!
//! All sizes count Unicode scalar values, so a cut never lands inside a
//! UTF-8 sequence.

use docsum_core::{Chunk, ChunkingConfig, DocsumError, Document};
use thiserror::Error;

/// Break patterns in order of preference. A cut is placed right after the
/// pattern.
const BREAK_PATTERNS: &[&str] = &["\n\n", ". ", "! ", "? ", "。", "\n", " "];

/// Invalid chunking parameters
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    #[error("chunk_size must be greater than zero")]
    ZeroChunkSize,

    #[error("overlap ({overlap}) must be smaller than chunk_size ({chunk_size})")]
    OverlapTooLarge { chunk_size: usize, overlap: usize },
}

impl From<ChunkError> for DocsumError {
    fn from(err: ChunkError) -> Self {
        DocsumError::Config(err.to_string())
    }
}

/// Configuration for document chunking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    /// Maximum chunk size in characters
    pub chunk_size: usize,

    /// Characters shared by consecutive chunks
    pub overlap: usize,
}

impl ChunkConfig {
    /// Create a validated configuration
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkError> {
        let config = Self {
            chunk_size,
            overlap,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that chunks can always advance
    pub fn validate(&self) -> Result<(), ChunkError> {
        if self.chunk_size == 0 {
            return Err(ChunkError::ZeroChunkSize);
        }
        if self.overlap >= self.chunk_size {
            return Err(ChunkError::OverlapTooLarge {
                chunk_size: self.chunk_size,
                overlap: self.overlap,
            });
        }
        Ok(())
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        let defaults = ChunkingConfig::default();
        Self {
            chunk_size: defaults.chunk_size,
            overlap: defaults.overlap,
        }
    }
}

impl TryFrom<&ChunkingConfig> for ChunkConfig {
    type Error = ChunkError;

    fn try_from(config: &ChunkingConfig) -> Result<Self, Self::Error> {
        Self::new(config.chunk_size, config.overlap)
    }
}

/// Splits text into overlapping chunks
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    config: ChunkConfig,
}

impl Chunker {
    /// Create a chunker, rejecting configurations that cannot make progress
    pub fn new(config: ChunkConfig) -> Result<Self, ChunkError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Active configuration
    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// Lazily chunk `text`, attributing chunks to `document_id`
    pub fn chunks<'a>(&self, document_id: &'a str, text: &'a str) -> Chunks<'a> {
        Chunks::new(document_id, text, self.config)
    }

    /// Chunk a whole document
    pub fn chunk_document(&self, document: &Document) -> Vec<Chunk> {
        let chunks: Vec<Chunk> = self.chunks(&document.id, &document.text).collect();
        tracing::debug!(
            document_id = %document.id,
            chunks = chunks.len(),
            chunk_size = self.config.chunk_size,
            overlap = self.config.overlap,
            "document chunked"
        );
        chunks
    }
}

/// Iterator over the chunks of one text
///
/// Finite and single-pass; create a new one to start over.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    document_id: &'a str,
    text: &'a str,
    /// Byte offset of every char, plus `text.len()` as the final entry
    boundaries: Vec<usize>,
    config: ChunkConfig,
    start: usize,
    index: u32,
    done: bool,
}

impl<'a> Chunks<'a> {
    fn new(document_id: &'a str, text: &'a str, config: ChunkConfig) -> Self {
        let mut boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        boundaries.push(text.len());

        Self {
            document_id,
            text,
            boundaries,
            config,
            start: 0,
            index: 0,
            done: text.is_empty(),
        }
    }

    fn total_chars(&self) -> usize {
        self.boundaries.len() - 1
    }

    fn slice(&self, start: usize, end: usize) -> &'a str {
        &self.text[self.boundaries[start]..self.boundaries[end]]
    }

    /// Pick the end (exclusive, in chars) of a non-final chunk starting at `start`
    fn cut_point(&self, start: usize) -> usize {
        let target = start + self.config.chunk_size;
        // Never end at or before start + overlap, or the next chunk would not advance.
        let earliest = (start + self.config.overlap + 1).max(start + self.config.chunk_size / 2);

        let window_start = self.boundaries[start];
        let window = self.slice(start, target);

        for pattern in BREAK_PATTERNS {
            let Some(pos) = window.rfind(pattern) else {
                continue;
            };
            let byte_end = window_start + pos + pattern.len();
            if let Ok(char_end) = self.boundaries.binary_search(&byte_end) {
                if char_end >= earliest {
                    return char_end;
                }
            }
        }

        target
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.done {
            return None;
        }

        let total = self.total_chars();
        let start = self.start;
        let end = if total - start <= self.config.chunk_size {
            total
        } else {
            self.cut_point(start)
        };

        let chunk = Chunk {
            source_document_id: self.document_id.to_string(),
            text: self.slice(start, end).to_string(),
            order_index: self.index,
            start_offset: start,
            end_offset: end,
        };

        if end == total {
            self.done = true;
        } else {
            self.start = end - self.config.overlap;
        }
        self.index += 1;

        Some(chunk)
    }
}

impl std::iter::FusedIterator for Chunks<'_> {}

/// Rebuild the source text by dropping each later chunk's leading overlap
pub fn reconstruct(chunks: &[Chunk], overlap: usize) -> String {
    let mut text = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if i == 0 {
            text.push_str(&chunk.text);
        } else {
            text.extend(chunk.text.chars().skip(overlap));
        }
    }
    text
}
