//! Document chunking strategies.
//!
//! This module provides the [`Chunker`] trait and two implementations:
//!
//! - [`FixedSizeChunker`] — splits by character count with configurable overlap
//! - [`RecursiveChunker`] — splits hierarchically by paragraphs, lines,
//!   sentences, clauses, then words, merging pieces up to the size budget
//!
//! Sizes are measured in characters (Unicode scalar values), so a chunk
//! boundary never falls inside a multi-byte character.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::config::{ChunkingStrategy, RetrievalConfig};
use crate::document::Document;

/// A passage produced by a [`Chunker`], before embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Zero-based position of the passage within its document.
    pub ordinal: usize,
    /// The passage text.
    pub text: String,
}

/// A strategy for splitting documents into passages.
///
/// Implementations must be deterministic: the same document and
/// configuration always yield the same passages, which keeps re-upserts
/// idempotent.
pub trait Chunker: Send + Sync {
    /// Split a document's text into ordered passages.
    ///
    /// Returns an empty `Vec` if the text is empty or whitespace-only.
    /// Whitespace-only passages are never emitted, and ordinals are
    /// contiguous from zero.
    fn chunk(&self, document: &Document) -> Vec<TextChunk>;
}

/// Build the chunker selected by the configuration.
pub fn chunker_for(config: &RetrievalConfig) -> Arc<dyn Chunker> {
    match config.chunking {
        ChunkingStrategy::Fixed => {
            Arc::new(FixedSizeChunker::new(config.chunk_size, config.chunk_overlap))
        }
        ChunkingStrategy::Recursive => {
            Arc::new(RecursiveChunker::new(config.chunk_size, config.chunk_overlap))
        }
    }
}

/// Number the non-blank passages.
fn number(passages: impl IntoIterator<Item = String>) -> Vec<TextChunk> {
    passages
        .into_iter()
        .filter(|text| !text.trim().is_empty())
        .enumerate()
        .map(|(ordinal, text)| TextChunk { ordinal, text })
        .collect()
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Splits text into fixed-size chunks by character count with configurable overlap.
///
/// # Example
///
/// ```rust
/// use retrieval_core::{Chunker, Document, FixedSizeChunker};
///
/// let chunker = FixedSizeChunker::new(10, 2);
/// let chunks = chunker.chunk(&Document::new("abcdefghijklmnopqrst", Default::default()));
/// assert_eq!(chunks[0].text, "abcdefghij");
/// assert_eq!(chunks[1].text, "ijklmnopqr");
/// ```
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size` — maximum number of characters per chunk
    /// * `chunk_overlap` — number of overlapping characters between consecutive chunks
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { chunk_size, chunk_overlap }
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, document: &Document) -> Vec<TextChunk> {
        if document.text.trim().is_empty() {
            return Vec::new();
        }
        number(split_by_size(&document.text, self.chunk_size, self.chunk_overlap))
    }
}

/// Sliding character window. The window advances by
/// `chunk_size - chunk_overlap` (at least one character) and stops once it
/// reaches the end of the text.
fn split_by_size(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    let step = chunk_size.saturating_sub(chunk_overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }

    chunks
}

/// Splits text hierarchically: paragraphs → lines → sentences → clauses → words.
///
/// Text is split at the coarsest separator first. Pieces that still exceed
/// `chunk_size` are split with the next separator, and pieces with no usable
/// separator fall back to a fixed character window. The resulting pieces are
/// merged greedily up to `chunk_size`; each new chunk starts with the trailing
/// whole pieces of the previous one, up to `chunk_overlap` characters.
///
/// # Example
///
/// ```rust
/// use retrieval_core::{Chunker, Document, RecursiveChunker};
///
/// let chunker = RecursiveChunker::new(512, 100);
/// let chunks = chunker.chunk(&Document::new("A cat sat. A dog ran.", Default::default()));
/// assert_eq!(chunks.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveChunker {
    const SEPARATORS: [&'static str; 8] = ["\n\n", "\n", ". ", "! ", "? ", "; ", ", ", " "];

    /// Create a new `RecursiveChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size` — maximum number of characters per chunk
    /// * `chunk_overlap` — maximum number of characters carried over between consecutive chunks
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { chunk_size, chunk_overlap }
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, document: &Document) -> Vec<TextChunk> {
        if document.text.trim().is_empty() || self.chunk_size == 0 {
            return Vec::new();
        }

        let pieces = split_to_pieces(&document.text, self.chunk_size, &Self::SEPARATORS);
        let merged = merge_pieces(pieces, self.chunk_size, self.chunk_overlap);
        number(merged.into_iter().map(|text| text.trim().to_string()))
    }
}

/// Split text into pieces no longer than `chunk_size`, trying each separator
/// in turn.
fn split_to_pieces(text: &str, chunk_size: usize, separators: &[&str]) -> Vec<String> {
    if char_len(text) <= chunk_size {
        return vec![text.to_string()];
    }

    let Some((separator, remaining)) = separators.split_first() else {
        return split_by_size(text, chunk_size, 0);
    };

    let segments = split_keeping_separator(text, separator);
    if segments.len() <= 1 {
        return split_to_pieces(text, chunk_size, remaining);
    }

    segments
        .into_iter()
        .flat_map(|segment| split_to_pieces(segment, chunk_size, remaining))
        .collect()
}

/// Split text at a separator while keeping the separator attached to the preceding segment.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let mut result = Vec::new();
    let mut start = 0;

    while let Some(pos) = text[start..].find(separator) {
        let end = start + pos + separator.len();
        result.push(&text[start..end]);
        start = end;
    }

    if start < text.len() {
        result.push(&text[start..]);
    }

    result
}

/// Greedily merge pieces (each at most `chunk_size` characters) into chunks,
/// carrying up to `chunk_overlap` characters of trailing pieces forward.
fn merge_pieces(pieces: Vec<String>, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut window: VecDeque<(String, usize)> = VecDeque::new();
    let mut window_len = 0;

    for piece in pieces {
        let len = char_len(&piece);
        if window_len + len > chunk_size && !window.is_empty() {
            chunks.push(window.iter().map(|(text, _)| text.as_str()).collect::<String>());
            // Keep only a tail that fits the overlap budget and leaves room for `piece`.
            while window_len > chunk_overlap || window_len + len > chunk_size {
                match window.pop_front() {
                    Some((_, dropped)) => window_len -= dropped,
                    None => break,
                }
            }
        }
        window_len += len;
        window.push_back((piece, len));
    }

    if !window.is_empty() {
        chunks.push(window.iter().map(|(text, _)| text.as_str()).collect::<String>());
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        Document::new(text, Default::default()).with_id("doc")
    }

    #[test]
    fn empty_and_whitespace_text_yield_no_chunks() {
        for text in ["", "   ", "\n\n\t "] {
            assert!(FixedSizeChunker::new(10, 2).chunk(&doc(text)).is_empty());
            assert!(RecursiveChunker::new(10, 2).chunk(&doc(text)).is_empty());
        }
    }

    #[test]
    fn fixed_chunker_overlaps_and_stops_at_end() {
        let chunks = FixedSizeChunker::new(4, 2).chunk(&doc("abcdefgh"));
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, ["abcd", "cdef", "efgh"]);
        let ordinals: Vec<usize> = chunks.iter().map(|c| c.ordinal).collect();
        assert_eq!(ordinals, [0, 1, 2]);
    }

    #[test]
    fn fixed_chunker_respects_char_boundaries() {
        let chunks = FixedSizeChunker::new(3, 0).chunk(&doc("héllo wörld"));
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 3));
        let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(joined, "héllo wörld");
    }

    #[test]
    fn recursive_chunker_keeps_short_text_whole() {
        let chunks = RecursiveChunker::new(512, 100).chunk(&doc("A cat sat. A dog ran."));
        assert_eq!(chunks, vec![TextChunk { ordinal: 0, text: "A cat sat. A dog ran.".into() }]);
    }

    #[test]
    fn recursive_chunker_splits_on_paragraphs_first() {
        let text = "First paragraph here.\n\nSecond paragraph here.";
        let chunks = RecursiveChunker::new(25, 0).chunk(&doc(text));
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, ["First paragraph here.", "Second paragraph here."]);
    }

    #[test]
    fn recursive_chunker_carries_overlap() {
        let text = "one two three four five six seven eight";
        let chunks = RecursiveChunker::new(15, 6).chunk(&doc(text));
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let last_word = pair[0].text.split(' ').next_back().unwrap();
            assert!(pair[1].text.starts_with(last_word), "{pair:?}");
        }
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 15));
    }

    #[test]
    fn recursive_chunker_falls_back_to_window_for_long_words() {
        let text = "x".repeat(25);
        let chunks = RecursiveChunker::new(10, 0).chunk(&doc(&text));
        let lens: Vec<usize> = chunks.iter().map(|c| c.text.len()).collect();
        assert_eq!(lens, [10, 10, 5]);
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = "Lorem ipsum dolor sit amet. ".repeat(40);
        let chunker = RecursiveChunker::new(64, 16);
        assert_eq!(chunker.chunk(&doc(&text)), chunker.chunk(&doc(&text)));
    }
}
