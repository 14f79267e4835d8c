//! Document chunking.
//!
//! This module provides the [`Chunker`] trait and [`FixedSizeChunker`], a
//! sliding character window that prefers to cut at paragraph, sentence, or
//! word boundaries near the hard cutoff.

use crate::document::{Chunk, Document};
use crate::error::{RagError, Result};

/// A strategy for splitting documents into chunks.
///
/// Chunks never span documents and are returned in document order.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has empty text.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// Characters that end a sentence when followed by whitespace.
const SENTENCE_ENDS: &[char] = &['.', '!', '?', '।'];

/// Splits text into windows of at most `max_chars` characters, each starting
/// `overlap_chars` before the previous window's end.
///
/// When a window would end mid-text, the last `boundary_lookback` characters
/// of the window are searched for a paragraph break, then a sentence end, then
/// any whitespace, and the window is cut just after the best match. Without a
/// match the window is cut at `max_chars`.
///
/// Offsets are counted in `char`s, so multi-byte scripts such as Devanagari
/// are never split inside a character.
///
/// # Example
///
/// ```rust
/// use chessie_rag::{Chunker, Document, FixedSizeChunker};
///
/// let chunker = FixedSizeChunker::new(40, 5).unwrap();
/// let doc = Document::new("ep1.txt", "The king moves one square in any direction. The queen moves any number of squares.");
/// let chunks = chunker.chunk(&doc);
/// assert!(chunks.len() >= 2);
/// assert!(chunks.iter().all(|c| c.text.chars().count() <= 40));
/// ```
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    max_chars: usize,
    overlap_chars: usize,
    boundary_lookback: usize,
}

impl FixedSizeChunker {
    /// Create a chunker with the default lookback of a quarter window.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `overlap_chars >= max_chars`.
    pub fn new(max_chars: usize, overlap_chars: usize) -> Result<Self> {
        Self::with_lookback(max_chars, overlap_chars, max_chars / 4)
    }

    /// Create a chunker with an explicit boundary lookback.
    ///
    /// The lookback is clamped to `max_chars - overlap_chars - 1` so that
    /// every window advances by at least one character.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `overlap_chars >= max_chars`.
    pub fn with_lookback(
        max_chars: usize,
        overlap_chars: usize,
        boundary_lookback: usize,
    ) -> Result<Self> {
        if overlap_chars >= max_chars {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap_chars ({overlap_chars}) must be less than chunk_max_chars ({max_chars})"
            )));
        }
        let boundary_lookback = boundary_lookback.min(max_chars - overlap_chars - 1);
        Ok(Self { max_chars, overlap_chars, boundary_lookback })
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    pub fn overlap_chars(&self) -> usize {
        self.overlap_chars
    }

    /// Pick the cut position for a window ending at `hard_end`.
    ///
    /// Candidates lie in `hard_end - boundary_lookback..=hard_end`; a cut `c`
    /// means the window ends just before `chars[c]`.
    fn find_cut(&self, chars: &[char], hard_end: usize) -> usize {
        let lo = hard_end - self.boundary_lookback;
        let candidates = || (lo.max(1)..=hard_end).rev();

        let paragraph =
            candidates().find(|&c| c >= 2 && chars[c - 1] == '\n' && chars[c - 2] == '\n');
        if let Some(cut) = paragraph {
            return cut;
        }

        let sentence = candidates().find(|&c| {
            c >= 2 && chars[c - 1].is_whitespace() && SENTENCE_ENDS.contains(&chars[c - 2])
        });
        if let Some(cut) = sentence {
            return cut;
        }

        candidates().find(|&c| chars[c - 1].is_whitespace()).unwrap_or(hard_end)
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        if document.text.is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = document.text.chars().collect();
        let len = chars.len();
        let mut chunks = Vec::new();
        let mut start = 0;
        let mut chunk_index = 0;

        loop {
            let hard_end = (start + self.max_chars).min(len);
            let end = if hard_end == len { len } else { self.find_cut(&chars, hard_end) };

            chunks.push(Chunk {
                text: chars[start..end].iter().collect(),
                source_id: document.source_id.clone(),
                chunk_index,
                start,
                end,
            });

            if end == len {
                break;
            }
            chunk_index += 1;
            start = end - self.overlap_chars;
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KING_QUEEN: &str =
        "The king moves one square in any direction. The queen moves any number of squares.";

    fn doc(text: &str) -> Document {
        Document::new("ep1.txt", text)
    }

    #[test]
    fn rejects_overlap_not_smaller_than_window() {
        assert!(matches!(FixedSizeChunker::new(10, 10), Err(RagError::ConfigError(_))));
        assert!(FixedSizeChunker::new(10, 11).is_err());
    }

    #[test]
    fn empty_document_has_no_chunks() {
        let chunker = FixedSizeChunker::new(40, 5).unwrap();
        assert!(chunker.chunk(&doc("")).is_empty());
    }

    #[test]
    fn short_document_is_a_single_chunk() {
        let chunker = FixedSizeChunker::new(40, 5).unwrap();
        let chunks = chunker.chunk(&doc("Pawns move forward."));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Pawns move forward.");
        assert_eq!((chunks[0].start, chunks[0].end), (0, 19));
    }

    #[test]
    fn king_and_queen_story_is_split_with_overlap() {
        let chunker = FixedSizeChunker::new(40, 5).unwrap();
        let chunks = chunker.chunk(&doc(KING_QUEEN));

        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 40, "chunk too long: {:?}", chunk.text);
        }
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end - pair[1].start, 5);
            assert_eq!(pair[1].chunk_index, pair[0].chunk_index + 1);
        }
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks.last().unwrap().end, KING_QUEEN.chars().count());
        assert!(chunks[0].text.contains("king"));
    }

    #[test]
    fn prefers_word_boundaries_over_hard_cuts() {
        let chunker = FixedSizeChunker::new(40, 5).unwrap();
        let chunks = chunker.chunk(&doc(KING_QUEEN));
        // No chunk but the last ends in the middle of a word.
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(chunk.text.ends_with(char::is_whitespace), "cut mid-word: {:?}", chunk.text);
        }
    }

    #[test]
    fn prefers_sentence_end_over_plain_whitespace() {
        let text = "Rooks move in straight lines. Bishops move diagonally across the board.";
        let chunker = FixedSizeChunker::with_lookback(40, 0, 15).unwrap();
        let chunks = chunker.chunk(&doc(text));
        assert_eq!(chunks[0].text, "Rooks move in straight lines. ");
    }

    #[test]
    fn prefers_paragraph_breaks() {
        let text = "Chintu met the King.\n\nThe King said hello to everyone there.";
        let chunker = FixedSizeChunker::with_lookback(30, 0, 20).unwrap();
        let chunks = chunker.chunk(&doc(text));
        assert_eq!(chunks[0].text, "Chintu met the King.\n\n");
    }

    #[test]
    fn text_without_breaks_is_cut_hard() {
        let text = "a".repeat(25);
        let chunker = FixedSizeChunker::new(10, 2).unwrap();
        let chunks = chunker.chunk(&doc(&text));
        let lens: Vec<usize> = chunks.iter().map(|c| c.text.len()).collect();
        assert_eq!(lens, vec![10, 10, 9]);
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        let text = "राजा सिर्फ एक कदम चलता है। रानी कहीं भी जा सकती है।";
        let chunker = FixedSizeChunker::new(12, 3).unwrap();
        let chunks = chunker.chunk(&doc(text));
        let chars: Vec<char> = text.chars().collect();
        for chunk in &chunks {
            let expected: String = chars[chunk.start..chunk.end].iter().collect();
            assert_eq!(chunk.text, expected);
        }
    }

    #[test]
    fn lookback_is_clamped_to_guarantee_progress() {
        let chunker = FixedSizeChunker::with_lookback(5, 4, 100).unwrap();
        let chunks = chunker.chunk(&doc("a b c d e f g h"));
        assert!(chunks.windows(2).all(|w| w[1].start > w[0].start));
        assert_eq!(chunks.last().unwrap().end, 15);
    }
}
