//! Data types for documents, chunks, index records, and evidence.

use serde::{Deserialize, Serialize};

/// A source story loaded from the corpus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Stable identifier, the file name relative to the corpus root.
    pub source_id: String,
    /// The full text of the document.
    pub text: String,
}

impl Document {
    pub fn new(source_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { source_id: source_id.into(), text: text.into() }
    }
}

/// A contiguous window of a [`Document`]'s text.
///
/// `start` and `end` are offsets in characters (not bytes) into the owning
/// document, so `text` equals the document's characters `start..end`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// The text content of the chunk.
    pub text: String,
    /// The [`Document::source_id`] this chunk was cut from.
    pub source_id: String,
    /// Position of the chunk within its document, starting at zero.
    pub chunk_index: usize,
    /// First character offset (inclusive).
    pub start: usize,
    /// Last character offset (exclusive).
    pub end: usize,
}

impl Chunk {
    /// Identifier of the record that stores this chunk.
    pub fn record_id(&self) -> String {
        format!("{}#{}", self.source_id, self.chunk_index)
    }
}

/// A [`Chunk`] with its embedding, as stored in the vector index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingRecord {
    /// Unique record identifier, `{source_id}#{chunk_index}`.
    pub id: String,
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

impl EmbeddingRecord {
    pub fn new(chunk: Chunk, embedding: Vec<f32>) -> Self {
        Self { id: chunk.record_id(), chunk, embedding }
    }
}

/// A record returned by a vector search, with its distance to the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub record: EmbeddingRecord,
    /// Distance to the query vector (lower is more similar).
    pub distance: f32,
}

/// One retrieved chunk that passed the distance threshold.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Evidence {
    pub text: String,
    pub source_id: String,
    pub chunk_index: usize,
    pub distance: f32,
}

/// The ranked evidence for one query: ascending distance, every entry within
/// the threshold. May be empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EvidenceSet {
    items: Vec<Evidence>,
}

impl EvidenceSet {
    /// Build an evidence set, sorting `items` by ascending distance.
    pub fn new(mut items: Vec<Evidence>) -> Self {
        items.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Self { items }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Evidence> {
        self.items.iter()
    }

    /// Evidence texts in rank order.
    pub fn texts(&self) -> Vec<String> {
        self.items.iter().map(|e| e.text.clone()).collect()
    }

    /// Distinct source ids in rank order of first appearance.
    pub fn sources(&self) -> Vec<String> {
        let mut sources: Vec<String> = Vec::new();
        for item in &self.items {
            if !sources.contains(&item.source_id) {
                sources.push(item.source_id.clone());
            }
        }
        sources
    }
}

impl<'a> IntoIterator for &'a EvidenceSet {
    type Item = &'a Evidence;
    type IntoIter = std::slice::Iter<'a, Evidence>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// The response to one question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerPackage {
    /// Short answer; never empty. [`UNKNOWN_ANSWER`](crate::UNKNOWN_ANSWER)
    /// when no grounded answer exists.
    pub answer: String,
    /// Grounded explanation or the reason no answer was given.
    pub explanation: String,
    /// `false` for abstentions and unverified answers.
    pub grounded: bool,
    /// Source ids of the evidence the answer was generated from.
    pub sources: Vec<String>,
}
