//! Vector store trait and distance metrics.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::{EmbeddingRecord, SearchResult};
use crate::error::Result;

/// How the distance between two vectors is measured. Lower is always closer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// `1 - cosine_similarity`, in `0.0..=2.0`. A zero vector has similarity 0.
    #[default]
    Cosine,
    /// Straight-line distance.
    Euclidean,
}

impl DistanceMetric {
    /// Distance between `a` and `b`, which must have equal length.
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::Cosine => 1.0 - cosine_similarity(a, b),
            DistanceMetric::Euclidean => {
                a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt()
            }
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceMetric::Cosine => f.write_str("cosine"),
            DistanceMetric::Euclidean => f.write_str("euclidean"),
        }
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// A storage backend for [`EmbeddingRecord`]s with nearest-neighbour search.
///
/// Every record in a store has [`dimensions`](VectorStore::dimensions)
/// components, and distances are computed with the store's fixed
/// [`metric`](VectorStore::metric). Writers replace the whole searchable
/// snapshot at once, so a concurrent search sees either the old index or the
/// new one, never a mix.
///
/// # Example
///
/// ```rust,ignore
/// use chessie_rag::{DistanceMetric, InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new(384, DistanceMetric::Cosine);
/// store.rebuild(records).await?;
/// let results = store.search(&query_embedding, 5).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Replace the entire index with `records`.
    async fn rebuild(&self, records: Vec<EmbeddingRecord>) -> Result<()>;

    /// Remove every record whose source appears in `records`, then insert
    /// `records`. Other sources are untouched.
    async fn upsert_sources(&self, records: Vec<EmbeddingRecord>) -> Result<()>;

    /// The `k` records closest to `embedding`, by ascending distance.
    ///
    /// An empty index yields an empty list.
    async fn search(&self, embedding: &[f32], k: usize) -> Result<Vec<SearchResult>>;

    /// Number of records in the index.
    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Record count per source id.
    async fn source_counts(&self) -> BTreeMap<String, usize>;

    fn dimensions(&self) -> usize;

    fn metric(&self) -> DistanceMetric;

    /// Short backend name for logs and errors.
    fn name(&self) -> &str;
}
