//! In-memory vector store.
//!
//! This module provides [`InMemoryVectorStore`], a brute-force store whose
//! records live in an immutable `IndexSnapshot` behind a
//! `tokio::sync::RwLock<Arc<_>>`. Writers build a complete new snapshot and
//! swap the `Arc`; readers clone the `Arc` and search without holding the lock.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::document::{EmbeddingRecord, SearchResult};
use crate::error::{RagError, Result};
use crate::vectorstore::{DistanceMetric, VectorStore};

/// An immutable set of records with a fixed dimensionality and metric.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct IndexSnapshot {
    pub(crate) dimensions: usize,
    pub(crate) metric: DistanceMetric,
    pub(crate) records: Vec<EmbeddingRecord>,
}

impl IndexSnapshot {
    pub(crate) fn empty(dimensions: usize, metric: DistanceMetric) -> Self {
        Self { dimensions, metric, records: Vec::new() }
    }

    /// A snapshot holding `records`, which must all have the snapshot's width.
    pub(crate) fn with_records(
        dimensions: usize,
        metric: DistanceMetric,
        records: Vec<EmbeddingRecord>,
        backend: &str,
    ) -> Result<Self> {
        if let Some(bad) = records.iter().find(|r| r.embedding.len() != dimensions) {
            return Err(RagError::VectorStoreError {
                backend: backend.to_string(),
                message: format!(
                    "record '{}' has {} dimensions, index expects {dimensions}",
                    bad.id,
                    bad.embedding.len()
                ),
            });
        }
        Ok(Self { dimensions, metric, records })
    }

    /// A copy of this snapshot with every source in `records` replaced.
    pub(crate) fn with_sources_replaced(
        &self,
        records: Vec<EmbeddingRecord>,
        backend: &str,
    ) -> Result<Self> {
        let replaced: HashSet<&str> = records.iter().map(|r| r.chunk.source_id.as_str()).collect();
        let mut merged: Vec<EmbeddingRecord> = self
            .records
            .iter()
            .filter(|r| !replaced.contains(r.chunk.source_id.as_str()))
            .cloned()
            .collect();
        merged.extend(records);
        Self::with_records(self.dimensions, self.metric, merged, backend)
    }

    pub(crate) fn search(
        &self,
        embedding: &[f32],
        k: usize,
        backend: &str,
    ) -> Result<Vec<SearchResult>> {
        if self.records.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if embedding.len() != self.dimensions {
            return Err(RagError::VectorStoreError {
                backend: backend.to_string(),
                message: format!(
                    "query has {} dimensions, index expects {}",
                    embedding.len(),
                    self.dimensions
                ),
            });
        }

        let mut scored: Vec<SearchResult> = self
            .records
            .iter()
            .map(|record| SearchResult {
                distance: self.metric.distance(&record.embedding, embedding),
                record: record.clone(),
            })
            .collect();

        // Ties keep insertion order, so results are deterministic.
        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        scored.truncate(k);
        Ok(scored)
    }

    pub(crate) fn source_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            *counts.entry(record.chunk.source_id.clone()).or_insert(0) += 1;
        }
        counts
    }
}

/// A non-persistent [`VectorStore`] for tests, demos and small corpora.
///
/// # Example
///
/// ```rust,ignore
/// use chessie_rag::{DistanceMetric, InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new(384, DistanceMetric::Cosine);
/// store.rebuild(records).await?;
/// ```
#[derive(Debug)]
pub struct InMemoryVectorStore {
    dimensions: usize,
    metric: DistanceMetric,
    snapshot: RwLock<Arc<IndexSnapshot>>,
    /// Serialises writers so concurrent upserts cannot drop each other's records.
    write_lock: Mutex<()>,
}

impl InMemoryVectorStore {
    /// Create an empty store.
    pub fn new(dimensions: usize, metric: DistanceMetric) -> Self {
        Self {
            dimensions,
            metric,
            snapshot: RwLock::new(Arc::new(IndexSnapshot::empty(dimensions, metric))),
            write_lock: Mutex::new(()),
        }
    }

    async fn current(&self) -> Arc<IndexSnapshot> {
        self.snapshot.read().await.clone()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn rebuild(&self, records: Vec<EmbeddingRecord>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let next = IndexSnapshot::with_records(self.dimensions, self.metric, records, "inmemory")?;
        debug!(backend = "inmemory", records = next.records.len(), "index rebuilt");
        *self.snapshot.write().await = Arc::new(next);
        Ok(())
    }

    async fn upsert_sources(&self, records: Vec<EmbeddingRecord>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let next = self.current().await.with_sources_replaced(records, "inmemory")?;
        debug!(backend = "inmemory", records = next.records.len(), "sources upserted");
        *self.snapshot.write().await = Arc::new(next);
        Ok(())
    }

    async fn search(&self, embedding: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        self.current().await.search(embedding, k, "inmemory")
    }

    async fn len(&self) -> usize {
        self.current().await.records.len()
    }

    async fn source_counts(&self) -> BTreeMap<String, usize> {
        self.current().await.source_counts()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn name(&self) -> &str {
        "inmemory"
    }
}
