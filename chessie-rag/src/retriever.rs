//! Query-time retrieval: embed, search, filter by distance, rank.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::document::{Evidence, EvidenceSet};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

/// One search candidate and whether it made it into the evidence set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateScore {
    pub source_id: String,
    pub chunk_index: usize,
    pub distance: f32,
    /// `false` if the candidate was over the threshold or past `top_k`.
    pub kept: bool,
}

/// Diagnostics for one retrieval: every candidate the store returned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalTrace {
    pub query: String,
    pub top_k: usize,
    pub score_threshold: f32,
    /// Candidates by ascending distance.
    pub candidates: Vec<CandidateScore>,
}

/// Turns a question into ranked evidence.
///
/// Fetches `top_k * overfetch_factor` candidates from the store, drops those
/// with `distance > score_threshold`, and keeps at most `top_k`. An empty
/// index yields an empty [`EvidenceSet`].
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    overfetch_factor: usize,
}

impl Retriever {
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the embedder and the store
    /// disagree on dimensionality.
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>) -> Result<Self> {
        if embedder.dimensions() != store.dimensions() {
            return Err(RagError::ConfigError(format!(
                "embedder '{}' produces {} dimensions but the index holds {}",
                embedder.name(),
                embedder.dimensions(),
                store.dimensions()
            )));
        }
        Ok(Self { embedder, store, overfetch_factor: 1 })
    }

    /// Fetch `factor` times as many candidates as will be kept.
    pub fn with_overfetch_factor(mut self, factor: usize) -> Self {
        self.overfetch_factor = factor.max(1);
        self
    }

    /// Ranked evidence for `query`.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        score_threshold: f32,
    ) -> Result<EvidenceSet> {
        let (evidence, _) = self.retrieve_with_trace(query, top_k, score_threshold).await?;
        Ok(evidence)
    }

    /// Ranked evidence for `query` plus the scores of every candidate.
    pub async fn retrieve_with_trace(
        &self,
        query: &str,
        top_k: usize,
        score_threshold: f32,
    ) -> Result<(EvidenceSet, RetrievalTrace)> {
        let embedding = self.embedder.embed(query).await.map_err(|e| {
            error!(provider = self.embedder.name(), error = %e, "query embedding failed");
            e
        })?;

        let fetch = top_k.saturating_mul(self.overfetch_factor);
        let results = self.store.search(&embedding, fetch).await.map_err(|e| {
            error!(backend = self.store.name(), error = %e, "vector search failed");
            e
        })?;

        let mut kept = Vec::new();
        let mut candidates = Vec::with_capacity(results.len());
        for result in results {
            let chunk = result.record.chunk;
            let keep = result.distance <= score_threshold && kept.len() < top_k;
            debug!(
                source_id = %chunk.source_id,
                chunk_index = chunk.chunk_index,
                distance = result.distance,
                kept = keep,
                "retrieval candidate"
            );
            candidates.push(CandidateScore {
                source_id: chunk.source_id.clone(),
                chunk_index: chunk.chunk_index,
                distance: result.distance,
                kept: keep,
            });
            if keep {
                kept.push(Evidence {
                    text: chunk.text,
                    source_id: chunk.source_id,
                    chunk_index: chunk.chunk_index,
                    distance: result.distance,
                });
            }
        }

        let evidence = EvidenceSet::new(kept);
        info!(
            candidates = candidates.len(),
            kept = evidence.len(),
            top_k,
            score_threshold,
            best_distance = candidates.first().map(|c| c.distance),
            "retrieval completed"
        );

        let trace =
            RetrievalTrace { query: query.to_string(), top_k, score_threshold, candidates };
        Ok((evidence, trace))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Chunk, EmbeddingRecord};
    use crate::hashing::HashingEmbeddingProvider;
    use crate::inmemory::InMemoryVectorStore;
    use crate::vectorstore::DistanceMetric;

    async fn retriever_over(texts: &[(&str, &str)]) -> Retriever {
        let embedder = Arc::new(HashingEmbeddingProvider::new(384));
        let store = Arc::new(InMemoryVectorStore::new(384, DistanceMetric::Cosine));
        let mut records = Vec::new();
        for (i, (source, text)) in texts.iter().enumerate() {
            let chunk = Chunk {
                text: text.to_string(),
                source_id: source.to_string(),
                chunk_index: i,
                start: 0,
                end: text.chars().count(),
            };
            records.push(EmbeddingRecord::new(chunk, embedder.embed(text).await.unwrap()));
        }
        store.rebuild(records).await.unwrap();
        Retriever::new(embedder, store).unwrap()
    }

    #[tokio::test]
    async fn most_similar_chunk_ranks_first() {
        let retriever = retriever_over(&[
            ("ep1.txt", "The king moves one square in any direction."),
            ("ep2.txt", "Pawns capture diagonally forward."),
        ])
        .await;
        let evidence = retriever.retrieve("How does the king move?", 2, 1.0).await.unwrap();
        assert!(evidence.iter().next().unwrap().text.contains("king"));
    }

    #[tokio::test]
    async fn threshold_filters_everything_out() {
        let retriever = retriever_over(&[("ep1.txt", "The king moves one square.")]).await;
        let (evidence, trace) =
            retriever.retrieve_with_trace("capital of France", 5, 0.0).await.unwrap();
        assert!(evidence.is_empty());
        assert_eq!(trace.candidates.len(), 1);
        assert!(!trace.candidates[0].kept);
    }

    #[tokio::test]
    async fn top_k_caps_the_evidence() {
        let retriever = retriever_over(&[
            ("a.txt", "knight jumps"),
            ("b.txt", "knight jumps over"),
            ("c.txt", "knight jumps over pieces"),
        ])
        .await;
        let evidence = retriever.retrieve("knight jumps", 2, 2.0).await.unwrap();
        assert_eq!(evidence.len(), 2);
    }

    #[tokio::test]
    async fn overfetch_records_extra_candidates() {
        let retriever = retriever_over(&[
            ("a.txt", "knight jumps"),
            ("b.txt", "knight jumps over"),
            ("c.txt", "knight jumps over pieces"),
        ])
        .await
        .with_overfetch_factor(3);
        let (evidence, trace) = retriever.retrieve_with_trace("knight", 1, 2.0).await.unwrap();
        assert_eq!(evidence.len(), 1);
        assert_eq!(trace.candidates.len(), 3);
        assert_eq!(trace.candidates.iter().filter(|c| c.kept).count(), 1);
    }

    #[tokio::test]
    async fn empty_index_yields_empty_evidence() {
        let retriever = retriever_over(&[]).await;
        assert!(retriever.retrieve("anything", 5, 2.0).await.unwrap().is_empty());
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let embedder = Arc::new(HashingEmbeddingProvider::new(16));
        let store = Arc::new(InMemoryVectorStore::new(32, DistanceMetric::Cosine));
        assert!(matches!(Retriever::new(embedder, store), Err(RagError::ConfigError(_))));
    }
}
