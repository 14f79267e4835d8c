//! Property tests for vector store search ordering and source replacement.

use std::collections::HashSet;

use chessie_rag::document::{Chunk, EmbeddingRecord};
use chessie_rag::filestore::FileVectorStore;
use chessie_rag::inmemory::InMemoryVectorStore;
use chessie_rag::vectorstore::{DistanceMetric, VectorStore};
use proptest::prelude::*;

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map(
        "non-zero embedding",
        |mut v| {
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm < 1e-8 {
                return None;
            }
            for val in &mut v {
                *val /= norm;
            }
            Some(v)
        },
    )
}

/// Generate a record with a normalized embedding.
fn arb_record(dim: usize) -> impl Strategy<Value = EmbeddingRecord> {
    ("[a-e]", 0usize..4, "[a-z ]{5,30}", arb_normalized_embedding(dim)).prop_map(
        |(source, chunk_index, text, embedding)| {
            let chunk = Chunk {
                end: text.chars().count(),
                text,
                source_id: format!("{source}.txt"),
                chunk_index,
                start: 0,
            };
            EmbeddingRecord::new(chunk, embedding)
        },
    )
}

fn arb_metric() -> impl Strategy<Value = DistanceMetric> {
    prop_oneof![Just(DistanceMetric::Cosine), Just(DistanceMetric::Euclidean)]
}

/// Searching SHALL return at most `k` results, ordered by ascending distance,
/// and every returned distance SHALL match the store's metric.
mod prop_search_ordering {
    use super::*;

    const DIM: usize = 16;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_ascending_and_bounded_by_k(
            records in proptest::collection::vec(arb_record(DIM), 1..20),
            query in arb_normalized_embedding(DIM),
            k in 1usize..25,
            metric in arb_metric(),
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (results, count) = rt.block_on(async {
                let store = InMemoryVectorStore::new(DIM, metric);
                let count = records.len();
                store.rebuild(records).await.unwrap();
                (store.search(&query, k).await.unwrap(), count)
            });

            prop_assert!(results.len() <= k);
            prop_assert_eq!(results.len(), k.min(count));

            for window in results.windows(2) {
                prop_assert!(
                    window[0].distance <= window[1].distance,
                    "results not in ascending order: {} > {}",
                    window[0].distance,
                    window[1].distance,
                );
            }
            for result in &results {
                let expected = metric.distance(&result.record.embedding, &query);
                prop_assert!((result.distance - expected).abs() < 1e-5);
            }
        }
    }
}

/// Upserting a batch SHALL leave exactly the batch's records for its sources
/// and SHALL NOT touch any other source.
mod prop_upsert_sources {
    use super::*;

    const DIM: usize = 8;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn upsert_replaces_only_batch_sources(
            initial in proptest::collection::vec(arb_record(DIM), 0..15),
            batch in proptest::collection::vec(arb_record(DIM), 1..6),
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let counts = rt.block_on(async {
                let store = InMemoryVectorStore::new(DIM, DistanceMetric::Cosine);
                store.rebuild(initial.clone()).await.unwrap();
                store.upsert_sources(batch.clone()).await.unwrap();
                store.source_counts().await
            });

            let batch_sources: HashSet<&str> =
                batch.iter().map(|r| r.chunk.source_id.as_str()).collect();
            for source in &batch_sources {
                let expected = batch.iter().filter(|r| r.chunk.source_id == *source).count();
                prop_assert_eq!(counts.get(*source).copied(), Some(expected));
            }
            for record in &initial {
                let source = record.chunk.source_id.as_str();
                if !batch_sources.contains(source) {
                    let expected = initial.iter().filter(|r| r.chunk.source_id == source).count();
                    prop_assert_eq!(counts.get(source).copied(), Some(expected));
                }
            }
        }
    }
}

#[tokio::test]
async fn file_store_search_matches_in_memory_after_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.json");
    let records: Vec<EmbeddingRecord> = (0..6)
        .map(|i| {
            let angle = i as f32 * 0.4;
            let chunk = Chunk {
                text: format!("chunk {i}"),
                source_id: format!("ep{}.txt", i % 2),
                chunk_index: i,
                start: 0,
                end: 7,
            };
            EmbeddingRecord::new(chunk, vec![angle.cos(), angle.sin()])
        })
        .collect();

    let memory = InMemoryVectorStore::new(2, DistanceMetric::Cosine);
    memory.rebuild(records.clone()).await.unwrap();
    let file = FileVectorStore::open(&path, 2, DistanceMetric::Cosine).await.unwrap();
    file.rebuild(records).await.unwrap();
    drop(file);

    let reopened = FileVectorStore::open(&path, 2, DistanceMetric::Cosine).await.unwrap();
    let query = [1.0, 0.1];
    let a: Vec<String> =
        memory.search(&query, 4).await.unwrap().into_iter().map(|r| r.record.id).collect();
    let b: Vec<String> =
        reopened.search(&query, 4).await.unwrap().into_iter().map(|r| r.record.id).collect();
    assert_eq!(a, b);
}
