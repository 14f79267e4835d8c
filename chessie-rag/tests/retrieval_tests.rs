//! Retrieval properties: threshold and top-k monotonicity, and diagnostics.

use std::sync::Arc;

use chessie_rag::document::{Chunk, EmbeddingRecord};
use chessie_rag::embedding::EmbeddingProvider;
use chessie_rag::hashing::HashingEmbeddingProvider;
use chessie_rag::inmemory::InMemoryVectorStore;
use chessie_rag::retriever::Retriever;
use chessie_rag::vectorstore::{DistanceMetric, VectorStore};
use chessie_telemetry::{CapturedEvents, EventCaptureLayer};
use proptest::prelude::*;
use tracing_subscriber::layer::SubscriberExt;

const DIM: usize = 64;

const WORDS: &[&str] = &[
    "king", "queen", "pawn", "rook", "bishop", "knight", "moves", "square", "board", "castle",
    "chintu", "minku", "diagonal", "forward", "capture",
];

fn arb_sentence() -> impl Strategy<Value = String> {
    proptest::collection::vec(proptest::sample::select(WORDS), 1..8).prop_map(|w| w.join(" "))
}

async fn retriever_over(texts: &[String]) -> Retriever {
    let embedder = Arc::new(HashingEmbeddingProvider::new(DIM));
    let store = Arc::new(InMemoryVectorStore::new(DIM, DistanceMetric::Cosine));
    let mut records = Vec::new();
    for (i, text) in texts.iter().enumerate() {
        let chunk = Chunk {
            text: text.clone(),
            source_id: format!("ep{i}.txt"),
            chunk_index: 0,
            start: 0,
            end: text.chars().count(),
        };
        records.push(EmbeddingRecord::new(chunk, embedder.embed(text).await.unwrap()));
    }
    store.rebuild(records).await.unwrap();
    Retriever::new(embedder, store).unwrap()
}

/// For a fixed query, lowering the threshold SHALL never grow the evidence
/// set, and raising `top_k` SHALL never shrink it.
mod prop_threshold_monotonicity {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn evidence_size_is_monotonic(
            texts in proptest::collection::vec(arb_sentence(), 0..12),
            query in arb_sentence(),
            low in 0.0f32..2.0,
            delta in 0.0f32..1.0,
            k in 1usize..6,
            extra_k in 0usize..6,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (strict, loose, small, large) = rt.block_on(async {
                let retriever = retriever_over(&texts).await;
                let strict = retriever.retrieve(&query, k, low).await.unwrap();
                let loose = retriever.retrieve(&query, k, low + delta).await.unwrap();
                let small = retriever.retrieve(&query, k, low).await.unwrap();
                let large = retriever.retrieve(&query, k + extra_k, low).await.unwrap();
                (strict, loose, small, large)
            });

            prop_assert!(strict.len() <= loose.len());
            prop_assert!(small.len() <= large.len());
            prop_assert!(large.len() <= k + extra_k);
            for evidence in strict.iter() {
                prop_assert!(evidence.distance <= low);
            }
            for pair in loose.iter().collect::<Vec<_>>().windows(2) {
                prop_assert!(pair[0].distance <= pair[1].distance);
            }
        }
    }
}

#[tokio::test]
async fn every_candidate_is_logged_with_its_score() {
    let storage = CapturedEvents::new();
    let subscriber = tracing_subscriber::registry().with(EventCaptureLayer::new(storage.clone()));
    let _guard = tracing::subscriber::set_default(subscriber);

    let retriever = retriever_over(&[
        "the king moves one square".to_string(),
        "the queen moves far".to_string(),
        "pawn capture diagonal".to_string(),
    ])
    .await;
    let (evidence, trace) = retriever.retrieve_with_trace("king moves", 3, 0.9).await.unwrap();

    let candidates = storage.with_message("retrieval candidate");
    assert_eq!(candidates.len(), 3);
    assert_eq!(trace.candidates.len(), 3);
    for (event, candidate) in candidates.iter().zip(&trace.candidates) {
        assert_eq!(event.level, "DEBUG");
        assert_eq!(event.field_str("source_id"), Some(candidate.source_id.as_str()));
        assert_eq!(event.fields["kept"], serde_json::Value::Bool(candidate.kept));
    }

    let summary = storage.with_message("retrieval completed");
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].level, "INFO");
    assert_eq!(summary[0].fields["kept"], serde_json::json!(evidence.len()));
}
