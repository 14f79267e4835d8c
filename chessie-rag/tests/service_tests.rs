//! End-to-end behaviour of the question-answering service.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use chessie_model::{LlmRequest, MockLlm};
use chessie_rag::{
    ChessBuddy, Chunker, DistanceMetric, Document, FixedSizeChunker, HashingEmbeddingProvider,
    InMemoryVectorStore, Language, RagConfig, RagError, UNKNOWN_ANSWER,
};

const KING_QUEEN: &str =
    "The king moves one square in any direction. The queen moves any number of squares.";

const LOOSE: f32 = 1.0;
const STRICT: f32 = 0.5;

fn config(score_threshold: f32) -> RagConfig {
    RagConfig::builder()
        .chunk_max_chars(40)
        .chunk_overlap_chars(5)
        .top_k(2)
        .score_threshold(score_threshold)
        .generation_retries(2, 0)
        .cache_enabled(false)
        .build()
        .unwrap()
}

fn buddy(llm: &MockLlm, config: RagConfig) -> ChessBuddy {
    let dims = config.embedding.dimensions;
    ChessBuddy::builder()
        .config(config)
        .embedding_provider(Arc::new(HashingEmbeddingProvider::new(dims)))
        .vector_store(Arc::new(InMemoryVectorStore::new(dims, DistanceMetric::Cosine)))
        .llm(Arc::new(llm.clone()))
        .build()
        .unwrap()
}

fn corpus(files: &[(&str, &str)]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, text) in files {
        fs::write(dir.path().join(name), text).unwrap();
    }
    dir
}

/// The evidence block of a generation prompt, without source labels.
fn evidence_in(request: &LlmRequest) -> String {
    let prompt = &request.prompt;
    let start = prompt.find('\n').map(|i| i + 1).unwrap_or(0);
    let end = prompt.find("\n\nChild's Question").unwrap_or(prompt.len());
    prompt[start..end]
        .lines()
        .filter(|line| !line.starts_with("[Source:") && line.trim() != "---")
        .collect::<Vec<_>>()
        .join(" ")
}

/// Answers short prompts with `short`; echoes the evidence for explanations.
fn echo_llm(short: &'static str) -> MockLlm {
    MockLlm::with_handler(move |req| {
        if req.prompt.ends_with("EXPLANATION:") {
            Ok(evidence_in(req))
        } else {
            Ok(short.to_string())
        }
    })
}

async fn built(llm: &MockLlm, threshold: f32, dir: &Path) -> ChessBuddy {
    let buddy = buddy(llm, config(threshold));
    buddy.build_index(dir).await.unwrap();
    buddy
}

#[tokio::test]
async fn king_and_queen_story_is_chunked_into_overlapping_windows() {
    let dir = corpus(&[("ep1.txt", KING_QUEEN)]);
    let llm = MockLlm::new("king");
    let buddy = buddy(&llm, config(LOOSE));

    let report = buddy.build_index(dir.path()).await.unwrap();
    assert_eq!(report.document_count, 1);
    assert!(report.record_count >= 2);
    assert!(report.skipped.is_empty());

    let chunks = FixedSizeChunker::new(40, 5).unwrap().chunk(&Document::new("ep1.txt", KING_QUEEN));
    assert_eq!(chunks.len(), report.record_count);
    assert!(chunks.iter().all(|c| c.text.chars().count() <= 40));
    assert_eq!(chunks[0].start, 0);
    assert_eq!(chunks.last().unwrap().end, KING_QUEEN.chars().count());
}

#[tokio::test]
async fn king_question_retrieves_the_king_chunk_first() {
    let dir = corpus(&[("ep1.txt", KING_QUEEN)]);
    let llm = MockLlm::new("king");
    let buddy = built(&llm, LOOSE, dir.path()).await;

    let evidence = buddy.debug_retrieve("How does the king move?", 2).await.unwrap();
    assert!(!evidence.is_empty());
    assert!(evidence.len() <= 2);
    assert!(evidence[0].contains("king"));
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn off_topic_question_abstains_without_backend_call() {
    let dir = corpus(&[("ep1.txt", KING_QUEEN)]);
    let llm = MockLlm::new("Paris");
    let buddy = built(&llm, STRICT, dir.path()).await;

    assert!(buddy.debug_retrieve("What is the capital of France?", 2).await.unwrap().is_empty());
    for explain in [false, true] {
        let package = buddy.ask("What is the capital of France?", explain).await.unwrap();
        assert_eq!(package.answer, UNKNOWN_ANSWER);
        assert_eq!(package.explanation, chessie_rag::Message::Abstention.text(Language::En));
        assert!(!package.grounded);
        assert!(package.sources.is_empty());
    }
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn empty_index_abstains_without_backend_call() {
    let llm = MockLlm::new("king");
    let buddy = buddy(&llm, config(2.0));
    let package = buddy.ask("How does the king move?", true).await.unwrap();
    assert_eq!(package.answer, UNKNOWN_ANSWER);
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn short_and_explained_answers_stay_within_evidence() {
    let dir = corpus(&[("ep1.txt", KING_QUEEN)]);
    let llm = echo_llm("king");
    let buddy = built(&llm, LOOSE, dir.path()).await;

    let short = buddy.ask("How does the king move?", false).await.unwrap();
    assert_eq!(short.answer, "king");
    assert!(short.answer.chars().count() <= 20);
    assert!(short.grounded);
    assert_eq!(short.sources, vec!["ep1.txt"]);
    assert_eq!(llm.call_count(), 1);

    let explained = buddy.ask("How does the king move?", true).await.unwrap();
    assert_eq!(explained.answer, "king");
    assert!(explained.explanation.chars().count() > explained.answer.chars().count());
    assert_eq!(llm.call_count(), 3);

    let evidence = evidence_in(&llm.requests()[1]);
    for word in explained.explanation.split_whitespace() {
        assert!(evidence.contains(word), "explanation introduced {word:?}");
    }
}

#[tokio::test]
async fn explanation_introduces_no_new_names() {
    let story = "Chintu met the King on the board. The King said: I move one square at a time.";
    let dir = corpus(&[("ep2.txt", story)]);
    let llm = echo_llm("King");
    let mut config = config(LOOSE);
    config.chunk_max_chars = 200;
    config.chunk_overlap_chars = 20;
    let buddy = buddy(&llm, config);
    buddy.build_index(dir.path()).await.unwrap();

    let package = buddy.ask("Who did Chintu meet?", true).await.unwrap();
    let proper_nouns: Vec<&str> = package
        .explanation
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().next().is_some_and(char::is_uppercase))
        .collect();
    assert!(!proper_nouns.is_empty());
    for noun in proper_nouns {
        assert!(story.contains(noun), "explanation introduced {noun:?}");
    }
}

#[tokio::test]
async fn short_mode_explains_with_a_quoted_sentence() {
    let dir = corpus(&[("ep1.txt", KING_QUEEN)]);
    let llm = MockLlm::new("one square");
    let buddy = built(&llm, LOOSE, dir.path()).await;

    let package = buddy.ask("How far does the king move?", false).await.unwrap();
    assert_eq!(package.answer, "one square");
    assert!(package.explanation.contains("\"The king moves one square"));
    assert_eq!(llm.call_count(), 1);
}

#[tokio::test]
async fn adding_a_document_adds_exactly_its_chunks() {
    let dir = corpus(&[("ep1.txt", KING_QUEEN)]);
    let llm = MockLlm::new("king");
    let buddy = buddy(&llm, config(LOOSE));
    let first = buddy.build_index(dir.path()).await.unwrap();
    let before = buddy.vector_store().source_counts().await;
    let probe_before = buddy.debug_retrieve("How does the king move?", 2).await.unwrap();

    let new_story = "The knight jumps over other pieces in an L shape.";
    fs::write(dir.path().join("ep2.txt"), new_story).unwrap();
    let second = buddy.build_index(dir.path()).await.unwrap();

    let new_chunks =
        FixedSizeChunker::new(40, 5).unwrap().chunk(&Document::new("ep2.txt", new_story)).len();
    assert_eq!(second.record_count, first.record_count + new_chunks);
    let after = buddy.vector_store().source_counts().await;
    assert_eq!(after["ep1.txt"], before["ep1.txt"]);
    assert_eq!(after["ep2.txt"], new_chunks);

    let probe_after = buddy.debug_retrieve("How does the king move?", 1).await.unwrap();
    assert_eq!(probe_after[0], probe_before[0]);
}

#[tokio::test]
async fn rebuilding_an_unchanged_corpus_is_idempotent() {
    let dir = corpus(&[("ep1.txt", KING_QUEEN), ("ep2.txt", "Pawns move forward and capture diagonally.")]);
    let llm = MockLlm::new("king");
    let buddy = buddy(&llm, config(LOOSE));

    let first = buddy.build_index(dir.path()).await.unwrap();
    let probe_first = buddy.debug_retrieve("How do pawns capture?", 2).await.unwrap();
    let second = buddy.build_index(dir.path()).await.unwrap();
    let probe_second = buddy.debug_retrieve("How do pawns capture?", 2).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(probe_first, probe_second);
}

#[tokio::test]
async fn incremental_ingest_replaces_a_source() {
    let llm = MockLlm::new("king");
    let buddy = buddy(&llm, config(LOOSE));
    buddy.ingest_documents(&[Document::new("ep1.txt", KING_QUEEN)]).await.unwrap();
    buddy.ingest_documents(&[Document::new("ep2.txt", "Rooks move straight.")]).await.unwrap();
    let written =
        buddy.ingest_documents(&[Document::new("ep1.txt", "The king is small.")]).await.unwrap();

    let counts = buddy.vector_store().source_counts().await;
    assert_eq!(written, 1);
    assert_eq!(counts["ep1.txt"], 1);
    assert_eq!(counts["ep2.txt"], 1);
}

#[tokio::test]
async fn unreadable_files_are_reported_not_fatal() {
    let dir = corpus(&[("ep1.txt", KING_QUEEN)]);
    fs::write(dir.path().join("broken.txt"), [0xc3, 0x28, 0xa0, 0xa1]).unwrap();
    let llm = MockLlm::new("king");
    let buddy = buddy(&llm, config(LOOSE));

    let report = buddy.build_index(dir.path()).await.unwrap();
    assert_eq!(report.document_count, 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].source_id, "broken.txt");

    let stats = buddy.index_stats(Some(dir.path())).await.unwrap();
    assert_eq!(stats.missing_sources, vec!["broken.txt"]);
}

#[tokio::test]
async fn backend_failure_is_a_generation_error_after_retries() {
    let dir = corpus(&[("ep1.txt", KING_QUEEN)]);
    let llm = MockLlm::failing("connection refused");
    let buddy = built(&llm, LOOSE, dir.path()).await;

    let err = buddy.ask("How does the king move?", false).await.unwrap_err();
    assert!(matches!(err, RagError::GenerationError { .. }));
    assert_eq!(llm.call_count(), 3);
    assert!(err.user_message(Language::En).contains("try again"));
    assert!(!err.user_message(Language::En).contains("connection refused"));
}

#[tokio::test]
async fn file_backed_service_persists_its_index() {
    let dir = corpus(&[("ep1.txt", KING_QUEEN)]);
    let index_dir = tempfile::tempdir().unwrap();
    let mut config = config(LOOSE);
    config.index.path = index_dir.path().join("index.json");

    let buddy = ChessBuddy::init(config.clone()).await.unwrap();
    let report = buddy.build_index(dir.path()).await.unwrap();
    buddy.shutdown();

    let reopened = ChessBuddy::init(config.clone()).await.unwrap();
    let stats = reopened.index_stats(None).await.unwrap();
    assert_eq!(stats.record_count, report.record_count);
    assert_eq!(stats.metric, DistanceMetric::Cosine);

    config.embedding.dimensions = 128;
    assert!(matches!(ChessBuddy::init(config.clone()).await, Err(RagError::ConfigError(_))));
    let rebuilt = ChessBuddy::init_for_rebuild(config).await.unwrap();
    assert_eq!(rebuilt.build_index(dir.path()).await.unwrap().record_count, report.record_count);
}
