//! # chessie-rag
//!
//! Retrieval-and-grounding pipeline for answering children's questions
//! about a fixed corpus of chess stories.
//!
//! ## Overview
//!
//! Offline, stories are split by a [`Chunker`], embedded by an
//! [`EmbeddingProvider`] and stored in a [`VectorStore`]. At query time the
//! [`Retriever`] embeds the question and keeps the nearest chunks within a
//! distance threshold, and the [`GroundedGenerator`] answers from that
//! evidence alone, or abstains when there is none.
//!
//! - [`ChessBuddy`] - the service tying everything together
//! - [`FixedSizeChunker`] - character windows cut at sentence boundaries
//! - [`HashingEmbeddingProvider`] - deterministic embeddings for tests and
//!   offline use
//! - [`InMemoryVectorStore`] / [`FileVectorStore`] - brute-force stores
//!
//! ## Features
//!
//! - `openai` (default): [`OpenAIEmbeddingProvider`] for OpenAI-compatible
//!   embedding endpoints
//! - `fastembed`: `FastEmbedProvider`, local sentence-transformer models run
//!   through ONNX Runtime
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use chessie_rag::{ChessBuddy, RagConfig};
//!
//! let config = RagConfig::from_file("chessie.toml")?.with_env_overrides()?;
//! let buddy = ChessBuddy::init(config).await?;
//! buddy.build_index("data/stories").await?;
//!
//! let reply = buddy.ask("How does the king move?", true).await?;
//! println!("{}\n\n{}", reply.answer, reply.explanation);
//! ```

pub mod cache;
pub mod chunking;
pub mod config;
pub mod corpus;
pub mod document;
pub mod embedding;
pub mod error;
#[cfg(feature = "fastembed")]
pub mod fastembed_embedder;
pub mod filestore;
pub mod generator;
pub mod hashing;
pub mod inmemory;
pub mod messages;
#[cfg(feature = "openai")]
pub mod openai;
pub mod prompt;
pub mod retriever;
pub mod rewrite;
pub mod service;
pub mod vectorstore;

pub use cache::TtlCache;
pub use chunking::{Chunker, FixedSizeChunker};
pub use config::{
    CacheConfig, EmbeddingBackend, EmbeddingConfig, IndexConfig, LlmConfig, RagConfig,
    RagConfigBuilder,
};
pub use corpus::{LoadedCorpus, SkippedSource, load_corpus};
pub use document::{AnswerPackage, Chunk, Document, EmbeddingRecord, Evidence, EvidenceSet, SearchResult};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
#[cfg(feature = "fastembed")]
pub use fastembed_embedder::FastEmbedProvider;
pub use filestore::FileVectorStore;
pub use generator::{GeneratorSettings, GroundedGenerator};
pub use hashing::HashingEmbeddingProvider;
pub use inmemory::InMemoryVectorStore;
pub use messages::{Language, Message, UNKNOWN_ANSWER};
#[cfg(feature = "openai")]
pub use openai::OpenAIEmbeddingProvider;
pub use prompt::{GenerationMode, build_prompt};
pub use retriever::{CandidateScore, RetrievalTrace, Retriever};
pub use rewrite::QueryRewriter;
pub use service::{BuildReport, ChessBuddy, ChessBuddyBuilder, IndexStats};
pub use vectorstore::{DistanceMetric, VectorStore};
