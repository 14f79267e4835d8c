//! The question-answering service.
//!
//! [`ChessBuddy`] owns the shared, read-mostly state of the system (chunker,
//! embedder, vector store, generation backend and caches) behind `Arc`s and
//! exposes the operations callers use: asking questions, inspecting
//! retrieval, and building or extending the index.
//!
//! # Example
//!
//! ```rust,ignore
//! use chessie_rag::{ChessBuddy, RagConfig};
//!
//! let buddy = ChessBuddy::init(RagConfig::default()).await?;
//! let reply = buddy.ask("How does the king move?", false).await?;
//! println!("{}: {}", reply.answer, reply.explanation);
//! buddy.shutdown();
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chessie_model::{Llm, OpenAIClient, OpenAIConfig};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::cache::{TtlCache, answer_key};
use crate::chunking::{Chunker, FixedSizeChunker};
use crate::config::{EmbeddingBackend, RagConfig};
use crate::corpus::{SkippedSource, corpus_source_ids, load_corpus};
use crate::document::{AnswerPackage, Chunk, Document, EmbeddingRecord, EvidenceSet};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::filestore::FileVectorStore;
use crate::generator::{GeneratorSettings, GroundedGenerator};
use crate::hashing::HashingEmbeddingProvider;
use crate::prompt::GenerationMode;
use crate::retriever::{RetrievalTrace, Retriever};
use crate::rewrite::QueryRewriter;
use crate::vectorstore::{DistanceMetric, VectorStore};

/// Outcome of a full index build.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuildReport {
    /// Records in the index after the build.
    pub record_count: usize,
    /// Documents that were chunked and embedded.
    pub document_count: usize,
    /// Corpus files that could not be loaded.
    pub skipped: Vec<SkippedSource>,
}

/// A summary of the current index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexStats {
    pub record_count: usize,
    pub dimensions: usize,
    pub metric: DistanceMetric,
    /// Records per source id.
    pub source_counts: BTreeMap<String, usize>,
    /// Corpus files with no records in the index. Empty unless a corpus
    /// directory was given.
    pub missing_sources: Vec<String>,
}

/// Grounded question answering over the story corpus.
pub struct ChessBuddy {
    config: RagConfig,
    chunker: Arc<dyn Chunker>,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    retriever: Retriever,
    generator: GroundedGenerator,
    rewriter: Option<QueryRewriter>,
    answers: Option<TtlCache<AnswerPackage>>,
    /// Bumped after every index write; answers computed across a bump are
    /// not cached.
    index_epoch: AtomicU64,
}

impl ChessBuddy {
    /// Create a new [`ChessBuddyBuilder`].
    pub fn builder() -> ChessBuddyBuilder {
        ChessBuddyBuilder::default()
    }

    /// Start the service from configuration, opening the index file at
    /// `config.index.path`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] for invalid configuration or an
    /// index built with different dimensions or metric.
    pub async fn init(config: RagConfig) -> Result<Self> {
        config.validate()?;
        let store = FileVectorStore::open(
            &config.index.path,
            config.embedding.dimensions,
            config.index.metric,
        )
        .await?;
        Self::from_config(config, Arc::new(store))
    }

    /// Like [`init`](Self::init), but starts from an empty index that
    /// replaces the existing file on the next build. Use this to rebuild
    /// after changing the embedding dimensions or the metric.
    pub async fn init_for_rebuild(config: RagConfig) -> Result<Self> {
        config.validate()?;
        let store = FileVectorStore::create(
            &config.index.path,
            config.embedding.dimensions,
            config.index.metric,
        );
        Self::from_config(config, Arc::new(store))
    }

    fn from_config(config: RagConfig, store: Arc<dyn VectorStore>) -> Result<Self> {
        let embedder = embedder_from_config(&config)?;
        let llm = llm_from_config(&config)?;
        Self::builder()
            .config(config)
            .embedding_provider(embedder)
            .vector_store(store)
            .llm(llm)
            .build()
    }

    /// Release the service. In-flight queries holding clones of the shared
    /// handles finish normally.
    pub fn shutdown(self) {
        if let Some(answers) = &self.answers {
            answers.clear();
        }
        info!("chess buddy shut down");
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Answer a question: a short answer, plus a model-written explanation
    /// when `explain` is set.
    ///
    /// A question with no evidence in the index gets the abstention package
    /// without any backend call, including the query rewrite.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::GenerationError`] if the backend fails after all
    /// retries, or embedding/store errors from retrieval.
    pub async fn ask(&self, question: &str, explain: bool) -> Result<AnswerPackage> {
        let question = question.trim();
        if question.is_empty() {
            return Ok(GroundedGenerator::abstention(self.config.language));
        }
        let mode = if explain { GenerationMode::Explain } else { GenerationMode::Short };

        let key = answer_key(question, mode);
        if let Some(hit) = self.answers.as_ref().and_then(|c| c.get(&key)) {
            info!(mode = mode.as_str(), "answer served from cache");
            return Ok(hit);
        }

        let epoch = self.index_epoch.load(Ordering::Acquire);
        let evidence = self.retrieve_evidence(question, self.config.top_k).await?;

        let package = self.generator.answer(question, &evidence, mode).await.map_err(|e| {
            error!(error = %e, "question could not be answered");
            e
        })?;

        if let Some(answers) = &self.answers {
            if self.index_epoch.load(Ordering::Acquire) == epoch {
                answers.insert(key, package.clone());
            } else {
                debug!("index changed during the question, answer not cached");
            }
        }
        Ok(package)
    }

    /// The evidence texts `ask` would use for `question`, keeping at most
    /// `top_k`. With query rewriting on, this may call the backend.
    pub async fn debug_retrieve(&self, question: &str, top_k: usize) -> Result<Vec<String>> {
        let evidence = self.retrieve_evidence(question.trim(), top_k).await?;
        Ok(evidence.texts())
    }

    /// Retrieve with the question as asked; only when that finds evidence is
    /// the rewritten question tried, and its evidence kept if non-empty.
    async fn retrieve_evidence(&self, question: &str, top_k: usize) -> Result<EvidenceSet> {
        let threshold = self.config.score_threshold;
        let evidence = self.retriever.retrieve(question, top_k, threshold).await?;
        let Some(rewriter) = &self.rewriter else {
            return Ok(evidence);
        };
        if evidence.is_empty() {
            return Ok(evidence);
        }

        let rewritten = rewriter.rewrite(question).await;
        if rewritten == question {
            return Ok(evidence);
        }
        let refined = self.retriever.retrieve(&rewritten, top_k, threshold).await?;
        if refined.is_empty() {
            Ok(evidence)
        } else {
            Ok(refined)
        }
    }

    /// Scores of every retrieval candidate for `question`.
    pub async fn retrieval_trace(&self, question: &str, top_k: usize) -> Result<RetrievalTrace> {
        let (_, trace) = self
            .retriever
            .retrieve_with_trace(question.trim(), top_k, self.config.score_threshold)
            .await?;
        Ok(trace)
    }

    /// Rebuild the whole index from the stories under `corpus_dir`.
    ///
    /// Unreadable files are skipped and reported. Running it twice on an
    /// unchanged corpus yields the same index.
    pub async fn build_index(&self, corpus_dir: impl AsRef<Path>) -> Result<BuildReport> {
        let corpus_dir = corpus_dir.as_ref().to_path_buf();
        let corpus = tokio::task::spawn_blocking(move || load_corpus(corpus_dir))
            .await
            .map_err(|e| RagError::PipelineError(format!("corpus loading task failed: {e}")))??;
        let records = self.embed_documents(&corpus.documents).await?;
        let record_count = records.len();

        self.store.rebuild(records).await.map_err(|e| {
            error!(backend = self.store.name(), error = %e, "index rebuild failed");
            e
        })?;
        self.index_changed();

        for skipped in &corpus.skipped {
            warn!(source_id = %skipped.source_id, reason = %skipped.reason, "not indexed");
        }
        info!(
            records = record_count,
            documents = corpus.documents.len(),
            skipped = corpus.skipped.len(),
            "index built"
        );
        Ok(BuildReport {
            record_count,
            document_count: corpus.documents.len(),
            skipped: corpus.skipped,
        })
    }

    /// Add or replace documents by source id without touching other sources.
    ///
    /// Returns the number of records written.
    pub async fn ingest_documents(&self, documents: &[Document]) -> Result<usize> {
        let records = self.embed_documents(documents).await?;
        let count = records.len();
        self.store.upsert_sources(records).await.map_err(|e| {
            error!(backend = self.store.name(), error = %e, "ingestion failed");
            e
        })?;
        self.index_changed();
        info!(documents = documents.len(), records = count, "documents ingested");
        Ok(count)
    }

    /// Record counts of the index and, given the corpus directory, the
    /// corpus files it is missing.
    pub async fn index_stats(&self, corpus_dir: Option<&Path>) -> Result<IndexStats> {
        let source_counts = self.store.source_counts().await;
        let missing_sources = match corpus_dir {
            Some(dir) => corpus_source_ids(dir)?
                .into_iter()
                .filter(|id| !source_counts.contains_key(id))
                .collect(),
            None => Vec::new(),
        };
        Ok(IndexStats {
            record_count: self.store.len().await,
            dimensions: self.store.dimensions(),
            metric: self.store.metric(),
            source_counts,
            missing_sources,
        })
    }

    /// Chunk and embed `documents`, in order.
    async fn embed_documents(&self, documents: &[Document]) -> Result<Vec<EmbeddingRecord>> {
        let chunks: Vec<Chunk> = documents.iter().flat_map(|d| self.chunker.chunk(d)).collect();
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await.map_err(|e| {
            error!(provider = self.embedder.name(), error = %e, "embedding failed during indexing");
            RagError::PipelineError(format!("embedding failed during indexing: {e}"))
        })?;
        if embeddings.len() != chunks.len() {
            return Err(RagError::PipelineError(format!(
                "embedder returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        Ok(chunks.into_iter().zip(embeddings).map(|(c, e)| EmbeddingRecord::new(c, e)).collect())
    }

    fn index_changed(&self) {
        self.index_epoch.fetch_add(1, Ordering::AcqRel);
        if let Some(answers) = &self.answers {
            answers.clear();
        }
    }
}

fn embedder_from_config(config: &RagConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.embedding.provider {
        EmbeddingBackend::Hashing => {
            Ok(Arc::new(HashingEmbeddingProvider::new(config.embedding.dimensions)))
        }
        #[cfg(feature = "openai")]
        EmbeddingBackend::OpenAI => Ok(Arc::new(
            crate::openai::OpenAIEmbeddingProvider::from_config(&config.embedding)?,
        )),
        #[cfg(not(feature = "openai"))]
        EmbeddingBackend::OpenAI => Err(RagError::ConfigError(
            "the openai embedding provider requires the `openai` feature".to_string(),
        )),
        #[cfg(feature = "fastembed")]
        EmbeddingBackend::FastEmbed => Ok(Arc::new(
            crate::fastembed_embedder::FastEmbedProvider::from_config(&config.embedding)?,
        )),
        #[cfg(not(feature = "fastembed"))]
        EmbeddingBackend::FastEmbed => Err(RagError::ConfigError(
            "the fastembed embedding provider requires the `fastembed` feature".to_string(),
        )),
    }
}

fn llm_from_config(config: &RagConfig) -> Result<Arc<dyn Llm>> {
    let api_key = std::env::var(&config.llm.api_key_env).unwrap_or_default();
    if api_key.is_empty() {
        warn!(env = %config.llm.api_key_env, "no API key set for the generation backend");
    }
    let client_config =
        OpenAIConfig::compatible(api_key, &config.llm.base_url, &config.llm.model)
            .with_timeout(Duration::from_secs(config.generation_timeout_secs));
    let client = OpenAIClient::new(client_config)
        .map_err(|e| RagError::ConfigError(format!("invalid generation backend: {e}")))?;
    Ok(Arc::new(client))
}

/// Builder for a [`ChessBuddy`] with explicit components.
///
/// The embedding provider, vector store and LLM are required; the chunker
/// defaults to a [`FixedSizeChunker`] built from the configuration.
///
/// # Example
///
/// ```rust,ignore
/// let buddy = ChessBuddy::builder()
///     .config(config)
///     .embedding_provider(Arc::new(HashingEmbeddingProvider::new(384)))
///     .vector_store(Arc::new(InMemoryVectorStore::new(384, DistanceMetric::Cosine)))
///     .llm(Arc::new(MockLlm::new("King")))
///     .build()?;
/// ```
#[derive(Default)]
pub struct ChessBuddyBuilder {
    config: Option<RagConfig>,
    chunker: Option<Arc<dyn Chunker>>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    llm: Option<Arc<dyn Llm>>,
}

impl ChessBuddyBuilder {
    /// Set the configuration. Defaults to [`RagConfig::default`].
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Override the chunker built from the configuration.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Set the generation backend.
    pub fn llm(mut self, llm: Arc<dyn Llm>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required component is missing,
    /// the configuration is invalid, or the embedder and store disagree on
    /// dimensionality.
    pub fn build(self) -> Result<ChessBuddy> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let embedder = self.embedding_provider.ok_or_else(|| {
            RagError::ConfigError("embedding_provider is required".to_string())
        })?;
        let store = self
            .vector_store
            .ok_or_else(|| RagError::ConfigError("vector_store is required".to_string()))?;
        let llm = self.llm.ok_or_else(|| RagError::ConfigError("llm is required".to_string()))?;

        let chunker: Arc<dyn Chunker> = match self.chunker {
            Some(chunker) => chunker,
            None => {
                let lookback =
                    config.chunk_boundary_lookback.unwrap_or(config.chunk_max_chars / 4);
                Arc::new(FixedSizeChunker::with_lookback(
                    config.chunk_max_chars,
                    config.chunk_overlap_chars,
                    lookback,
                )?)
            }
        };

        let retriever = Retriever::new(embedder.clone(), store.clone())?
            .with_overfetch_factor(config.overfetch_factor);
        let generator = GroundedGenerator::new(llm.clone(), GeneratorSettings::from_config(&config));
        let cache_ttl = Duration::from_secs(config.cache.ttl_secs);
        let rewriter = config
            .rewrite_queries
            .then(|| QueryRewriter::new(llm, cache_ttl, config.cache.max_entries.max(1)));
        let answers =
            config.cache.enabled.then(|| TtlCache::new(cache_ttl, config.cache.max_entries));

        info!(
            embedder = embedder.name(),
            store = store.name(),
            dimensions = store.dimensions(),
            metric = %store.metric(),
            rewrite_queries = config.rewrite_queries,
            cache = config.cache.enabled,
            "chess buddy initialised"
        );

        Ok(ChessBuddy {
            config,
            chunker,
            embedder,
            store,
            retriever,
            generator,
            rewriter,
            answers,
            index_epoch: AtomicU64::new(0),
        })
    }
}
