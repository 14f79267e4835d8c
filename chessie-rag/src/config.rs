//! Configuration for the retrieval-and-grounding pipeline.
//!
//! Every tunable is externally settable: values come from [`RagConfig::default`],
//! then an optional TOML file, then `CHESSIE_*` environment variables, and are
//! validated last.
//!
//! ```toml
//! chunk_max_chars = 500
//! chunk_overlap_chars = 100
//! top_k = 5
//! score_threshold = 0.8
//!
//! [embedding]
//! provider = "hashing"
//! dimensions = 384
//!
//! [index]
//! path = "data/index.json"
//! metric = "cosine"
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::messages::Language;
use crate::vectorstore::DistanceMetric;

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "CHESSIE_";

/// Which [`EmbeddingProvider`](crate::EmbeddingProvider) to construct.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Local deterministic feature hashing.
    #[default]
    Hashing,
    /// OpenAI-compatible `/embeddings` endpoint.
    OpenAI,
    /// Local ONNX sentence-transformer model via `fastembed`.
    FastEmbed,
}

impl FromStr for EmbeddingBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hashing" => Ok(Self::Hashing),
            "openai" => Ok(Self::OpenAI),
            "fastembed" => Ok(Self::FastEmbed),
            other => Err(format!("unknown embedding provider '{other}'")),
        }
    }
}

/// Embedding provider settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingBackend,
    /// Vector dimensionality. Must match any existing index.
    pub dimensions: usize,
    /// Model name for remote providers.
    pub model: String,
    /// API base URL for remote providers.
    pub base_url: String,
    /// Environment variable holding the API key for remote providers.
    pub api_key_env: String,
    /// Maximum inputs per remote batch request.
    pub batch_size: usize,
    /// Model code for the local `fastembed` provider.
    pub local_model: String,
    /// Where local model weights are cached. `fastembed`'s default when unset.
    pub cache_dir: Option<PathBuf>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingBackend::Hashing,
            dimensions: 384,
            model: "text-embedding-3-small".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            batch_size: 64,
            local_model: "Xenova/bge-small-en-v1.5".to_string(),
            cache_dir: None,
        }
    }
}

/// Generation backend settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "llama-3.1-8b-instant".to_string(),
            base_url: "https://api.groq.com/openai/v1".to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
        }
    }
}

/// Vector index settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexConfig {
    /// Index file location.
    pub path: PathBuf,
    /// Distance metric, fixed when the index is first built.
    pub metric: DistanceMetric,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self { path: PathBuf::from("data/processed/index.json"), metric: DistanceMetric::Cosine }
    }
}

/// Response cache settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: true, ttl_secs: 3600, max_entries: 256 }
    }
}

/// Configuration parameters for the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_max_chars: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap_chars: usize,
    /// How far back from a hard cut the chunker looks for a sentence or
    /// paragraph break. `None` means a quarter of `chunk_max_chars`.
    pub chunk_boundary_lookback: Option<usize>,
    /// Maximum number of evidence chunks per query.
    pub top_k: usize,
    /// Maximum distance for a chunk to count as evidence (lower is closer).
    pub score_threshold: f32,
    /// Candidates fetched per query are `top_k * overfetch_factor`.
    pub overfetch_factor: usize,
    pub short_answer_max_tokens: u32,
    pub short_answer_temperature: f32,
    pub explanation_max_tokens: u32,
    pub explanation_temperature: f32,
    /// Per-call timeout for the generation backend.
    pub generation_timeout_secs: u64,
    /// Retries after a failed generation call.
    pub generation_retries: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub retry_backoff_ms: u64,
    /// Replace short answers that do not occur in the evidence with the sentinel.
    pub verify_short_answer: bool,
    /// Rewrite questions into plain factual form before retrieval.
    pub rewrite_queries: bool,
    pub language: Language,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub index: IndexConfig,
    pub cache: CacheConfig,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_max_chars: 500,
            chunk_overlap_chars: 100,
            chunk_boundary_lookback: None,
            top_k: 5,
            score_threshold: 0.8,
            overfetch_factor: 1,
            short_answer_max_tokens: 60,
            short_answer_temperature: 0.1,
            explanation_max_tokens: 500,
            explanation_temperature: 0.4,
            generation_timeout_secs: 30,
            generation_retries: 2,
            retry_backoff_ms: 500,
            verify_short_answer: true,
            rewrite_queries: false,
            language: Language::En,
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            index: IndexConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Parse a TOML document. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] for malformed TOML or invalid values.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: RagConfig = toml::from_str(source)
            .map_err(|e| RagError::ConfigError(format!("invalid configuration file: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            RagError::ConfigError(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml_str(&source)
    }

    /// Apply `CHESSIE_*` overrides from the process environment, then validate.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        self.apply_env_overrides(std::env::vars())?;
        self.validate()?;
        Ok(self)
    }

    /// Apply `CHESSIE_*` overrides from `vars`. Unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] when a recognised key has an
    /// unparseable value.
    pub fn apply_env_overrides<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match name {
                "CHUNK_MAX_CHARS" => self.chunk_max_chars = parse_env(&key, &value)?,
                "CHUNK_OVERLAP_CHARS" => self.chunk_overlap_chars = parse_env(&key, &value)?,
                "TOP_K" => self.top_k = parse_env(&key, &value)?,
                "SCORE_THRESHOLD" => self.score_threshold = parse_env(&key, &value)?,
                "SHORT_ANSWER_MAX_TOKENS" => self.short_answer_max_tokens = parse_env(&key, &value)?,
                "SHORT_ANSWER_TEMPERATURE" => {
                    self.short_answer_temperature = parse_env(&key, &value)?
                }
                "EXPLANATION_MAX_TOKENS" => self.explanation_max_tokens = parse_env(&key, &value)?,
                "EXPLANATION_TEMPERATURE" => self.explanation_temperature = parse_env(&key, &value)?,
                "GENERATION_TIMEOUT_SECS" => self.generation_timeout_secs = parse_env(&key, &value)?,
                "GENERATION_RETRIES" => self.generation_retries = parse_env(&key, &value)?,
                "REWRITE_QUERIES" => self.rewrite_queries = parse_env(&key, &value)?,
                "LANGUAGE" => self.language = parse_env(&key, &value)?,
                "EMBEDDING_PROVIDER" => self.embedding.provider = parse_env(&key, &value)?,
                "EMBEDDING_DIMENSIONS" => self.embedding.dimensions = parse_env(&key, &value)?,
                "EMBEDDING_LOCAL_MODEL" => self.embedding.local_model = value,
                "INDEX_PATH" => self.index.path = PathBuf::from(value),
                "LLM_MODEL" => self.llm.model = value,
                "LLM_BASE_URL" => self.llm.base_url = value,
                "CACHE_ENABLED" => self.cache.enabled = parse_env(&key, &value)?,
                _ => {}
            }
        }
        Ok(())
    }

    /// Check that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_overlap_chars >= chunk_max_chars`
    /// - `top_k == 0` or `overfetch_factor == 0`
    /// - `score_threshold` is negative or not finite
    /// - a temperature is outside `0.0..=2.0` or a token budget is zero
    /// - `generation_timeout_secs == 0`
    /// - `embedding.dimensions == 0`
    pub fn validate(&self) -> Result<()> {
        if self.chunk_overlap_chars >= self.chunk_max_chars {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap_chars ({}) must be less than chunk_max_chars ({})",
                self.chunk_overlap_chars, self.chunk_max_chars
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if self.overfetch_factor == 0 {
            return Err(RagError::ConfigError("overfetch_factor must be at least 1".to_string()));
        }
        if !self.score_threshold.is_finite() || self.score_threshold < 0.0 {
            return Err(RagError::ConfigError(format!(
                "score_threshold ({}) must be a non-negative distance",
                self.score_threshold
            )));
        }
        for (name, value) in [
            ("short_answer_temperature", self.short_answer_temperature),
            ("explanation_temperature", self.explanation_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(RagError::ConfigError(format!("{name} ({value}) must be in 0.0..=2.0")));
            }
        }
        if self.generation_timeout_secs == 0 {
            return Err(RagError::ConfigError(
                "generation_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.short_answer_max_tokens == 0 || self.explanation_max_tokens == 0 {
            return Err(RagError::ConfigError("token budgets must be greater than zero".to_string()));
        }
        if self.embedding.dimensions == 0 {
            return Err(RagError::ConfigError(
                "embedding.dimensions must be greater than zero".to_string(),
            ));
        }
        if self.cache.enabled && self.cache.max_entries == 0 {
            return Err(RagError::ConfigError(
                "cache.max_entries must be greater than zero when the cache is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| RagError::ConfigError(format!("invalid value '{value}' for {key}: {e}")))
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_max_chars(mut self, size: usize) -> Self {
        self.config.chunk_max_chars = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap_chars(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap_chars = overlap;
        self
    }

    /// Set the maximum number of evidence chunks per query.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the maximum distance for evidence.
    pub fn score_threshold(mut self, threshold: f32) -> Self {
        self.config.score_threshold = threshold;
        self
    }

    /// Set the short-answer token budget and temperature.
    pub fn short_answer(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.config.short_answer_max_tokens = max_tokens;
        self.config.short_answer_temperature = temperature;
        self
    }

    /// Set the explanation token budget and temperature.
    pub fn explanation(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.config.explanation_max_tokens = max_tokens;
        self.config.explanation_temperature = temperature;
        self
    }

    /// Set retry count and initial backoff for generation calls.
    pub fn generation_retries(mut self, retries: u32, backoff_ms: u64) -> Self {
        self.config.generation_retries = retries;
        self.config.retry_backoff_ms = backoff_ms;
        self
    }

    /// Toggle evidence verification of short answers.
    pub fn verify_short_answer(mut self, verify: bool) -> Self {
        self.config.verify_short_answer = verify;
        self
    }

    /// Toggle query rewriting before retrieval.
    pub fn rewrite_queries(mut self, rewrite: bool) -> Self {
        self.config.rewrite_queries = rewrite;
        self
    }

    /// Set the language of user-facing messages.
    pub fn language(mut self, language: Language) -> Self {
        self.config.language = language;
        self
    }

    /// Set the embedding dimensionality.
    pub fn embedding_dimensions(mut self, dimensions: usize) -> Self {
        self.config.embedding.dimensions = dimensions;
        self
    }

    /// Set the index file location.
    pub fn index_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.index.path = path.into();
        self
    }

    /// Enable or disable the response cache.
    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.config.cache.enabled = enabled;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
