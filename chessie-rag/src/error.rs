//! Error types for the `chessie-rag` crate.

use thiserror::Error;

use crate::messages::{Language, Message};

/// Errors that can occur in retrieval and generation.
///
/// An empty evidence set is not an error; it is answered with the abstention
/// package by the generator.
#[derive(Debug, Error)]
pub enum RagError {
    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStoreError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// A configuration validation error: bad chunk sizes, a dimension or
    /// metric mismatch with an existing index, or a corrupt index file.
    /// Not recoverable by retrying.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A corpus document could not be read. The index build skips the
    /// document and reports it instead of failing.
    #[error("Could not load '{source_id}': {message}")]
    CorpusLoadError {
        /// The document that failed to load.
        source_id: String,
        /// A description of the failure.
        message: String,
    },

    /// The language-model backend failed or timed out after all retries.
    #[error("Generation backend error ({backend}): {message}")]
    GenerationError {
        /// The backend that failed.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// An error in pipeline orchestration.
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// A filesystem error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// An index or cache payload could not be (de)serialized.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl RagError {
    /// Whether the failure came from the generation backend.
    pub fn is_generation_failure(&self) -> bool {
        matches!(self, RagError::GenerationError { .. })
    }

    /// A message safe to show to end users, without backend internals.
    pub fn user_message(&self, language: Language) -> &'static str {
        match self {
            RagError::GenerationError { .. } | RagError::EmbeddingError { .. } => {
                Message::TryAgain.text(language)
            }
            RagError::ConfigError(_) => Message::NotConfigured.text(language),
            _ => Message::GeneralError.text(language),
        }
    }
}

impl From<chessie_model::LlmError> for RagError {
    fn from(e: chessie_model::LlmError) -> Self {
        let backend = match &e {
            chessie_model::LlmError::Request { backend, .. }
            | chessie_model::LlmError::Api { backend, .. }
            | chessie_model::LlmError::Timeout { backend, .. }
            | chessie_model::LlmError::InvalidResponse { backend, .. } => backend.clone(),
            chessie_model::LlmError::InvalidConfig(_) => "llm".to_string(),
        };
        RagError::GenerationError { backend, message: e.to_string() }
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
