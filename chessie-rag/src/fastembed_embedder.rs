//! Local sentence-transformer embeddings through [`fastembed`].
//!
//! Models are ONNX exports resolved by their Hugging Face code (for example
//! `Xenova/bge-small-en-v1.5` or the multilingual
//! `Xenova/paraphrase-multilingual-mpnet-base-v2`), downloaded once into the
//! cache directory and run on the CPU. Inference is blocking, so every call
//! runs on tokio's blocking pool.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fastembed::{EmbeddingModel, TextEmbedding, TextInitOptions};
use tracing::info;

use crate::config::EmbeddingConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

const PROVIDER: &str = "fastembed";

/// The supported model whose code matches `name`, with its dimensionality.
///
/// Matching ignores case, and the organisation prefix may be left out.
pub fn resolve_model(name: &str) -> Result<(EmbeddingModel, usize)> {
    let wanted = name.trim().to_lowercase();
    TextEmbedding::list_supported_models()
        .into_iter()
        .find(|info| {
            let code = info.model_code.to_lowercase();
            code == wanted || code.rsplit('/').next() == Some(wanted.as_str())
        })
        .map(|info| (info.model, info.dim))
        .ok_or_else(|| {
            RagError::ConfigError(format!("'{name}' is not a model supported by fastembed"))
        })
}

/// An [`EmbeddingProvider`] backed by a local [`TextEmbedding`] model.
pub struct FastEmbedProvider {
    model: Arc<Mutex<TextEmbedding>>,
    model_code: String,
    dimensions: usize,
}

impl FastEmbedProvider {
    /// Load (downloading on first use) the model named by `local_model`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] for an unknown model or one whose
    /// width differs from `config.dimensions`, and
    /// [`RagError::EmbeddingError`] if the model fails to load.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let (model, dimensions) = resolve_model(&config.local_model)?;
        if dimensions != config.dimensions {
            return Err(RagError::ConfigError(format!(
                "model '{}' produces {dimensions}-dimensional vectors but embedding.dimensions is {}",
                config.local_model, config.dimensions
            )));
        }

        let mut options = TextInitOptions::new(model).with_show_download_progress(false);
        if let Some(dir) = &config.cache_dir {
            options = options.with_cache_dir(dir.clone());
        }
        let embedding = TextEmbedding::try_new(options).map_err(|e| RagError::EmbeddingError {
            provider: PROVIDER.to_string(),
            message: format!("failed to initialize model '{}': {e}", config.local_model),
        })?;

        info!(model = %config.local_model, dimensions, "local embedding model loaded");
        Ok(Self {
            model: Arc::new(Mutex::new(embedding)),
            model_code: config.local_model.clone(),
            dimensions,
        })
    }

    pub fn model_code(&self) -> &str {
        &self.model_code
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut batch = self.embed_batch(&[text]).await?;
        batch.pop().ok_or_else(|| RagError::EmbeddingError {
            provider: PROVIDER.to_string(),
            message: "model returned no vector".to_string(),
        })
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let owned: Vec<String> = texts.iter().map(|s| (*s).to_string()).collect();
        let model = Arc::clone(&self.model);

        let embeddings = tokio::task::spawn_blocking(move || {
            let mut model = model.lock().map_err(|_| "embedding model lock poisoned".to_string())?;
            model.embed(owned, None).map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| RagError::EmbeddingError {
            provider: PROVIDER.to_string(),
            message: format!("embedding task failed: {e}"),
        })?
        .map_err(|message| RagError::EmbeddingError { provider: PROVIDER.to_string(), message })?;

        if embeddings.len() != texts.len() {
            return Err(RagError::EmbeddingError {
                provider: PROVIDER.to_string(),
                message: format!("expected {} vectors, got {}", texts.len(), embeddings.len()),
            });
        }
        Ok(embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}
