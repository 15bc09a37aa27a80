//! Embedding provider implementations

use crate::config::{EmbedConfig, ProviderKind};
use crate::error::{EmbedError, Result};
use crate::hashing::HashEmbedProvider;
use async_trait::async_trait;
use fastembed::{InitOptions, TextEmbedding};
use half::f16;
use std::sync::{Arc, Mutex};

/// Result of embedding generation
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    /// The generated embeddings, one per input text
    pub embeddings: Vec<Vec<f16>>,
    /// The dimension of each embedding vector
    pub dimension: usize,
}

impl EmbeddingResult {
    /// Create a new embedding result; the dimension is taken from the first
    /// vector, or 0 when there are none.
    pub fn new(embeddings: Vec<Vec<f16>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    /// Returns the number of embedding vectors in this result.
    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    /// Returns `true` if this result contains no embedding vectors.
    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// Trait for embedding providers that can generate embeddings from text
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for a single text
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>> {
        let result = self.embed_texts(&[text.to_string()]).await?;
        result
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::invalid_config("No embedding generated for text"))
    }

    /// Generate embeddings for multiple texts (batch processing)
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult>;

    /// Get the dimension of embeddings produced by this provider
    fn embedding_dimension(&self) -> usize;

    /// Get the name/identifier of this provider
    fn provider_name(&self) -> &str;
}

/// Build the provider selected by `config.provider`.
///
/// FastEmbed models are downloaded on first use, so this may take a while.
pub async fn create_provider(config: &EmbedConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    config.validate()?;
    match config.provider {
        ProviderKind::FastEmbed => Ok(Arc::new(FastEmbedProvider::create(config.clone()).await?)),
        ProviderKind::Hash => Ok(Arc::new(HashEmbedProvider::new(config.dimension))),
    }
}

/// FastEmbed-based embedding provider using built-in ONNX models.
///
/// Clones share the loaded model.
#[derive(Clone)]
pub struct FastEmbedProvider {
    config: EmbedConfig,
    model: Arc<Mutex<TextEmbedding>>,
    dimension: usize,
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("config", &self.config)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl FastEmbedProvider {
    /// Download (if needed) and load the configured model.
    pub async fn create(config: EmbedConfig) -> Result<Self> {
        let model_kind = config.fastembed_model()?;
        tracing::info!("Initializing FastEmbed provider for model: {}", config.model_name());

        let options = {
            let options = InitOptions::new(model_kind)
                .with_show_download_progress(config.show_download_progress);
            match &config.cache_dir {
                Some(dir) => options.with_cache_dir(dir.clone()),
                None => options,
            }
        };

        let (model, dimension) =
            tokio::task::spawn_blocking(move || -> Result<(TextEmbedding, usize)> {
                let mut model = TextEmbedding::try_new(options).map_err(EmbedError::model_init)?;

                // Get dimension by generating a test embedding
                let sample = model
                    .embed(vec!["dimension check".to_string()], None)
                    .map_err(EmbedError::model_init)?;
                let dimension = sample.first().map(|emb| emb.len()).unwrap_or(0);
                if dimension == 0 {
                    return Err(EmbedError::invalid_config(
                        "Model validation failed: empty embedding",
                    ));
                }
                Ok((model, dimension))
            })
            .await??;

        tracing::info!("Model loaded successfully. Dimension: {}", dimension);
        Ok(Self {
            config,
            model: Arc::new(Mutex::new(model)),
            dimension,
        })
    }
}

/// Convert to f16 and L2-normalize.
pub(crate) fn normalize_to_f16(embedding: &[f32]) -> Vec<f16> {
    let norm = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    embedding
        .iter()
        .map(|&value| {
            if norm > 0.0 {
                f16::from_f32(value / norm)
            } else {
                f16::from_f32(value)
            }
        })
        .collect()
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }

        tracing::debug!("Generating embeddings for {} texts", texts.len());

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size.max(1)) {
            let batch = batch.to_vec();
            let model = Arc::clone(&self.model);

            let batch_embeddings = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
                let mut model = model.lock().map_err(|_| EmbedError::LockPoisoned)?;
                model.embed(batch, None).map_err(EmbedError::embedding_gen)
            })
            .await??;

            all_embeddings.extend(batch_embeddings.iter().map(|e| normalize_to_f16(e)));
        }

        Ok(EmbeddingResult::new(all_embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "fastembed"
    }
}
