//! Configuration for embedding providers

use crate::error::{EmbedError, Result};
use fastembed::EmbeddingModel;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Which embedding backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Local ONNX model through fastembed
    #[default]
    FastEmbed,
    /// Deterministic feature hashing, no model download
    Hash,
}

impl FromStr for ProviderKind {
    type Err = EmbedError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "fastembed" => Ok(ProviderKind::FastEmbed),
            "hash" => Ok(ProviderKind::Hash),
            other => Err(EmbedError::invalid_config(format!(
                "unknown embedding provider '{other}'"
            ))),
        }
    }
}

/// Embedding configuration.
///
/// Deserializes from the `[embedding]` table of the application config; every
/// field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedConfig {
    /// Backend to use
    pub provider: ProviderKind,
    /// Model identifier, see [`EmbedConfig::fastembed_model`]
    #[serde(alias = "model")]
    pub model_name: String,
    /// Number of texts sent to the model at once
    pub batch_size: usize,
    /// Vector size for the hashing provider (fastembed models report their own)
    pub dimension: usize,
    /// Where fastembed caches downloaded models
    pub cache_dir: Option<PathBuf>,
    /// Show download progress bars when fetching a model
    pub show_download_progress: bool,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::FastEmbed,
            model_name: "all-minilm-l6-v2".to_string(),
            batch_size: 16,
            dimension: 384,
            cache_dir: None,
            show_download_progress: true,
        }
    }
}

impl EmbedConfig {
    /// Configuration for the hashing provider.
    pub fn hash(dimension: usize) -> Self {
        Self {
            provider: ProviderKind::Hash,
            model_name: "fnv-feature-hash".to_string(),
            dimension,
            ..Self::default()
        }
    }

    /// Set the model name (builder style)
    pub fn with_model<S: Into<String>>(self, model_name: S) -> Self {
        Self {
            model_name: model_name.into(),
            ..self
        }
    }

    /// Set the batch size for embedding generation (builder style)
    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self { batch_size, ..self }
    }

    /// Set the model cache directory (builder style)
    pub fn with_cache_dir<P: Into<PathBuf>>(self, cache_dir: P) -> Self {
        Self {
            cache_dir: Some(cache_dir.into()),
            ..self
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Map the configured model name onto a built-in fastembed model.
    pub fn fastembed_model(&self) -> Result<EmbeddingModel> {
        match self.model_name.to_lowercase().as_str() {
            "all-minilm-l6-v2" | "sentence-transformers/all-minilm-l6-v2" => {
                Ok(EmbeddingModel::AllMiniLML6V2)
            }
            "all-minilm-l12-v2" => Ok(EmbeddingModel::AllMiniLML12V2),
            "bge-small-en-v1.5" | "baai/bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
            "bge-base-en-v1.5" | "baai/bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
            "multilingual-e5-small" | "intfloat/multilingual-e5-small" => {
                Ok(EmbeddingModel::MultilingualE5Small)
            }
            other => Err(EmbedError::invalid_config(format!(
                "unknown fastembed model '{other}'"
            ))),
        }
    }

    /// Check the settings before a provider is built.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(EmbedError::invalid_config("batch_size must be positive"));
        }
        match self.provider {
            ProviderKind::FastEmbed => self.fastembed_model().map(|_| ()),
            ProviderKind::Hash if self.dimension == 0 => {
                Err(EmbedError::invalid_config("dimension must be positive"))
            }
            ProviderKind::Hash => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_from_str() {
        assert_eq!("hash".parse::<ProviderKind>().unwrap(), ProviderKind::Hash);
        assert_eq!(
            "FastEmbed".parse::<ProviderKind>().unwrap(),
            ProviderKind::FastEmbed
        );
        assert!("onnx".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = EmbedConfig::default();
        assert_eq!(config.provider, ProviderKind::FastEmbed);
        assert_eq!(config.model_name(), "all-minilm-l6-v2");
        assert!(matches!(
            config.fastembed_model().unwrap(),
            EmbeddingModel::AllMiniLML6V2
        ));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = EmbedConfig::default()
            .with_model("BGE-small-en-v1.5")
            .with_batch_size(64)
            .with_cache_dir("/tmp/models");

        assert_eq!(config.batch_size, 64);
        assert_eq!(config.cache_dir, Some(PathBuf::from("/tmp/models")));
        assert!(matches!(
            config.fastembed_model().unwrap(),
            EmbeddingModel::BGESmallENV15
        ));
    }

    #[test]
    fn test_validation_errors() {
        let unknown = EmbedConfig::default().with_model("word2vec");
        assert!(matches!(
            unknown.validate(),
            Err(EmbedError::InvalidConfig { .. })
        ));
        assert!(EmbedConfig::default().with_batch_size(0).validate().is_err());
        assert!(EmbedConfig::hash(0).validate().is_err());
        assert!(EmbedConfig::hash(64).validate().is_ok());
    }

    #[test]
    fn test_deserializes_partial_table() {
        let config: EmbedConfig =
            serde_json::from_str(r#"{"provider": "hash", "dimension": 128}"#).unwrap();
        assert_eq!(config.provider, ProviderKind::Hash);
        assert_eq!(config.dimension, 128);
        assert_eq!(config.batch_size, 16);
    }
}
