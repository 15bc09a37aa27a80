//! # docchat-embed
//!
//! Text embeddings for the docchat vector store.
//!
//! ## Providers
//!
//! - [`FastEmbedProvider`]: local ONNX models via FastEmbed (all-MiniLM-L6-v2 by default)
//! - [`HashEmbedProvider`]: deterministic feature hashing, no downloads
//!
//! Both implement [`EmbeddingProvider`] and return L2-normalized half-precision
//! (f16) vectors, so cosine similarity is a plain dot product.
//!
//! ## Quick Start
//!
//! ```no_run
//! use docchat_embed::{EmbedConfig, create_provider};
//!
//! # async fn example() -> docchat_embed::Result<()> {
//! let provider = create_provider(&EmbedConfig::default()).await?;
//! let texts = vec!["Hello world".to_string(), "How are you?".to_string()];
//! let result = provider.embed_texts(&texts).await?;
//! println!("Generated {} embeddings of dimension {}", result.len(), result.dimension);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod hashing;
pub mod provider;

pub use config::{EmbedConfig, ProviderKind};
pub use error::{EmbedError, Result};
pub use hashing::HashEmbedProvider;
pub use provider::{EmbeddingProvider, EmbeddingResult, FastEmbedProvider, create_provider};
