//! Application configuration loaded from `docchat.toml`
//!
//! Every table and every field has a default, so a missing file or a partial
//! one is fine:
//!
//! ```toml
//! [store]
//! path = "docchat_db/docchat.db"
//!
//! [embedding]
//! provider = "fastembed"
//! model = "all-minilm-l6-v2"
//!
//! [llm]
//! provider = "anthropic"
//! temperature = 0.2
//!
//! [chat]
//! topics = ["Computer_Architecture"]
//! results_per_topic = 3
//! ```
//!
//! API keys are never read from this file, only from the environment.

use crate::error::{AssistantError, Result};
use crate::history::DEFAULT_HISTORY_DEPTH;
use crate::llm::LlmConfig;
use crate::pipeline::{DEFAULT_CONTEXT_LIMIT, DEFAULT_RESULTS_PER_TOPIC};
use docchat_context::{
    Chunker, ChunkingMethod, ChunkingParams, DocumentChunker, StrategyChunker, TextFileChunker,
};
use docchat_embed::EmbedConfig;
use docchat_retriever::DEFAULT_COLLECTION;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// File looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "docchat.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub default_collection: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("docchat_db/docchat.db"),
            default_collection: DEFAULT_COLLECTION.to_string(),
        }
    }
}

/// How ingested files are split. Without a `method`, text and CSV files are
/// cut into fixed character windows.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub method: Option<ChunkingMethod>,
    #[serde(flatten)]
    pub params: ChunkingParams,
}

impl ChunkingConfig {
    pub fn document_chunker(&self) -> Arc<dyn DocumentChunker> {
        match self.method {
            Some(method) => Arc::new(StrategyChunker::new(
                Chunker::new(),
                method,
                self.params.clone(),
            )),
            None => Arc::new(TextFileChunker::default()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub watch_dir: PathBuf,
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            watch_dir: PathBuf::from("Docs"),
            debounce_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub history_depth: usize,
    /// Chunks retrieved when no topics are selected
    pub context_limit: usize,
    pub results_per_topic: usize,
    /// Topics selected at startup
    pub topics: Vec<String>,
    /// Replaces the default answer prompt
    pub system_prompt: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_depth: DEFAULT_HISTORY_DEPTH,
            context_limit: DEFAULT_CONTEXT_LIMIT,
            results_per_topic: DEFAULT_RESULTS_PER_TOPIC,
            topics: Vec::new(),
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub embedding: EmbedConfig,
    pub chunking: ChunkingConfig,
    pub watcher: WatchConfig,
    pub llm: LlmConfig,
    pub chat: ChatConfig,
}

impl AppConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Load `path`, or `docchat.toml` from the working directory when `None`.
    ///
    /// An explicit path must exist; the implicit file may be absent, in which
    /// case the defaults are used.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                info!("Loaded configuration from {}", path.display());
                Self::from_toml_str(&contents)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                info!("No {} found, using default configuration", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(AssistantError::config(format!(
                "cannot read {}: {e}",
                path.display()
            ))),
        }
    }
}
