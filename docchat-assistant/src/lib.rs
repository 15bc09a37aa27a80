//! Conversational question answering over indexed course documents
//!
//! This crate sits on top of `docchat-retriever`: questions are rewritten into
//! English search queries, matched against the vector store, and answered by
//! a hosted language model from the retrieved chunks.
//!
//! ## Quick Start
//!
//! ```no_run
//! use docchat_assistant::{LlmConfig, RagPipeline, create_llm};
//! use docchat_embed::HashEmbedProvider;
//! use docchat_retriever::{SqliteVectorDatabase, VectorStore};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let db = SqliteVectorDatabase::open(
//!     Path::new("docchat_db/docchat.db"),
//!     Arc::new(HashEmbedProvider::default()),
//! )
//! .await?;
//! let store = Arc::new(VectorStore::new(Arc::new(db)));
//! let llm = create_llm(&LlmConfig::default())?;
//!
//! let mut pipeline = RagPipeline::new(store, llm);
//! pipeline.set_selected_topics(vec!["Computer_Architecture".to_string()], 3);
//! let answer = pipeline.ask("What is a write-back cache?").await?;
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! question ── QueryPreprocessor ── VectorStore ── AnswerGenerator ── answer
//!                  │                                   │
//!                  └──────────── LlmProvider ──────────┘
//! ```
//!
//! - **llm**: provider trait and the Anthropic, Gemini and DeepSeek clients
//! - **preprocess**: translation and history-aware query rewriting
//! - **answer**: context formatting and grounded generation
//! - **pipeline**: the chat loop state (history, selected topics)
//! - **evaluator**: judge-model scoring of pipeline answers
//! - **config**: `docchat.toml` loading

pub mod answer;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod history;
pub mod llm;
pub mod pipeline;
pub mod preprocess;

pub use answer::{AnswerGenerator, DEFAULT_SYSTEM_PROMPT, format_context};
pub use config::AppConfig;
pub use error::{AssistantError, LlmError, Result};
pub use evaluator::{EvaluationReport, EvaluatorConfig, RagQualityEvaluator};
pub use history::ChatHistory;
pub use llm::{
    AnthropicProvider, GeminiProvider, GenerationParams, LlmConfig, LlmProvider, LlmProviderKind,
    OpenAiCompatibleProvider, create_llm,
};
pub use pipeline::RagPipeline;
pub use preprocess::QueryPreprocessor;
