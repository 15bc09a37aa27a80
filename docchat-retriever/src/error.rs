//! Error types for storage, ingestion and watching

use docchat_context::ContextError;
use docchat_embed::EmbedError;

/// Result type for retriever operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Error type for the vector store and everything layered on it.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// SQLite failures
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The embedding provider could not embed a document or query
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbedError),

    /// A source file could not be read or chunked
    #[error("Document error: {0}")]
    Context(#[from] ContextError),

    /// Metadata could not be encoded or decoded
    #[error("Metadata serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Collection not found: {name}")]
    CollectionNotFound { name: String },

    /// Parallel input vectors of an `add` call disagree in length
    #[error(
        "Mismatched batch: {ids} ids, {documents} documents and {metadatas} metadata entries"
    )]
    BatchMismatch {
        ids: usize,
        documents: usize,
        metadatas: usize,
    },

    /// The provider returned a different number of vectors than texts sent
    #[error("Expected {expected} embeddings, got {actual}")]
    EmbeddingCount { expected: usize, actual: usize },

    /// File system notification errors
    #[error("Watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking chunking task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl StoreError {
    pub fn collection_not_found<S: Into<String>>(name: S) -> Self {
        Self::CollectionNotFound { name: name.into() }
    }
}
