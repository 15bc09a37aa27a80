//! docchat-retriever: topic collections of embedded document chunks
//!
//! This crate stores chunked course documents in named collections (one per
//! topic), answers nearest-neighbour queries across several collections at
//! once, and keeps the store in sync with a watched directory.
//!
//! ## Key Modules
//!
//! - **[`storage`]**: the [`VectorDatabase`](storage::VectorDatabase) trait and its SQLite implementation
//! - **[`retrieval`]**: the [`VectorStore`] adapter, the ingestion pipeline and the file watcher
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docchat_context::TextFileChunker;
//! use docchat_embed::HashEmbedProvider;
//! use docchat_retriever::{Ingestor, SqliteVectorDatabase, VectorStore};
//! use std::{path::Path, sync::Arc};
//!
//! # async fn example() -> docchat_retriever::Result<()> {
//! let db = SqliteVectorDatabase::open(
//!     Path::new("docchat_db/docchat.db"),
//!     Arc::new(HashEmbedProvider::default()),
//! )
//! .await?;
//! let store = Arc::new(VectorStore::new(Arc::new(db)));
//! let ingestor = Ingestor::new(store.clone(), Arc::new(TextFileChunker::default()));
//!
//! ingestor.add_file(Path::new("Docs/Physics/waves.txt"), Some("Physics"), Default::default()).await?;
//! for hit in store.query(&["Physics".to_string()], "What is a wave?", 3, None).await? {
//!     println!("{:.4} {}", hit.distance, hit.text);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Watcher ─┐
//!          ├─ Ingestor → chunk_file → VectorStore → SqliteVectorDatabase → SQLite
//! CLI ─────┘                               ↑
//!                       queries ───────────┘
//! ```

pub mod error;
pub mod retrieval;
pub mod storage;

pub use error::{Result, StoreError};
pub use retrieval::ingest::{IngestReport, IngestSummary, Ingestor, infer_topic};
pub use retrieval::vector_store::{CollectionStats, DEFAULT_COLLECTION, QueryResult, VectorStore};
pub use retrieval::watcher::{
    Debouncer, DocumentWatcher, FileChangeHandler, IngestHandler, WatcherConfig,
};
pub use storage::{Metadata, MetadataValue, SqliteVectorDatabase, StoredDocument, VectorDatabase};
