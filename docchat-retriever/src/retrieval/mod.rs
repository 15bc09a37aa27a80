pub mod ingest;
pub mod vector_store;
pub mod watcher;
