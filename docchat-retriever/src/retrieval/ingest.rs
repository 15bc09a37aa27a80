//! Ingestion pipeline: file → chunks → vector store.
//!
//! [`Ingestor`] is the single write path into the [`VectorStore`]. The watcher
//! and the CLI both go through it. Re-indexing a file is always a full
//! replace of every chunk carrying the file's `source_path`.
//!
//! Stored metadata per chunk:
//!
//! | key           | value                                             |
//! |---------------|---------------------------------------------------|
//! | `source_file` | basename of the file                              |
//! | `source_path` | path relative to the ingest root, `/`-separated   |
//! | `file_type`   | extension without the dot                         |
//! | `page`        | 1-based page number (PDFs)                        |
//! | `chunk_index` | 0-based chunk position (everything else)          |
//! | `text_hash`   | short content hash of the chunk                   |
//! | `source`      | full path as given                                |
//! | `topic`       | topic name, when the file belongs to a topic      |
//!
//! `source_path` identifies the file; `source_file` is for display only, so
//! two files with the same name in different folders stay separate.
//!
//! A replace chunks and embeds the new version before touching the old one:
//! the new chunks are inserted first and the old ids deleted afterwards. A
//! failure leaves the previous version in place. Replacing is not atomic: a
//! query that lands between the insert and the delete sees both versions.

use super::vector_store::VectorStore;
use crate::error::Result;
use crate::storage::Metadata;
use docchat_context::reader::extension_of;
use docchat_context::{Chunk, DocumentChunker, DocumentFormat, chunk_file, is_supported};
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const SOURCE_PATH_KEY: &str = "source_path";

/// Outcome of indexing one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub source_file: String,
    pub collection: String,
    pub chunks_added: usize,
    /// Chunks of a previous version that were replaced
    pub chunks_replaced: usize,
}

/// Totals for a directory pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub files_indexed: usize,
    pub files_failed: usize,
    pub chunks_added: usize,
}

/// Topic for `path` inside the watch root: the first path component when the
/// file sits in a subdirectory, `None` for files directly in the root.
pub fn infer_topic(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut components = relative.components();
    let first = components.next()?;
    components.next()?;
    match first {
        Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
        _ => None,
    }
}

/// Whether any component below `root` is hidden (starts with a dot).
pub fn is_hidden(root: &Path, path: &Path) -> bool {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .any(|c| matches!(c, Component::Normal(name) if name.to_string_lossy().starts_with('.')))
}

/// `path` relative to `root` with `/` separators, if it lies under `root`.
pub fn relative_source_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

type PreparedChunks = Vec<(Option<String>, String, Metadata)>;

pub struct Ingestor {
    store: Arc<VectorStore>,
    chunker: Arc<dyn DocumentChunker>,
    root: Option<PathBuf>,
}

impl std::fmt::Debug for Ingestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ingestor")
            .field("store", &self.store)
            .field("root", &self.root)
            .finish()
    }
}

impl Ingestor {
    /// `chunker` handles text and CSV files; PDFs are always split per page.
    pub fn new(store: Arc<VectorStore>, chunker: Arc<dyn DocumentChunker>) -> Self {
        Self {
            store,
            chunker,
            root: None,
        }
    }

    /// Key files under `root` by their path relative to it.
    pub fn with_root<P: Into<PathBuf>>(self, root: P) -> Self {
        Self {
            root: Some(root.into()),
            ..self
        }
    }

    pub fn store(&self) -> &Arc<VectorStore> {
        &self.store
    }

    /// Collection a topic maps to.
    pub fn collection_for(&self, topic: Option<&str>) -> String {
        topic
            .map(str::to_string)
            .unwrap_or_else(|| self.store.default_collection().to_string())
    }

    /// Identity of `path` in the store: relative to the configured root when
    /// it lies under it, otherwise the path as given.
    pub fn source_path(&self, path: &Path) -> String {
        self.root
            .as_deref()
            .and_then(|root| relative_source_path(root, path))
            .unwrap_or_else(|| path.display().to_string())
    }

    async fn chunk(&self, path: &Path) -> Result<Vec<Chunk>> {
        let chunker = Arc::clone(&self.chunker);
        let owned = path.to_path_buf();
        let chunks =
            tokio::task::spawn_blocking(move || chunk_file(&owned, chunker.as_ref())).await??;
        Ok(chunks)
    }

    fn chunk_metadata(
        path: &Path,
        source_path: &str,
        chunk: &Chunk,
        position: usize,
        topic: Option<&str>,
        extra: &Metadata,
    ) -> Metadata {
        let mut metadata = extra.clone();
        metadata.insert("source_file".into(), chunk.source_file.clone().into());
        metadata.insert(SOURCE_PATH_KEY.into(), source_path.into());
        metadata.insert("file_type".into(), extension_of(path).into());
        if matches!(DocumentFormat::from_path(path), Ok(DocumentFormat::Pdf)) {
            metadata.insert("page".into(), chunk.page_or_index.into());
        } else {
            metadata.insert("chunk_index".into(), position.into());
        }
        metadata.insert("text_hash".into(), chunk.content_hash.clone().into());
        metadata.insert("source".into(), path.display().to_string().into());
        if let Some(topic) = topic {
            metadata.insert("topic".into(), topic.into());
        }
        metadata
    }

    async fn prepare(
        &self,
        path: &Path,
        source_path: &str,
        topic: Option<&str>,
        extra: &Metadata,
    ) -> Result<PreparedChunks> {
        let chunks = self.chunk(path).await?;
        if chunks.is_empty() {
            warn!("No content extracted from {}", path.display());
        }
        Ok(chunks
            .into_iter()
            .enumerate()
            .map(|(position, chunk)| {
                let chunk = chunk.with_topic(topic.map(str::to_string));
                let metadata =
                    Self::chunk_metadata(path, source_path, &chunk, position, topic, extra);
                (None, chunk.text, metadata)
            })
            .collect())
    }

    /// Chunk `path` and append its chunks to the topic's collection.
    ///
    /// `extra` is merged into every chunk's metadata; the provenance keys
    /// above take precedence over it.
    pub async fn add_file(
        &self,
        path: &Path,
        topic: Option<&str>,
        extra: Metadata,
    ) -> Result<IngestReport> {
        let collection = self.collection_for(topic);
        let source_file = file_name(path);
        let documents = self
            .prepare(path, &self.source_path(path), topic, &extra)
            .await?;
        let chunks_added = documents.len();
        if chunks_added > 0 {
            self.store.add_batch(&collection, documents).await?;
        }

        info!("Indexed {chunks_added} chunks from {source_file} into {collection}");
        Ok(IngestReport {
            source_file,
            collection,
            chunks_added,
            chunks_replaced: 0,
        })
    }

    /// Replace every chunk of `path` with freshly chunked content.
    ///
    /// The old chunks are only deleted once the new ones are stored.
    pub async fn reindex_file(&self, path: &Path, topic: Option<&str>) -> Result<IngestReport> {
        self.reindex_source(path, &self.source_path(path), topic)
            .await
    }

    /// [`Ingestor::reindex_file`] with an explicit `source_path` identity.
    pub async fn reindex_source(
        &self,
        path: &Path,
        source_path: &str,
        topic: Option<&str>,
    ) -> Result<IngestReport> {
        let collection = self.collection_for(topic);
        let source_file = file_name(path);
        let documents = self
            .prepare(path, source_path, topic, &Metadata::new())
            .await?;

        let previous = self
            .store
            .ids_by_metadata(&collection, SOURCE_PATH_KEY, source_path)
            .await?;
        let chunks_added = documents.len();
        if chunks_added > 0 {
            self.store.add_batch(&collection, documents).await?;
        }
        let chunks_replaced = self.store.delete_ids(&collection, &previous).await?;

        info!("Indexed {chunks_added} chunks from {source_path} into {collection}");
        Ok(IngestReport {
            source_file,
            collection,
            chunks_added,
            chunks_replaced,
        })
    }

    /// Delete every chunk of `path`.
    pub async fn remove_file(&self, path: &Path, topic: Option<&str>) -> Result<usize> {
        self.remove_source(&self.source_path(path), topic).await
    }

    /// Delete every chunk whose `source_path` is `source_path`.
    pub async fn remove_source(&self, source_path: &str, topic: Option<&str>) -> Result<usize> {
        let collection = self.collection_for(topic);
        let removed = self
            .store
            .delete_by_metadata(&collection, SOURCE_PATH_KEY, source_path)
            .await?;
        debug!("Removed {removed} chunks of {source_path} from {collection}");
        Ok(removed)
    }

    /// Empty every collection. Returns the number of documents deleted.
    pub async fn flush_all(&self) -> Result<usize> {
        let mut deleted = 0;
        for collection in self.store.list_collections().await? {
            deleted += self.store.flush(&collection).await?;
        }
        info!("Flushed {deleted} documents from the database");
        Ok(deleted)
    }

    /// Supported files under `root`, skipping hidden and ignored entries.
    pub fn supported_files(root: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for entry in ignore::Walk::new(root) {
            match entry {
                Ok(entry) => {
                    let path = entry.path();
                    if path.is_file() && is_supported(path) && !is_hidden(root, path) {
                        files.push(entry.into_path());
                    }
                }
                Err(e) => warn!("Skipping unreadable entry under {}: {e}", root.display()),
            }
        }
        files.sort();
        files
    }

    /// Re-index every supported file under `root`, each into its topic.
    ///
    /// Failures are logged and counted; the pass continues.
    pub async fn ingest_directory(&self, root: &Path) -> Result<IngestSummary> {
        let mut summary = IngestSummary::default();
        for path in Self::supported_files(root) {
            let topic = infer_topic(root, &path);
            let source_path =
                relative_source_path(root, &path).unwrap_or_else(|| self.source_path(&path));
            match self
                .reindex_source(&path, &source_path, topic.as_deref())
                .await
            {
                Ok(report) => {
                    summary.files_indexed += 1;
                    summary.chunks_added += report.chunks_added;
                }
                Err(e) => {
                    summary.files_failed += 1;
                    tracing::error!("Failed to index {}: {e}", path.display());
                }
            }
        }
        info!(
            "Indexed {} files ({} chunks), {} failed",
            summary.files_indexed, summary.chunks_added, summary.files_failed
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteVectorDatabase;
    use docchat_context::TextFileChunker;
    use docchat_embed::HashEmbedProvider;
    use std::fs;
    use tempfile::tempdir;

    async fn ingestor() -> Result<Ingestor> {
        let db = SqliteVectorDatabase::open_memory(Arc::new(HashEmbedProvider::default())).await?;
        let store = Arc::new(VectorStore::new(Arc::new(db)));
        Ok(Ingestor::new(store, Arc::new(TextFileChunker::default())))
    }

    #[test]
    fn test_infer_topic() {
        let root = Path::new("Docs");
        assert_eq!(
            infer_topic(root, Path::new("Docs/Physics/waves.txt")),
            Some("Physics".to_string())
        );
        assert_eq!(
            infer_topic(root, Path::new("Docs/Physics/deep/waves.txt")),
            Some("Physics".to_string())
        );
        assert_eq!(infer_topic(root, Path::new("Docs/readme.txt")), None);
        assert_eq!(infer_topic(root, Path::new("Elsewhere/a/b.txt")), None);
    }

    #[test]
    fn test_is_hidden() {
        let root = Path::new("/watch");
        assert!(is_hidden(root, Path::new("/watch/.git/notes.txt")));
        assert!(is_hidden(root, Path::new("/watch/topic/.draft.txt")));
        assert!(!is_hidden(root, Path::new("/watch/topic/notes.txt")));
    }

    #[tokio::test]
    async fn test_add_file_records_provenance() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("notes.txt");
        fs::write(&path, "The sky is blue.")?;

        let ingestor = ingestor().await?;
        let mut extra = Metadata::new();
        extra.insert("course".into(), "CS101".into());
        extra.insert("source_file".into(), "spoofed.txt".into());
        let report = ingestor.add_file(&path, Some("Physics"), extra).await?;
        assert_eq!(report.collection, "Physics");
        assert_eq!(report.chunks_added, 1);

        let docs = ingestor.store().get_documents("Physics", None).await?;
        assert_eq!(docs.len(), 1);
        let metadata = &docs[0].metadata;
        assert_eq!(metadata["source_file"].as_str(), Some("notes.txt"));
        assert_eq!(metadata["file_type"].as_str(), Some("txt"));
        assert_eq!(metadata["chunk_index"].as_i64(), Some(0));
        assert_eq!(metadata["topic"].as_str(), Some("Physics"));
        assert_eq!(metadata["course"].as_str(), Some("CS101"));
        assert_eq!(metadata["text_hash"].as_str().map(str::len), Some(16));
        Ok(())
    }

    #[tokio::test]
    async fn test_reindex_replaces_old_chunks() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("notes.txt");
        fs::write(&path, "Version one mentions zebras.")?;

        let ingestor = ingestor().await?;
        ingestor.reindex_file(&path, None).await?;

        fs::write(&path, "Version two mentions giraffes.")?;
        let report = ingestor.reindex_file(&path, None).await?;
        assert_eq!(report.chunks_replaced, 1);
        assert_eq!(report.chunks_added, 1);

        let docs = ingestor.store().get_documents("documents", None).await?;
        assert_eq!(docs.len(), 1);
        assert!(docs[0].text.contains("giraffes"));
        Ok(())
    }

    #[test]
    fn test_relative_source_path() {
        let root = Path::new("/watch");
        assert_eq!(
            relative_source_path(root, Path::new("/watch/Topic/a/notes.txt")),
            Some("Topic/a/notes.txt".to_string())
        );
        assert_eq!(relative_source_path(root, Path::new("/elsewhere/notes.txt")), None);
        assert_eq!(relative_source_path(root, root), None);
    }

    #[tokio::test]
    async fn test_same_name_in_different_folders_stays_separate() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let a = dir.path().join("Topic").join("a");
        let b = dir.path().join("Topic").join("b");
        fs::create_dir_all(&a)?;
        fs::create_dir_all(&b)?;
        fs::write(a.join("notes.txt"), "Alpha notes about caches.")?;
        fs::write(b.join("notes.txt"), "Beta notes about pipelines.")?;

        let ingestor = ingestor().await?.with_root(dir.path());
        ingestor.ingest_directory(dir.path()).await?;
        assert_eq!(ingestor.store().stats("Topic").await?.total_documents, 2);

        fs::write(a.join("notes.txt"), "Alpha notes, second edition.")?;
        let report = ingestor.reindex_file(&a.join("notes.txt"), Some("Topic")).await?;
        assert_eq!(report.chunks_replaced, 1);
        ingestor.remove_file(&a.join("notes.txt"), Some("Topic")).await?;

        let docs = ingestor.store().get_documents("Topic", None).await?;
        assert_eq!(docs.len(), 1);
        assert!(docs[0].text.contains("Beta"));
        assert_eq!(
            docs[0].metadata["source_path"].as_str(),
            Some("Topic/b/notes.txt")
        );
        assert_eq!(docs[0].metadata["source_file"].as_str(), Some("notes.txt"));
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_reindex_keeps_previous_chunks() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("notes.txt");
        fs::write(&path, "Version one mentions zebras.")?;

        let ingestor = ingestor().await?;
        ingestor.reindex_file(&path, None).await?;

        fs::remove_file(&path)?;
        assert!(ingestor.reindex_file(&path, None).await.is_err());

        let docs = ingestor.store().get_documents("documents", None).await?;
        assert_eq!(docs.len(), 1);
        assert!(docs[0].text.contains("zebras"));
        Ok(())
    }

    #[tokio::test]
    async fn test_unsupported_file_is_rejected() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("slides.pptx");
        fs::write(&path, "binary")?;

        let ingestor = ingestor().await?;
        assert!(ingestor.add_file(&path, None, Metadata::new()).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_ingest_directory_routes_by_topic() -> anyhow::Result<()> {
        let dir = tempdir()?;
        fs::create_dir_all(dir.path().join("Physics"))?;
        fs::create_dir_all(dir.path().join(".hidden"))?;
        fs::write(dir.path().join("root.txt"), "Root level notes.")?;
        fs::write(dir.path().join("Physics").join("waves.txt"), "Waves carry energy.")?;
        fs::write(dir.path().join("Physics").join("ignored.md"), "Not supported.")?;
        fs::write(dir.path().join(".hidden").join("secret.txt"), "Hidden.")?;

        let ingestor = ingestor().await?;
        let summary = ingestor.ingest_directory(dir.path()).await?;
        assert_eq!(summary.files_indexed, 2);
        assert_eq!(summary.files_failed, 0);

        let store = ingestor.store();
        assert_eq!(store.stats("documents").await?.total_documents, 1);
        assert_eq!(store.stats("Physics").await?.total_documents, 1);

        assert_eq!(ingestor.flush_all().await?, 2);
        assert_eq!(store.stats("Physics").await?.total_documents, 0);
        Ok(())
    }
}
