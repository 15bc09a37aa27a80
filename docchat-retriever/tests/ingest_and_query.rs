//! End-to-end tests for the write path (files → chunks → store) and the read
//! path (multi-topic queries), using the hashing embedder so no model is
//! downloaded.

use anyhow::Result;
use async_trait::async_trait;
use docchat_context::{Chunker, ChunkingMethod, ChunkingParams, StrategyChunker};
use docchat_embed::{EmbeddingProvider, EmbeddingResult, HashEmbedProvider};
use docchat_retriever::{
    Debouncer, FileChangeHandler, IngestHandler, Ingestor, Metadata, SqliteVectorDatabase,
    VectorStore,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::time::sleep;

/// Hashing embedder that takes a while, so re-indexes stay in flight.
#[derive(Default)]
struct SlowEmbedder {
    inner: HashEmbedProvider,
}

#[async_trait]
impl EmbeddingProvider for SlowEmbedder {
    async fn embed_texts(&self, texts: &[String]) -> docchat_embed::Result<EmbeddingResult> {
        sleep(Duration::from_millis(300)).await;
        self.inner.embed_texts(texts).await
    }

    fn embedding_dimension(&self) -> usize {
        self.inner.embedding_dimension()
    }

    fn provider_name(&self) -> &str {
        "slow-hash"
    }
}

async fn ingestor_at(db_path: &Path) -> Result<Arc<Ingestor>> {
    ingestor_with(db_path, Arc::new(HashEmbedProvider::default())).await
}

async fn ingestor_with(
    db_path: &Path,
    embedder: Arc<dyn EmbeddingProvider>,
) -> Result<Arc<Ingestor>> {
    let db = SqliteVectorDatabase::open(db_path, embedder).await?;
    let store = Arc::new(VectorStore::new(Arc::new(db)));
    let chunker = StrategyChunker::new(
        Chunker::new(),
        ChunkingMethod::Sentence,
        ChunkingParams::default().with_chunk_size(5),
    );
    Ok(Arc::new(Ingestor::new(store, Arc::new(chunker))))
}

#[tokio::test]
async fn test_sky_is_blue() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("facts.txt");
    std::fs::write(&path, "The sky is blue. Water is wet. Fire is hot.")?;

    let ingestor = ingestor_at(&dir.path().join("docchat.db")).await?;
    let report = ingestor.add_file(&path, None, Metadata::new()).await?;
    assert_eq!(report.chunks_added, 3);

    let results = ingestor
        .store()
        .query(&[], "What color is the sky?", 3, None)
        .await?;
    assert_eq!(results.len(), 3);
    assert!(results[0].text.contains("sky is blue"));
    assert_eq!(results[0].collection, "documents");
    assert_eq!(results[0].metadata["source_file"].as_str(), Some("facts.txt"));
    Ok(())
}

#[tokio::test]
async fn test_two_topics_merge() -> Result<()> {
    let dir = tempdir()?;
    let docs = dir.path().join("Docs");
    std::fs::create_dir_all(docs.join("A"))?;
    std::fs::create_dir_all(docs.join("B"))?;
    for i in 0..5 {
        std::fs::write(
            docs.join("A").join(format!("cache{i}.txt")),
            format!("Cache memory note number {i}."),
        )?;
    }
    std::fs::write(docs.join("B").join("pipeline.txt"), "Pipeline stalls wait on memory.")?;

    let ingestor = ingestor_at(&dir.path().join("docchat.db")).await?;
    let summary = ingestor.ingest_directory(&docs).await?;
    assert_eq!(summary.files_indexed, 6);

    let topics = vec!["A".to_string(), "B".to_string()];
    let results = ingestor.store().query(&topics, "memory", 4, Some(2)).await?;

    assert!(results.len() <= 4);
    assert!(results.iter().filter(|r| r.collection == "A").count() <= 2);
    assert!(results.iter().any(|r| r.collection == "B"));
    assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));
    assert!(results.iter().all(|r| topics.contains(&r.collection)));
    Ok(())
}

#[tokio::test]
async fn test_reindex_drops_old_content() -> Result<()> {
    let dir = tempdir()?;
    let docs = dir.path().join("Docs");
    std::fs::create_dir_all(docs.join("Biology"))?;
    let path = docs.join("Biology").join("animals.txt");
    std::fs::write(&path, "Zebras graze on the savanna.")?;

    let ingestor = ingestor_at(&dir.path().join("docchat.db")).await?;
    let handler = IngestHandler::new(ingestor.clone(), docs.clone());
    handler.file_changed(&path).await?;

    std::fs::write(&path, "Giraffes eat acacia leaves.")?;
    handler.file_changed(&path).await?;

    let topics = vec!["Biology".to_string()];
    let results = ingestor.store().query(&topics, "zebras savanna", 5, None).await?;
    assert!(!results.is_empty());
    assert!(results.iter().all(|r| !r.text.contains("Zebras")));
    assert!(results[0].text.contains("Giraffes"));
    Ok(())
}

#[tokio::test]
async fn test_deleted_file_is_removed() -> Result<()> {
    let dir = tempdir()?;
    let docs = dir.path().join("Docs");
    std::fs::create_dir_all(docs.join("Physics"))?;
    let keep = docs.join("Physics").join("waves.txt");
    let gone = docs.join("Physics").join("optics.txt");
    std::fs::write(&keep, "Waves carry energy.")?;
    std::fs::write(&gone, "Lenses bend light. Mirrors reflect it.")?;

    let ingestor = ingestor_at(&dir.path().join("docchat.db")).await?;
    ingestor.ingest_directory(&docs).await?;
    let store = ingestor.store();
    assert_eq!(store.stats("Physics").await?.total_documents, 3);

    std::fs::remove_file(&gone)?;
    let handler = IngestHandler::new(ingestor.clone(), docs.clone());
    handler.file_removed(&gone).await?;

    let remaining = store.get_documents("Physics", None).await?;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].metadata["source_file"].as_str(), Some("waves.txt"));
    Ok(())
}

#[tokio::test]
async fn test_overlapping_modifies_keep_one_copy() -> Result<()> {
    let dir = tempdir()?;
    let docs = dir.path().join("Docs");
    std::fs::create_dir_all(docs.join("Biology"))?;
    let path = docs.join("Biology").join("animals.txt");
    std::fs::write(&path, "Zebras graze on the savanna.")?;

    let ingestor =
        ingestor_with(&dir.path().join("docchat.db"), Arc::new(SlowEmbedder::default())).await?;
    let handler = Arc::new(IngestHandler::new(ingestor.clone(), docs.clone()));
    let debouncer = Debouncer::new(Duration::from_millis(50), handler);

    debouncer.schedule(path.clone()).await;
    // The first re-index is embedding when the second change lands
    sleep(Duration::from_millis(120)).await;
    debouncer.schedule(path.clone()).await;
    sleep(Duration::from_millis(1500)).await;

    let store = ingestor.store();
    assert_eq!(store.stats("Biology").await?.total_documents, 1);
    let remaining = store.get_documents("Biology", None).await?;
    assert_eq!(
        remaining[0].metadata["source_path"].as_str(),
        Some("Biology/animals.txt")
    );
    Ok(())
}

#[tokio::test]
async fn test_delete_during_reindex_leaves_nothing() -> Result<()> {
    let dir = tempdir()?;
    let docs = dir.path().join("Docs");
    std::fs::create_dir_all(docs.join("Biology"))?;
    let path = docs.join("Biology").join("animals.txt");
    std::fs::write(&path, "Zebras graze on the savanna.")?;

    let ingestor =
        ingestor_with(&dir.path().join("docchat.db"), Arc::new(SlowEmbedder::default())).await?;
    let handler = Arc::new(IngestHandler::new(ingestor.clone(), docs.clone()));
    let debouncer = Debouncer::new(Duration::from_millis(50), handler);

    debouncer.schedule(path.clone()).await;
    sleep(Duration::from_millis(120)).await;
    std::fs::remove_file(&path)?;
    debouncer.remove(&path).await?;
    sleep(Duration::from_millis(500)).await;

    assert!(!debouncer.is_pending(&path).await);
    assert_eq!(ingestor.store().stats("Biology").await?.total_documents, 0);
    Ok(())
}

#[tokio::test]
async fn test_uneven_topics_fill_up_to_k() -> Result<()> {
    let dir = tempdir()?;
    let docs = dir.path().join("Docs");
    let topics = [("A", 3), ("B", 1), ("C", 2)];
    for (topic, count) in topics {
        std::fs::create_dir_all(docs.join(topic))?;
        for i in 0..count {
            std::fs::write(
                docs.join(topic).join(format!("note{i}.txt")),
                format!("Memory note {i} about {topic}."),
            )?;
        }
    }

    let ingestor = ingestor_at(&dir.path().join("docchat.db")).await?;
    ingestor.ingest_directory(&docs).await?;

    let names: Vec<String> = topics.iter().map(|(t, _)| t.to_string()).collect();
    for k in [1, 2, 4, 5, 6, 10] {
        let results = ingestor.store().query(&names, "memory", k, None).await?;
        assert_eq!(results.len(), k.min(6), "k = {k}");
        assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));
        assert!(results.iter().all(|r| names.contains(&r.collection)));
    }
    Ok(())
}
