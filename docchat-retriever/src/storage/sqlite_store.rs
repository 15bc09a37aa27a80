//! SQLite implementation of [`VectorDatabase`]
//!
//! Documents and their f16 embeddings live in one SQLite file next to the
//! collection table. Similarity search is an in-memory cosine scan over the
//! collection, which is plenty for a few thousand course documents.
//!
//! ## Database Schema
//!
//! ```sql
//! CREATE TABLE collections (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     name TEXT UNIQUE NOT NULL,
//!     created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
//! );
//!
//! CREATE TABLE documents (
//!     collection_id INTEGER NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
//!     id TEXT NOT NULL,                -- UUID v4 unless the caller chose one
//!     content TEXT NOT NULL,
//!     metadata TEXT NOT NULL,          -- JSON object of scalars
//!     embedding BLOB NOT NULL,         -- f16 vector
//!     created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
//!     PRIMARY KEY (collection_id, id)
//! );
//! ```

use super::{
    CollectionHandle, GetRequest, GetResponse, Metadata, QueryResponse, VectorDatabase,
};
use crate::error::{Result, StoreError};
use async_trait::async_trait;
use docchat_embed::EmbeddingProvider;
use half::f16;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Vector database backed by SQLite and an embedding provider.
#[derive(Clone)]
pub struct SqliteVectorDatabase {
    pool: SqlitePool,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl std::fmt::Debug for SqliteVectorDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteVectorDatabase")
            .field("embedder", &self.embedder.provider_name())
            .finish()
    }
}

struct DocumentRow {
    id: String,
    content: String,
    metadata: Metadata,
    embedding: Vec<f16>,
}

impl SqliteVectorDatabase {
    /// Open (or create) the database file at `db_path`.
    pub async fn open(db_path: &Path, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(db_path)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .foreign_keys(true)
                .create_if_missing(true)
                .page_size(1 << 16),
        )
        .await?;
        info!("Opened vector database at {}", db_path.display());
        Self::new_with_pool(pool, embedder).await
    }

    /// In-memory database for tests.
    ///
    /// Every SQLite connection to `:memory:` is its own database, so the pool
    /// is pinned to a single connection that is never recycled.
    pub async fn open_memory(embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None::<std::time::Duration>)
            .max_lifetime(None::<std::time::Duration>)
            .connect_with(SqliteConnectOptions::new().in_memory(true).foreign_keys(true))
            .await?;
        Self::new_with_pool(pool, embedder).await
    }

    async fn new_with_pool(pool: SqlitePool, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        Self::create_tables(&pool).await?;
        Ok(Self { pool, embedder })
    }

    async fn create_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS collections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT UNIQUE NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection_id INTEGER NOT NULL,
                id TEXT NOT NULL,
                content TEXT NOT NULL,
                metadata TEXT NOT NULL,
                embedding BLOB NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (collection_id, id),
                FOREIGN KEY (collection_id) REFERENCES collections(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection_id)",
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    async fn collection_id(&self, name: &str) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT id FROM collections WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::collection_not_found(name))
    }

    async fn load_documents(&self, collection_id: i64) -> Result<Vec<DocumentRow>> {
        let rows = sqlx::query(
            "SELECT id, content, metadata, embedding FROM documents WHERE collection_id = ?1 ORDER BY rowid",
        )
        .bind(collection_id)
        .fetch_all(&self.pool)
        .await?;

        let mut documents = Vec::with_capacity(rows.len());
        for row in rows {
            let metadata: String = row.get("metadata");
            let embedding: Vec<u8> = row.get("embedding");
            documents.push(DocumentRow {
                id: row.get("id"),
                content: row.get("content"),
                metadata: serde_json::from_str(&metadata)?,
                embedding: decode_embedding(&embedding),
            });
        }
        Ok(documents)
    }
}

/// BLOBs from SQLite carry no alignment guarantee, so decode pairwise
/// instead of casting the slice.
fn decode_embedding(bytes: &[u8]) -> Vec<f16> {
    bytes
        .chunks_exact(2)
        .map(|pair| f16::from_ne_bytes([pair[0], pair[1]]))
        .collect()
}

/// Cosine distance `1 - cos(a, b)`, clamped at 0.
///
/// Vectors of different length or zero norm are treated as unrelated
/// (distance 1).
pub fn cosine_distance(a: &[f16], b: &[f16]) -> f32 {
    if a.len() != b.len() {
        return 1.0;
    }

    let mut dot_product = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (x.to_f32(), y.to_f32());
        dot_product += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    (1.0 - dot_product / (norm_a.sqrt() * norm_b.sqrt())).max(0.0)
}

#[async_trait]
impl VectorDatabase for SqliteVectorDatabase {
    async fn create_collection(&self, name: &str) -> Result<CollectionHandle> {
        sqlx::query("INSERT OR IGNORE INTO collections (name) VALUES (?1)")
            .bind(name)
            .execute(&self.pool)
            .await?;
        let id = self.collection_id(name).await?;
        debug!("Collection {name} has id {id}");
        Ok(CollectionHandle {
            id,
            name: name.to_string(),
        })
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>("SELECT name FROM collections ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(names)
    }

    async fn add(
        &self,
        collection: &str,
        ids: Vec<String>,
        documents: Vec<String>,
        metadatas: Vec<Metadata>,
    ) -> Result<()> {
        if ids.len() != documents.len() || ids.len() != metadatas.len() {
            return Err(StoreError::BatchMismatch {
                ids: ids.len(),
                documents: documents.len(),
                metadatas: metadatas.len(),
            });
        }
        if ids.is_empty() {
            return Ok(());
        }

        let collection_id = self.collection_id(collection).await?;
        let embeddings = self.embedder.embed_texts(&documents).await?;
        if embeddings.len() != documents.len() {
            return Err(StoreError::EmbeddingCount {
                expected: documents.len(),
                actual: embeddings.len(),
            });
        }

        let mut tx = self.pool.begin().await?;
        for (((id, content), metadata), embedding) in ids
            .iter()
            .zip(&documents)
            .zip(&metadatas)
            .zip(&embeddings.embeddings)
        {
            sqlx::query(
                r#"
                INSERT INTO documents (collection_id, id, content, metadata, embedding)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(collection_id, id) DO UPDATE SET
                    content = excluded.content,
                    metadata = excluded.metadata,
                    embedding = excluded.embedding
                "#,
            )
            .bind(collection_id)
            .bind(id)
            .bind(content)
            .bind(serde_json::to_string(metadata)?)
            .bind(bytemuck::cast_slice::<f16, u8>(embedding))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!("Stored {} documents in {collection}", ids.len());
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        query_texts: &[String],
        n_results: usize,
    ) -> Result<QueryResponse> {
        let collection_id = self.collection_id(collection).await?;
        let mut response = QueryResponse::default();
        if query_texts.is_empty() {
            return Ok(response);
        }

        let documents = self.load_documents(collection_id).await?;
        let queries = self.embedder.embed_texts(query_texts).await?;

        for query in &queries.embeddings {
            let mut ranked: Vec<(f32, &DocumentRow)> = documents
                .iter()
                .map(|doc| (cosine_distance(query, &doc.embedding), doc))
                .collect();
            ranked.sort_by(|a, b| a.0.total_cmp(&b.0));
            ranked.truncate(n_results);

            response
                .ids
                .push(ranked.iter().map(|(_, d)| d.id.clone()).collect());
            response
                .documents
                .push(ranked.iter().map(|(_, d)| d.content.clone()).collect());
            response
                .metadatas
                .push(ranked.iter().map(|(_, d)| d.metadata.clone()).collect());
            response
                .distances
                .push(ranked.iter().map(|(distance, _)| *distance).collect());
        }
        Ok(response)
    }

    async fn get(&self, collection: &str, request: GetRequest) -> Result<GetResponse> {
        let collection_id = self.collection_id(collection).await?;
        let limit = request.limit.unwrap_or(usize::MAX);

        let mut response = GetResponse::default();
        for doc in self.load_documents(collection_id).await? {
            if response.len() >= limit {
                break;
            }
            if request.matches(&doc.id, &doc.metadata) {
                response.ids.push(doc.id);
                response.documents.push(doc.content);
                response.metadatas.push(doc.metadata);
            }
        }
        Ok(response)
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<usize> {
        let collection_id = self.collection_id(collection).await?;
        let mut deleted = 0;

        let mut tx = self.pool.begin().await?;
        for id in ids {
            let result = sqlx::query("DELETE FROM documents WHERE collection_id = ?1 AND id = ?2")
                .bind(collection_id)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            deleted += result.rows_affected() as usize;
        }
        tx.commit().await?;

        Ok(deleted)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collection_id = self.collection_id(collection).await?;
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM documents WHERE collection_id = ?1")
                .bind(collection_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docchat_embed::HashEmbedProvider;
    use tempfile::tempdir;

    async fn memory_db() -> Result<SqliteVectorDatabase> {
        SqliteVectorDatabase::open_memory(Arc::new(HashEmbedProvider::default())).await
    }

    fn source(file: &str) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("source_file".into(), file.into());
        metadata
    }

    #[tokio::test]
    async fn test_add_query_and_count() -> anyhow::Result<()> {
        let db = memory_db().await?;
        db.create_collection("documents").await?;
        db.add(
            "documents",
            vec!["1".into(), "2".into(), "3".into()],
            vec![
                "The sky is blue.".into(),
                "Water is wet.".into(),
                "Fire is hot.".into(),
            ],
            vec![source("a.txt"), source("a.txt"), source("b.txt")],
        )
        .await?;
        assert_eq!(db.count("documents").await?, 3);

        let response = db
            .query("documents", &["What color is the sky?".to_string()], 2)
            .await?;
        assert_eq!(response.ids.len(), 1);
        assert_eq!(response.ids[0].len(), 2);
        assert_eq!(response.documents[0][0], "The sky is blue.");
        assert!(response.distances[0][0] <= response.distances[0][1]);
        assert!(response.distances[0].iter().all(|d| *d >= 0.0));
        Ok(())
    }

    #[tokio::test]
    async fn test_create_collection_is_idempotent() -> anyhow::Result<()> {
        let db = memory_db().await?;
        let first = db.create_collection("physics").await?;
        let second = db.create_collection("physics").await?;
        assert_eq!(first, second);
        db.create_collection("chemistry").await?;
        assert_eq!(db.list_collections().await?, vec!["chemistry", "physics"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_collection_is_an_error() -> anyhow::Result<()> {
        let db = memory_db().await?;
        let err = db.count("nope").await.unwrap_err();
        assert!(matches!(err, StoreError::CollectionNotFound { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_get_filter_and_delete() -> anyhow::Result<()> {
        let db = memory_db().await?;
        db.create_collection("documents").await?;
        db.add(
            "documents",
            vec!["1".into(), "2".into(), "3".into()],
            vec!["one".into(), "two".into(), "three".into()],
            vec![source("a.txt"), source("b.txt"), source("a.txt")],
        )
        .await?;

        let from_a = db
            .get("documents", GetRequest::filter("source_file", "a.txt"))
            .await?;
        assert_eq!(from_a.ids, vec!["1", "3"]);
        assert_eq!(from_a.documents, vec!["one", "three"]);

        let limited = db.get("documents", GetRequest::all().with_limit(1)).await?;
        assert_eq!(limited.len(), 1);

        assert_eq!(db.delete("documents", &from_a.ids).await?, 2);
        assert_eq!(db.delete("documents", &from_a.ids).await?, 0);
        assert_eq!(db.count("documents").await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_add_overwrites_existing_id() -> anyhow::Result<()> {
        let db = memory_db().await?;
        db.create_collection("documents").await?;
        db.add("documents", vec!["1".into()], vec!["old".into()], vec![source("a.txt")])
            .await?;
        db.add("documents", vec!["1".into()], vec!["new".into()], vec![source("a.txt")])
            .await?;

        let all = db.get("documents", GetRequest::all()).await?;
        assert_eq!(all.documents, vec!["new"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_add_rejects_mismatched_batch() -> anyhow::Result<()> {
        let db = memory_db().await?;
        db.create_collection("documents").await?;
        let err = db
            .add("documents", vec!["1".into()], vec![], vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::BatchMismatch { ids: 1, .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_file_database_persists() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join("docchat.db");
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashEmbedProvider::default());
        {
            let db = SqliteVectorDatabase::open(&path, Arc::clone(&embedder)).await?;
            db.create_collection("documents").await?;
            db.add("documents", vec!["1".into()], vec!["kept".into()], vec![source("a.txt")])
                .await?;
        }
        let db = SqliteVectorDatabase::open(&path, embedder).await?;
        assert_eq!(db.count("documents").await?, 1);
        Ok(())
    }

    #[test]
    fn test_cosine_distance() {
        let a = vec![f16::from_f32(1.0), f16::from_f32(0.0)];
        let b = vec![f16::from_f32(0.0), f16::from_f32(1.0)];
        let c = vec![f16::from_f32(-1.0), f16::from_f32(0.0)];
        assert!(cosine_distance(&a, &a).abs() < 1e-3);
        assert!((cosine_distance(&a, &b) - 1.0).abs() < 1e-3);
        assert!((cosine_distance(&a, &c) - 2.0).abs() < 1e-3);

        let zero = vec![f16::ZERO, f16::ZERO];
        assert_eq!(cosine_distance(&a, &zero), 1.0);
        assert_eq!(cosine_distance(&a, &[f16::ONE]), 1.0);
    }

    #[test]
    fn test_embedding_blob_round_trip() {
        let embedding = vec![f16::from_f32(0.25), f16::from_f32(-1.5)];
        let bytes = bytemuck::cast_slice::<f16, u8>(&embedding).to_vec();
        assert_eq!(decode_embedding(&bytes), embedding);
    }
}
