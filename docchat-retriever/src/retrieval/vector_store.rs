//! Collection-aware adapter over a [`VectorDatabase`].
//!
//! [`VectorStore`] is the only writer-facing and reader-facing entry point to
//! stored documents. It caches collection handles, assigns document ids and
//! merges nearest-neighbour results across several collections (topics).
//!
//! ## Multi-collection queries
//!
//! An explicit `per_collection_k` caps what each collection contributes.
//! Without one, every collection gets a share of `max(1, k / n)` and the
//! merge is topped up from the nearest remaining hits of larger collections,
//! so the result holds `min(k, available)` documents. Empty collections are
//! skipped. The combined list is stably sorted by distance and truncated to
//! `k`. A collection whose query fails is logged and left out of the merge.

use crate::error::Result;
use crate::storage::{
    CollectionHandle, GetRequest, Metadata, MetadataValue, StoredDocument, VectorDatabase,
};
use futures::future::join_all;
use itertools::Itertools;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Collection used when no topic is selected.
pub const DEFAULT_COLLECTION: &str = "documents";

/// One ranked hit, tagged with the collection it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    /// Cosine distance, lower is closer
    pub distance: f32,
    pub collection: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CollectionStats {
    pub total_documents: usize,
}

pub struct VectorStore {
    db: Arc<dyn VectorDatabase>,
    default_collection: String,
    handles: RwLock<HashMap<String, CollectionHandle>>,
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("default_collection", &self.default_collection)
            .finish()
    }
}

impl VectorStore {
    pub fn new(db: Arc<dyn VectorDatabase>) -> Self {
        Self {
            db,
            default_collection: DEFAULT_COLLECTION.to_string(),
            handles: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_default_collection<S: Into<String>>(self, name: S) -> Self {
        Self {
            default_collection: name.into(),
            ..self
        }
    }

    pub fn default_collection(&self) -> &str {
        &self.default_collection
    }

    /// Get the handle for `name`, creating the collection on first use.
    ///
    /// Handles are cached, so repeated calls stay off the database.
    pub async fn create_or_get_collection(&self, name: &str) -> Result<CollectionHandle> {
        if let Some(handle) = self.handles.read().await.get(name) {
            return Ok(handle.clone());
        }

        let handle = self.db.create_collection(name).await?;
        debug!("Cached handle for collection {name}");
        self.handles
            .write()
            .await
            .insert(name.to_string(), handle.clone());
        Ok(handle)
    }

    /// Store one document and return its id (a fresh UUID v4 unless given).
    pub async fn add(
        &self,
        collection: &str,
        text: &str,
        metadata: Metadata,
        id: Option<String>,
    ) -> Result<String> {
        let mut ids = self
            .add_batch(collection, vec![(id, text.to_string(), metadata)])
            .await?;
        Ok(ids.pop().unwrap_or_default())
    }

    /// Store many documents with a single database call.
    pub async fn add_batch(
        &self,
        collection: &str,
        documents: Vec<(Option<String>, String, Metadata)>,
    ) -> Result<Vec<String>> {
        let handle = self.create_or_get_collection(collection).await?;

        let mut ids = Vec::with_capacity(documents.len());
        let mut texts = Vec::with_capacity(documents.len());
        let mut metadatas = Vec::with_capacity(documents.len());
        for (id, text, metadata) in documents {
            ids.push(id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()));
            texts.push(text);
            metadatas.push(metadata);
        }

        self.db
            .add(&handle.name, ids.clone(), texts, metadatas)
            .await?;
        Ok(ids)
    }

    /// The `k` closest documents to `query_text` across `collections`.
    ///
    /// An empty `collections` slice means the default collection.
    pub async fn query(
        &self,
        collections: &[String],
        query_text: &str,
        k: usize,
        per_collection_k: Option<usize>,
    ) -> Result<Vec<QueryResult>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let names: Vec<&str> = if collections.is_empty() {
            vec![self.default_collection.as_str()]
        } else {
            collections.iter().map(String::as_str).unique().collect()
        };

        if let [name] = names.as_slice() {
            return self.query_collection(name, query_text, k).await;
        }

        // An explicit per-collection count is a hard cap. The default is a
        // fair share per collection, topped up from the nearest leftovers
        // when some collections hold fewer documents than their share.
        let fair_share = per_collection_k.unwrap_or_else(|| (k / names.len()).max(1));
        let fetch = per_collection_k.unwrap_or(k);
        let searches = names.iter().map(|name| async move {
            let outcome = match self.stats(name).await {
                Ok(stats) if stats.total_documents == 0 => {
                    debug!("Skipping empty collection {name}");
                    Ok(Vec::new())
                }
                Ok(_) => self.query_collection(name, query_text, fetch).await,
                Err(e) => Err(e),
            };
            (*name, outcome)
        });

        let mut merged = Vec::new();
        let mut spare = Vec::new();
        for (name, outcome) in join_all(searches).await {
            match outcome {
                Ok(mut results) => {
                    spare.extend(results.split_off(fair_share.min(results.len())));
                    merged.extend(results);
                }
                Err(e) => warn!("Query against collection {name} failed: {e}"),
            }
        }

        if merged.len() < k && !spare.is_empty() {
            spare.sort_by(|a, b| a.distance.total_cmp(&b.distance));
            let missing = k - merged.len();
            debug!("Backfilling up to {missing} results from larger collections");
            merged.extend(spare.into_iter().take(missing));
        }

        merged.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        merged.truncate(k);
        Ok(merged)
    }

    async fn query_collection(
        &self,
        collection: &str,
        query_text: &str,
        n_results: usize,
    ) -> Result<Vec<QueryResult>> {
        let handle = self.create_or_get_collection(collection).await?;
        let response = self
            .db
            .query(&handle.name, &[query_text.to_string()], n_results)
            .await?;

        let (Some(ids), Some(documents), Some(metadatas), Some(distances)) = (
            response.ids.into_iter().next(),
            response.documents.into_iter().next(),
            response.metadatas.into_iter().next(),
            response.distances.into_iter().next(),
        ) else {
            return Ok(Vec::new());
        };

        Ok(ids
            .into_iter()
            .zip(documents)
            .zip(metadatas)
            .zip(distances)
            .map(|(((id, text), metadata), distance)| QueryResult {
                id,
                text,
                metadata,
                distance,
                collection: handle.name.clone(),
            })
            .collect())
    }

    /// Delete every document whose `metadata[key] == value`. Returns how many
    /// were removed; zero matches is not an error.
    pub async fn delete_by_metadata<V: Into<MetadataValue>>(
        &self,
        collection: &str,
        key: &str,
        value: V,
    ) -> Result<usize> {
        let handle = self.create_or_get_collection(collection).await?;
        let value = value.into();
        let matching = self
            .db
            .get(&handle.name, GetRequest::filter(key, value.clone()))
            .await?;
        if matching.is_empty() {
            debug!("No documents in {collection} with {key} = {value}");
            return Ok(0);
        }

        let deleted = self.db.delete(&handle.name, &matching.ids).await?;
        info!("Deleted {deleted} documents from {collection} with {key} = {value}");
        Ok(deleted)
    }

    /// Ids of the documents whose metadata has `key` = `value`.
    pub async fn ids_by_metadata<V: Into<MetadataValue>>(
        &self,
        collection: &str,
        key: &str,
        value: V,
    ) -> Result<Vec<String>> {
        let handle = self.create_or_get_collection(collection).await?;
        let matching = self
            .db
            .get(&handle.name, GetRequest::filter(key, value.into()))
            .await?;
        Ok(matching.ids)
    }

    /// Delete documents by id. Returns how many existed.
    pub async fn delete_ids(&self, collection: &str, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let handle = self.create_or_get_collection(collection).await?;
        self.db.delete(&handle.name, ids).await
    }

    /// Delete every document in the collection. The collection itself stays.
    pub async fn flush(&self, collection: &str) -> Result<usize> {
        let handle = self.create_or_get_collection(collection).await?;
        let all = self.db.get(&handle.name, GetRequest::all()).await?;
        let deleted = self.db.delete(&handle.name, &all.ids).await?;
        info!("Flushed {deleted} documents from {collection}");
        Ok(deleted)
    }

    pub async fn stats(&self, collection: &str) -> Result<CollectionStats> {
        let handle = self.create_or_get_collection(collection).await?;
        let total_documents = self.db.count(&handle.name).await?;
        Ok(CollectionStats { total_documents })
    }

    pub async fn list_collections(&self) -> Result<Vec<String>> {
        self.db.list_collections().await
    }

    /// Full records, either all of them or the given ids.
    pub async fn get_documents(
        &self,
        collection: &str,
        ids: Option<Vec<String>>,
    ) -> Result<Vec<StoredDocument>> {
        let handle = self.create_or_get_collection(collection).await?;
        let request = match ids {
            Some(ids) => GetRequest::ids(ids),
            None => GetRequest::all(),
        };
        Ok(self.db.get(&handle.name, request).await?.into_documents())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::storage::{GetResponse, QueryResponse, SqliteVectorDatabase};
    use async_trait::async_trait;
    use docchat_embed::HashEmbedProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Wraps the SQLite database, counting collection lookups and failing
    /// queries against one collection.
    struct InstrumentedDatabase {
        inner: SqliteVectorDatabase,
        create_calls: AtomicUsize,
        failing_collection: Option<String>,
    }

    #[async_trait]
    impl VectorDatabase for InstrumentedDatabase {
        async fn create_collection(&self, name: &str) -> Result<CollectionHandle> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.create_collection(name).await
        }

        async fn list_collections(&self) -> Result<Vec<String>> {
            self.inner.list_collections().await
        }

        async fn add(
            &self,
            collection: &str,
            ids: Vec<String>,
            documents: Vec<String>,
            metadatas: Vec<Metadata>,
        ) -> Result<()> {
            self.inner.add(collection, ids, documents, metadatas).await
        }

        async fn query(
            &self,
            collection: &str,
            query_texts: &[String],
            n_results: usize,
        ) -> Result<QueryResponse> {
            if self.failing_collection.as_deref() == Some(collection) {
                return Err(StoreError::collection_not_found(collection));
            }
            self.inner.query(collection, query_texts, n_results).await
        }

        async fn get(&self, collection: &str, request: GetRequest) -> Result<GetResponse> {
            self.inner.get(collection, request).await
        }

        async fn delete(&self, collection: &str, ids: &[String]) -> Result<usize> {
            self.inner.delete(collection, ids).await
        }

        async fn count(&self, collection: &str) -> Result<usize> {
            self.inner.count(collection).await
        }
    }

    async fn instrumented(failing: Option<&str>) -> Result<Arc<InstrumentedDatabase>> {
        let inner = SqliteVectorDatabase::open_memory(Arc::new(HashEmbedProvider::default())).await?;
        Ok(Arc::new(InstrumentedDatabase {
            inner,
            create_calls: AtomicUsize::new(0),
            failing_collection: failing.map(str::to_string),
        }))
    }

    fn meta(source_file: &str) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("source_file".into(), source_file.into());
        metadata
    }

    async fn store_with(
        db: Arc<InstrumentedDatabase>,
        docs: &[(&str, &str, &str)],
    ) -> Result<VectorStore> {
        let store = VectorStore::new(db);
        for (collection, text, file) in docs {
            store.add(collection, text, meta(file), None).await?;
        }
        Ok(store)
    }

    #[tokio::test]
    async fn test_collection_handles_are_cached() -> anyhow::Result<()> {
        let db = instrumented(None).await?;
        let store = VectorStore::new(db.clone());

        let first = store.create_or_get_collection("physics").await?;
        let second = store.create_or_get_collection("physics").await?;
        assert_eq!(first, second);
        assert_eq!(db.create_calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_add_assigns_uuid_unless_given() -> anyhow::Result<()> {
        let store = VectorStore::new(instrumented(None).await?);
        let generated = store.add("documents", "text", Metadata::new(), None).await?;
        assert!(uuid::Uuid::parse_str(&generated).is_ok());

        let chosen = store
            .add("documents", "text", Metadata::new(), Some("fixed".into()))
            .await?;
        assert_eq!(chosen, "fixed");
        assert_eq!(store.stats("documents").await?.total_documents, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_single_collection_query() -> anyhow::Result<()> {
        let store = store_with(
            instrumented(None).await?,
            &[
                ("documents", "The sky is blue.", "facts.txt"),
                ("documents", "Water is wet.", "facts.txt"),
                ("documents", "Fire is hot.", "facts.txt"),
            ],
        )
        .await?;

        let results = store.query(&[], "What color is the sky?", 2, None).await?;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].text, "The sky is blue.");
        assert!(results.iter().all(|r| r.collection == "documents"));
        assert!(store.query(&[], "sky", 0, None).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_multi_collection_merge_respects_per_collection_k() -> anyhow::Result<()> {
        let mut docs = vec![];
        for _ in 0..5 {
            docs.push(("A", "cache memory hierarchy levels", "a.txt"));
        }
        docs.push(("B", "pipeline hazards and memory stalls", "b.txt"));
        let store = store_with(instrumented(None).await?, &docs).await?;

        let topics = vec!["A".to_string(), "B".to_string()];
        let results = store.query(&topics, "memory", 4, Some(2)).await?;

        assert!(results.len() <= 4);
        assert!(results.iter().filter(|r| r.collection == "A").count() <= 2);
        assert!(results.iter().any(|r| r.collection == "B"));
        assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));
        Ok(())
    }

    #[tokio::test]
    async fn test_multi_collection_default_split_and_empty_skip() -> anyhow::Result<()> {
        let store = store_with(
            instrumented(None).await?,
            &[
                ("A", "one fact", "a.txt"),
                ("A", "two facts", "a.txt"),
                ("A", "three facts", "a.txt"),
            ],
        )
        .await?;
        store.create_or_get_collection("Empty").await?;

        let topics = vec!["A".to_string(), "Empty".to_string()];
        // A's share is 2, topped up with its third document since Empty has none
        let results = store.query(&topics, "facts", 4, None).await?;
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.collection == "A"));
        Ok(())
    }

    #[tokio::test]
    async fn test_uneven_collections_fill_up_to_k() -> anyhow::Result<()> {
        let store = store_with(
            instrumented(None).await?,
            &[
                ("A", "cache lines hold memory words", "a.txt"),
                ("A", "memory latency dominates", "a.txt"),
                ("A", "caches exploit locality", "a.txt"),
                ("B", "pipeline stalls on memory", "b.txt"),
                ("C", "branch predictors guess", "c.txt"),
                ("C", "memory barriers order stores", "c.txt"),
            ],
        )
        .await?;
        let topics = vec!["A".to_string(), "B".to_string(), "C".to_string()];

        for k in 1..=8 {
            let results = store.query(&topics, "memory", k, None).await?;
            assert_eq!(results.len(), k.min(6), "k = {k}");
            assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));
            assert!(results.iter().all(|r| topics.contains(&r.collection)));
        }

        // Shares of 2 from A and C plus B's only document, then one more
        let results = store.query(&topics, "memory", 6, None).await?;
        let ids: std::collections::HashSet<_> = results.iter().map(|r| &r.id).collect();
        assert_eq!(ids.len(), 6);
        Ok(())
    }

    #[tokio::test]
    async fn test_failing_collection_is_excluded() -> anyhow::Result<()> {
        let store = store_with(
            instrumented(Some("B")).await?,
            &[("A", "alpha text", "a.txt"), ("B", "beta text", "b.txt")],
        )
        .await?;

        let topics = vec!["A".to_string(), "B".to_string()];
        let results = store.query(&topics, "text", 4, Some(2)).await?;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].collection, "A");
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_by_metadata_and_flush() -> anyhow::Result<()> {
        let store = store_with(
            instrumented(None).await?,
            &[
                ("documents", "old one", "notes.txt"),
                ("documents", "old two", "notes.txt"),
                ("documents", "other", "other.txt"),
            ],
        )
        .await?;

        assert_eq!(
            store
                .delete_by_metadata("documents", "source_file", "notes.txt")
                .await?,
            2
        );
        assert_eq!(
            store
                .delete_by_metadata("documents", "source_file", "notes.txt")
                .await?,
            0
        );

        let remaining = store.get_documents("documents", None).await?;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].text, "other");

        assert_eq!(store.flush("documents").await?, 1);
        assert_eq!(store.stats("documents").await?.total_documents, 0);
        assert_eq!(store.list_collections().await?, vec!["documents"]);
        Ok(())
    }
}
