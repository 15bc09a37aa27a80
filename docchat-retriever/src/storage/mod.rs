//! Storage abstraction for named collections of embedded documents
//!
//! The [`VectorDatabase`] trait is the collaborator the retrieval layer talks
//! to. It owns embedding (through an
//! [`EmbeddingProvider`](docchat_embed::EmbeddingProvider)) and
//! nearest-neighbour search, so callers only ever hand it text.
//!
//! ## Key Components
//!
//! - **VectorDatabase**: collection-scoped add, query, get, delete and count
//! - **SqliteVectorDatabase**: sqlx implementation with f16 embedding BLOBs
//! - **Data Types**: [`Metadata`], [`QueryResponse`], [`GetRequest`], [`GetResponse`]
//!
//! ## Architecture
//!
//! ```text
//! VectorStore ── VectorDatabase ── SqliteVectorDatabase ── EmbeddingProvider
//! ```

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub mod sqlite_store;

pub use sqlite_store::SqliteVectorDatabase;

/// A scalar metadata value.
///
/// Untagged so that metadata round-trips through JSON as plain values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetadataValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Bool(b) => write!(f, "{b}"),
            MetadataValue::Int(i) => write!(f, "{i}"),
            MetadataValue::Float(x) => write!(f, "{x}"),
            MetadataValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Str(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Str(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Int(value)
    }
}

impl From<usize> for MetadataValue {
    fn from(value: usize) -> Self {
        MetadataValue::Int(value as i64)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

/// Document metadata. Sorted by key, which keeps rendered output stable.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A collection as known to the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionHandle {
    pub id: i64,
    pub name: String,
}

/// A stored document without its embedding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredDocument {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
}

/// Nearest neighbours for a batch of query texts.
///
/// Every field holds one inner vector per query text, ranked by ascending
/// distance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResponse {
    pub ids: Vec<Vec<String>>,
    pub documents: Vec<Vec<String>>,
    pub metadatas: Vec<Vec<Metadata>>,
    pub distances: Vec<Vec<f32>>,
}

/// Selection for [`VectorDatabase::get`]. Both criteria apply when set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetRequest {
    pub ids: Option<Vec<String>>,
    /// Exact match on one metadata key
    pub filter: Option<(String, MetadataValue)>,
    pub limit: Option<usize>,
}

impl GetRequest {
    /// Every document in the collection.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn ids(ids: Vec<String>) -> Self {
        Self {
            ids: Some(ids),
            ..Self::default()
        }
    }

    pub fn filter<K: Into<String>, V: Into<MetadataValue>>(key: K, value: V) -> Self {
        Self {
            filter: Some((key.into(), value.into())),
            ..Self::default()
        }
    }

    pub fn with_limit(self, limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..self
        }
    }

    /// Whether a stored document satisfies this request.
    pub fn matches(&self, id: &str, metadata: &Metadata) -> bool {
        let id_ok = self
            .ids
            .as_ref()
            .is_none_or(|ids| ids.iter().any(|wanted| wanted == id));
        let filter_ok = self
            .filter
            .as_ref()
            .is_none_or(|(key, value)| metadata.get(key) == Some(value));
        id_ok && filter_ok
    }
}

/// Documents returned by [`VectorDatabase::get`], in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetResponse {
    pub ids: Vec<String>,
    pub documents: Vec<String>,
    pub metadatas: Vec<Metadata>,
}

impl GetResponse {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn into_documents(self) -> Vec<StoredDocument> {
        self.ids
            .into_iter()
            .zip(self.documents)
            .zip(self.metadatas)
            .map(|((id, text), metadata)| StoredDocument { id, text, metadata })
            .collect()
    }
}

/// Collection-scoped document storage with built-in embedding and search.
#[async_trait]
pub trait VectorDatabase: Send + Sync {
    /// Create the collection if needed and return its handle. Idempotent.
    async fn create_collection(&self, name: &str) -> Result<CollectionHandle>;

    /// Names of every collection, sorted.
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Embed and store documents. Existing ids are overwritten.
    async fn add(
        &self,
        collection: &str,
        ids: Vec<String>,
        documents: Vec<String>,
        metadatas: Vec<Metadata>,
    ) -> Result<()>;

    /// The `n_results` nearest documents for each query text.
    async fn query(
        &self,
        collection: &str,
        query_texts: &[String],
        n_results: usize,
    ) -> Result<QueryResponse>;

    async fn get(&self, collection: &str, request: GetRequest) -> Result<GetResponse>;

    /// Delete documents by id and return how many existed.
    async fn delete(&self, collection: &str, ids: &[String]) -> Result<usize>;

    async fn count(&self, collection: &str) -> Result<usize>;
}
