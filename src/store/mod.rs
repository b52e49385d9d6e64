mod batch;
#[cfg(feature = "firestore")]
pub mod firestore;
mod memory;
mod query;

pub use batch::commit_chunked;
#[cfg(feature = "firestore")]
pub use firestore::FirestoreStore;
pub use memory::MemoryStore;
pub use query::{Direction, Filter, FilterOp, Query};

use anyhow::Result;

use crate::models::{FieldValue, Fields};
use crate::schema;

/// Operations per atomic batch accepted by the store.
pub const DEFAULT_BATCH_LIMIT: usize = 400;

/// A stored document: slash-separated path plus its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub path: String,
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(path: impl Into<String>, fields: Fields) -> Self {
        let path = path.into();
        let id = path.rsplit('/').next().unwrap_or_default().to_string();
        Self { path, id, fields }
    }

    /// Field value, treating explicit nulls as absent.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name).filter(|v| !v.is_null())
    }

    /// Non-blank string field.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.field(name)
            .and_then(FieldValue::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// Loosely truthy flag with a default for absent fields.
    pub fn flag(&self, name: &str, default: bool) -> bool {
        self.field(name).map_or(default, FieldValue::truthy)
    }

    /// Collection path this document lives in.
    pub fn collection(&self) -> &str {
        self.path
            .rsplit_once('/')
            .map(|(parent, _)| parent)
            .unwrap_or_default()
    }

    /// Key of the owning project for documents under `proyectos/{id}/...`.
    pub fn parent_project(&self) -> Option<&str> {
        let mut segments = self.path.split('/');
        match (segments.next(), segments.next(), segments.next()) {
            (Some(schema::PROJECTS), Some(project), Some(_)) => Some(project),
            _ => None,
        }
    }
}

pub fn doc_path(collection: &str, key: &str) -> String {
    format!("{collection}/{key}")
}

/// One operation of an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Create or overwrite.
    Set { path: String, fields: Fields },
    /// Merge into an existing document; fails the batch if it is missing.
    Update { path: String, fields: Fields },
    Delete { path: String },
}

impl Write {
    pub fn path(&self) -> &str {
        match self {
            Write::Set { path, .. } | Write::Update { path, .. } | Write::Delete { path } => path,
        }
    }
}

/// Document database the data-access layer runs on.
///
/// Paths alternate collection and document segments
/// (`proyectos/10/transacciones/abc`).
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Every document directly inside a collection.
    async fn list(&self, collection: &str) -> Result<Vec<Document>>;

    async fn get(&self, path: &str) -> Result<Option<Document>>;

    async fn set(&self, path: &str, fields: Fields) -> Result<()>;

    /// Merge fields into an existing document.
    async fn update(&self, path: &str, fields: Fields) -> Result<()>;

    async fn delete(&self, path: &str) -> Result<()>;

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>>;

    /// Query every collection named `collection_id`, whatever its parent.
    async fn collection_group(&self, collection_id: &str, query: &Query) -> Result<Vec<Document>>;

    /// Apply all writes atomically. At most [`DocumentStore::batch_limit`]
    /// writes per call.
    async fn commit(&self, writes: Vec<Write>) -> Result<()>;

    /// Fresh document key.
    fn new_key(&self) -> String;

    fn batch_limit(&self) -> usize {
        DEFAULT_BATCH_LIMIT
    }

    /// Create a document under a generated key and return the key.
    async fn add(&self, collection: &str, fields: Fields) -> Result<String> {
        let key = self.new_key();
        self.set(&doc_path(collection, &key), fields).await?;
        Ok(key)
    }
}
