//! In-memory document store for tests and demos.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use anyhow::{bail, Result};
use tokio::sync::Mutex;

use crate::models::{Fields, IdGenerator, UuidIdGenerator};

use super::{Direction, Document, DocumentStore, Query, Write, DEFAULT_BATCH_LIMIT};

/// Documents keyed by full path.
pub struct MemoryStore {
    docs: Mutex<BTreeMap<String, Fields>>,
    ids: Arc<dyn IdGenerator>,
    batch_limit: usize,
    commits: AtomicUsize,
    unavailable: StdMutex<HashSet<String>>,
    indexed_groups: StdMutex<Option<HashSet<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            docs: Mutex::new(BTreeMap::new()),
            ids: Arc::new(UuidIdGenerator),
            batch_limit: DEFAULT_BATCH_LIMIT,
            commits: AtomicUsize::new(0),
            unavailable: StdMutex::new(HashSet::new()),
            indexed_groups: StdMutex::new(None),
        }
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit;
        self
    }

    /// Seed a document directly.
    pub async fn insert(&self, path: impl Into<String>, fields: Fields) {
        self.docs.lock().await.insert(path.into(), fields);
    }

    /// Number of successful [`DocumentStore::commit`] calls.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Make every read and write under `collection` fail.
    pub fn fail_collection(&self, collection: &str) {
        self.unavailable
            .lock()
            .expect("unavailable set lock poisoned")
            .insert(collection.trim_end_matches('/').to_string());
    }

    /// Require an index for ordered collection-group queries. Groups not
    /// registered with [`MemoryStore::add_group_index`] then fail the way the
    /// hosted store does.
    pub fn require_indexes(&self) {
        let mut groups = self
            .indexed_groups
            .lock()
            .expect("index set lock poisoned");
        groups.get_or_insert_with(HashSet::new);
    }

    pub fn add_group_index(&self, collection_id: &str) {
        let mut groups = self
            .indexed_groups
            .lock()
            .expect("index set lock poisoned");
        groups
            .get_or_insert_with(HashSet::new)
            .insert(collection_id.to_string());
    }

    fn check_available(&self, path: &str) -> Result<()> {
        let unavailable = self
            .unavailable
            .lock()
            .expect("unavailable set lock poisoned");
        if let Some(prefix) = unavailable
            .iter()
            .find(|prefix| path == prefix.as_str() || path.starts_with(&format!("{prefix}/")))
        {
            bail!("UNAVAILABLE: collection {prefix} cannot be reached");
        }
        Ok(())
    }

    fn check_group_index(&self, collection_id: &str, query: &Query) -> Result<()> {
        let groups = self
            .indexed_groups
            .lock()
            .expect("index set lock poisoned");
        if let (Some(groups), Some((field, _))) = (groups.as_ref(), &query.order_by) {
            if !groups.contains(collection_id) {
                bail!(
                    "FAILED_PRECONDITION: The query requires an index. Create a \
                     collection group index on '{collection_id}' for field '{field}'."
                );
            }
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn parent_collection(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

fn collection_id(path: &str) -> &str {
    parent_collection(path).rsplit('/').next().unwrap_or("")
}

/// Filter, order and limit already-selected documents.
fn run_query(mut docs: Vec<Document>, query: &Query) -> Vec<Document> {
    docs.retain(|doc| query.matches(&doc.fields));
    if let Some((field, direction)) = &query.order_by {
        // Documents without the ordering field are not returned.
        docs.retain(|doc| doc.fields.get(field).is_some_and(|v| !v.is_null()));
        docs.sort_by(|a, b| {
            let ord = match (a.fields.get(field), b.fields.get(field)) {
                (Some(x), Some(y)) => x.compare(y).unwrap_or(std::cmp::Ordering::Equal),
                _ => std::cmp::Ordering::Equal,
            };
            match direction {
                Direction::Ascending => ord,
                Direction::Descending => ord.reverse(),
            }
        });
    }
    if let Some(limit) = query.limit {
        docs.truncate(limit);
    }
    docs
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn list(&self, collection: &str) -> Result<Vec<Document>> {
        self.check_available(collection)?;
        let docs = self.docs.lock().await;
        Ok(docs
            .iter()
            .filter(|(path, _)| parent_collection(path) == collection)
            .map(|(path, fields)| Document::new(path.clone(), fields.clone()))
            .collect())
    }

    async fn get(&self, path: &str) -> Result<Option<Document>> {
        self.check_available(path)?;
        let docs = self.docs.lock().await;
        Ok(docs
            .get(path)
            .map(|fields| Document::new(path, fields.clone())))
    }

    async fn set(&self, path: &str, fields: Fields) -> Result<()> {
        self.commit(vec![Write::Set {
            path: path.to_string(),
            fields,
        }])
        .await
    }

    async fn update(&self, path: &str, fields: Fields) -> Result<()> {
        self.commit(vec![Write::Update {
            path: path.to_string(),
            fields,
        }])
        .await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.commit(vec![Write::Delete {
            path: path.to_string(),
        }])
        .await
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>> {
        let docs = self.list(collection).await?;
        Ok(run_query(docs, query))
    }

    async fn collection_group(&self, group: &str, query: &Query) -> Result<Vec<Document>> {
        self.check_group_index(group, query)?;
        let selected: Vec<Document> = {
            let docs = self.docs.lock().await;
            docs.iter()
                .filter(|(path, _)| collection_id(path) == group)
                .map(|(path, fields)| Document::new(path.clone(), fields.clone()))
                .collect()
        };
        for doc in &selected {
            self.check_available(&doc.path)?;
        }
        Ok(run_query(selected, query))
    }

    async fn commit(&self, writes: Vec<Write>) -> Result<()> {
        if writes.len() > self.batch_limit {
            bail!(
                "INVALID_ARGUMENT: batch of {} writes exceeds the limit of {}",
                writes.len(),
                self.batch_limit
            );
        }
        for write in &writes {
            self.check_available(write.path())?;
        }

        let mut docs = self.docs.lock().await;
        // Validate against a scratch copy so a failing write leaves nothing applied.
        let mut staged = docs.clone();
        for write in writes {
            match write {
                Write::Set { path, fields } => {
                    staged.insert(path, fields);
                }
                Write::Update { path, fields } => match staged.get_mut(&path) {
                    Some(existing) => existing.extend(fields),
                    None => bail!("NOT_FOUND: no document to update: {path}"),
                },
                Write::Delete { path } => {
                    staged.remove(&path);
                }
            }
        }
        *docs = staged;
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn new_key(&self) -> String {
        self.ids.new_key()
    }

    fn batch_limit(&self) -> usize {
        self.batch_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;
    use crate::models::FixedIdGenerator;
    use crate::store::FilterOp;

    #[tokio::test]
    async fn list_returns_direct_children_only() {
        let store = MemoryStore::new();
        store.insert("proyectos/1", fields! { "nombre" => "A" }).await;
        store
            .insert("proyectos/1/transacciones/t1", fields! { "monto" => 5 })
            .await;

        let projects = store.list("proyectos").await.unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].id, "1");
        assert_eq!(store.list("proyectos/1/transacciones").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_update_leaves_batch_unapplied() {
        let store = MemoryStore::new();
        let result = store
            .commit(vec![
                Write::Set {
                    path: "cuentas/1".into(),
                    fields: fields! { "id" => 1 },
                },
                Write::Update {
                    path: "cuentas/404".into(),
                    fields: fields! { "nombre" => "x" },
                },
            ])
            .await;

        assert!(result.is_err());
        assert!(store.get("cuentas/1").await.unwrap().is_none());
        assert_eq!(store.commit_count(), 0);
    }

    #[tokio::test]
    async fn update_merges_fields() {
        let store = MemoryStore::new();
        store
            .insert("cuentas/1", fields! { "id" => 1, "nombre" => "Caja" })
            .await;
        store
            .update("cuentas/1", fields! { "nombre" => "Banco" })
            .await
            .unwrap();

        let doc = store.get("cuentas/1").await.unwrap().unwrap();
        assert_eq!(doc.text("nombre"), Some("Banco"));
        assert_eq!(doc.fields.len(), 2);
    }

    #[tokio::test]
    async fn collection_group_orders_and_limits() {
        let store = MemoryStore::new();
        for (path, date) in [
            ("proyectos/1/transacciones/a", "2024-01-01"),
            ("proyectos/2/transacciones/b", "2024-03-01"),
            ("proyectos/2/transacciones/c", "2024-02-01"),
        ] {
            store.insert(path, fields! { "fecha" => date }).await;
        }
        store.insert("proyectos/3/transacciones/d", fields! {}).await;

        let query = Query::new().order_by("fecha", Direction::Descending).limit(2);
        let docs = store.collection_group("transacciones", &query).await.unwrap();
        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn unindexed_group_query_reports_missing_index() {
        let store = MemoryStore::new();
        store.require_indexes();
        let query = Query::new().order_by("fecha", Direction::Descending);
        let err = store
            .collection_group("transacciones", &query)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("requires an index"));

        store.add_group_index("transacciones");
        assert!(store.collection_group("transacciones", &query).await.is_ok());
    }

    #[tokio::test]
    async fn failing_collection_errors_on_read_and_write() {
        let store = MemoryStore::new();
        store.fail_collection("categorias");
        assert!(store.list("categorias").await.is_err());
        assert!(store.set("categorias/1", fields! {}).await.is_err());
        assert!(store.list("cuentas").await.is_ok());
    }

    #[tokio::test]
    async fn add_uses_generated_keys() {
        let store = MemoryStore::new()
            .with_id_generator(Arc::new(FixedIdGenerator::new(["k1"])));
        let key = store.add("proyectos", fields! { "nombre" => "P" }).await.unwrap();
        assert_eq!(key, "k1");
        let found = store
            .query("proyectos", &Query::new().filter("nombre", FilterOp::Eq, "P"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }
}
