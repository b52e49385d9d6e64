//! Global catalogs (accounts, categories, subcategories) and their CRUD.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::fields;
use crate::models::{next_numeric_id, CatalogKind, CatalogRecord, Fields, Identifier};
use crate::schema::field;
use crate::session::Session;
use crate::store::{commit_chunked, doc_path, Document, Query, Write};

/// One catalog loaded into memory, keyed by canonical identifier.
#[derive(Debug, Clone)]
pub struct Catalog {
    kind: CatalogKind,
    entries: HashMap<Identifier, CatalogRecord>,
    skipped: usize,
}

impl Catalog {
    pub fn empty(kind: CatalogKind) -> Self {
        Self {
            kind,
            entries: HashMap::new(),
            skipped: 0,
        }
    }

    /// Build from raw documents. Unparseable records are counted and
    /// dropped; for duplicate ids the first document wins.
    pub fn from_documents(kind: CatalogKind, docs: &[Document]) -> Self {
        let mut catalog = Self::empty(kind);
        for doc in docs {
            match CatalogRecord::from_document(kind, doc) {
                Ok(record) => {
                    let key = record.id.canonical();
                    if catalog.entries.contains_key(&key) {
                        tracing::warn!(
                            catalog = %kind,
                            id = %key,
                            doc = %doc.id,
                            "Duplicate catalog id, keeping the first record"
                        );
                        continue;
                    }
                    catalog.entries.insert(key, record);
                }
                Err(reason) => {
                    tracing::debug!(catalog = %kind, doc = %doc.id, %reason, "Skipping catalog record");
                    catalog.skipped += 1;
                }
            }
        }
        catalog
    }

    pub fn kind(&self) -> CatalogKind {
        self.kind
    }

    pub fn get(&self, id: &Identifier) -> Option<&CatalogRecord> {
        self.entries.get(&id.canonical())
    }

    pub fn contains(&self, id: &Identifier) -> bool {
        self.get(id).is_some()
    }

    /// Display name, or `"<Kind> <id>"` when the id does not resolve.
    pub fn name_or_placeholder(&self, id: &Identifier) -> String {
        self.get(id)
            .map(|record| record.name.clone())
            .unwrap_or_else(|| self.kind.placeholder(id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records that failed to parse while loading.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Records ordered by name (case-insensitive), then id.
    pub fn records(&self) -> Vec<&CatalogRecord> {
        let mut records: Vec<&CatalogRecord> = self.entries.values().collect();
        records.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.id.cmp(&b.id))
        });
        records
    }
}

/// All three catalogs, used together to name report rows. Any may be empty.
#[derive(Debug, Clone)]
pub struct Catalogs {
    pub accounts: Catalog,
    pub categories: Catalog,
    pub subcategories: Catalog,
}

impl Catalogs {
    pub fn empty() -> Self {
        Self {
            accounts: Catalog::empty(CatalogKind::Accounts),
            categories: Catalog::empty(CatalogKind::Categories),
            subcategories: Catalog::empty(CatalogKind::Subcategories),
        }
    }

    pub fn of(&self, kind: CatalogKind) -> &Catalog {
        match kind {
            CatalogKind::Accounts => &self.accounts,
            CatalogKind::Categories => &self.categories,
            CatalogKind::Subcategories => &self.subcategories,
        }
    }
}

/// Catalog reads and writes for one session.
pub struct CatalogResolver<'a> {
    session: &'a Session,
}

impl<'a> CatalogResolver<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    pub async fn load_catalog(&self, kind: CatalogKind) -> Result<Catalog> {
        let store = self.session.store()?;
        let docs = store.list(kind.collection()).await?;
        let catalog = Catalog::from_documents(kind, &docs);
        tracing::debug!(
            catalog = %kind,
            records = catalog.len(),
            skipped = catalog.skipped(),
            "Loaded catalog"
        );
        Ok(catalog)
    }

    pub async fn load_all(&self) -> Result<Catalogs> {
        Ok(Catalogs {
            accounts: self.load_catalog(CatalogKind::Accounts).await?,
            categories: self.load_catalog(CatalogKind::Categories).await?,
            subcategories: self.load_catalog(CatalogKind::Subcategories).await?,
        })
    }

    /// Subcategories whose parent is `category`, ordered by name.
    pub async fn subcategories_of(&self, category: &Identifier) -> Result<Vec<CatalogRecord>> {
        let catalog = self.load_catalog(CatalogKind::Subcategories).await?;
        let category = category.canonical();
        Ok(catalog
            .records()
            .into_iter()
            .filter(|record| record.parent_category_id.as_ref() == Some(&category))
            .cloned()
            .collect())
    }

    pub async fn create_category(&self, name: &str) -> Result<CatalogRecord> {
        self.create(CatalogKind::Categories, name, Fields::new()).await
    }

    pub async fn create_subcategory(
        &self,
        name: &str,
        category: &Identifier,
    ) -> Result<CatalogRecord> {
        self.create(
            CatalogKind::Subcategories,
            name,
            fields! { field::CATEGORY_ID => category },
        )
        .await
    }

    /// Account type and sub type are stored lowercased.
    pub async fn create_account(
        &self,
        name: &str,
        account_type: &str,
        sub_type: Option<&str>,
    ) -> Result<CatalogRecord> {
        let mut extra = fields! { field::ACCOUNT_TYPE => account_type.trim().to_lowercase() };
        if let Some(sub_type) = sub_type {
            extra.insert(
                field::ACCOUNT_SUB_TYPE.into(),
                sub_type.trim().to_lowercase().into(),
            );
        }
        self.create(CatalogKind::Accounts, name, extra).await
    }

    async fn create(&self, kind: CatalogKind, name: &str, extra: Fields) -> Result<CatalogRecord> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::invalid(format!("{} name must not be empty", kind.label())));
        }
        let store = self.session.store()?;
        let existing = store.list(kind.collection()).await?;
        let id = next_numeric_id(existing.iter().filter_map(|doc| doc.field(field::ID)));

        let now = self.session.clock().now();
        let mut fields = fields! {
            field::ID => id,
            field::NAME => name,
            field::ACTIVE => true,
            field::CREATED_AT => now,
            field::UPDATED_AT => now,
        };
        fields.extend(extra);

        let key = store.add(kind.collection(), fields.clone()).await?;
        tracing::info!(catalog = %kind, id, name, "Created catalog entry");

        let doc = Document::new(doc_path(kind.collection(), &key), fields);
        CatalogRecord::from_document(kind, &doc)
            .map_err(|reason| Error::invalid(format!("created record unreadable: {reason}")))
    }

    pub async fn rename(&self, kind: CatalogKind, id: &Identifier, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::invalid(format!("{} name must not be empty", kind.label())));
        }
        let record = self.require(kind, id).await?;
        let store = self.session.store()?;
        store
            .update(
                &doc_path(kind.collection(), &record.doc_id),
                fields! {
                    field::NAME => name,
                    field::UPDATED_AT => self.session.clock().now(),
                },
            )
            .await?;
        tracing::info!(catalog = %kind, %id, name, "Renamed catalog entry");
        Ok(())
    }

    /// Delete a catalog entry. Deleting a category also deletes its
    /// subcategories. Transactions and links referring to the entry are left
    /// alone and show up in the orphan audits.
    pub async fn delete(&self, kind: CatalogKind, id: &Identifier) -> Result<()> {
        let record = self.require(kind, id).await?;
        let store = self.session.store()?;

        let mut writes = vec![Write::Delete {
            path: doc_path(kind.collection(), &record.doc_id),
        }];
        if kind == CatalogKind::Categories {
            let query = Query::new().any_of(field::CATEGORY_ID, record.id.stored_variants());
            let children = store
                .query(CatalogKind::Subcategories.collection(), &query)
                .await?;
            writes.extend(children.into_iter().map(|doc| Write::Delete { path: doc.path }));
        }

        let count = writes.len();
        commit_chunked(store.as_ref(), writes).await?;
        tracing::info!(catalog = %kind, %id, deleted = count, "Deleted catalog entry");
        Ok(())
    }

    /// Id of the subcategory named `name` under `category`, created with the
    /// next numeric id when missing. Names match case-insensitively.
    pub async fn find_or_create_subcategory(
        &self,
        name: &str,
        category: &Identifier,
    ) -> Result<CatalogRecord> {
        let wanted = name.trim().to_lowercase();
        if let Some(existing) = self
            .subcategories_of(category)
            .await?
            .into_iter()
            .find(|record| record.name.trim().to_lowercase() == wanted)
        {
            return Ok(existing);
        }
        self.create_subcategory(name, category).await
    }

    async fn require(&self, kind: CatalogKind, id: &Identifier) -> Result<CatalogRecord> {
        self.load_catalog(kind)
            .await?
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found(kind.placeholder(id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldValue;
    use crate::store::{DocumentStore, MemoryStore};
    use std::sync::Arc;

    async fn seeded() -> (Arc<MemoryStore>, Session) {
        let store = Arc::new(MemoryStore::new());
        store
            .insert("categorias/a", fields! { "id" => 1, "nombre" => "Materials" })
            .await;
        store
            .insert("categorias/b", fields! { "id" => "2", "nombre" => "Labor" })
            .await;
        store
            .insert(
                "subcategorias/s1",
                fields! { "id" => 10, "nombre" => "Cement", "categoria_id" => 1 },
            )
            .await;
        store
            .insert(
                "subcategorias/s2",
                fields! { "id" => 11, "nombre" => "Steel", "categoria_id" => "1" },
            )
            .await;
        store
            .insert(
                "subcategorias/s3",
                fields! { "id" => 12, "nombre" => "Crew", "categoria_id" => 2 },
            )
            .await;
        let session = Session::open(store.clone());
        (store, session)
    }

    #[tokio::test]
    async fn string_and_integer_ids_resolve_to_one_record() {
        let (_store, session) = seeded().await;
        let catalog = CatalogResolver::new(&session)
            .load_catalog(CatalogKind::Categories)
            .await
            .unwrap();

        let by_int = catalog.get(&Identifier::Numeric(2)).unwrap();
        let by_str = catalog.get(&Identifier::Opaque("2".into())).unwrap();
        assert_eq!(by_int, by_str);
        assert_eq!(by_int.name, "Labor");
        assert_eq!(catalog.len(), 2);
    }

    #[tokio::test]
    async fn unresolved_ids_get_placeholders() {
        let (_store, session) = seeded().await;
        let catalog = CatalogResolver::new(&session)
            .load_catalog(CatalogKind::Categories)
            .await
            .unwrap();
        assert_eq!(catalog.name_or_placeholder(&1.into()), "Materials");
        assert_eq!(catalog.name_or_placeholder(&99.into()), "Category 99");
    }

    #[tokio::test]
    async fn document_key_is_the_fallback_id() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert("cuentas/7", fields! { "nombre" => "Banco" })
            .await;
        store.insert("cuentas/xyz", fields! {}).await;
        let session = Session::open(store);

        let catalog = CatalogResolver::new(&session)
            .load_catalog(CatalogKind::Accounts)
            .await
            .unwrap();
        assert_eq!(catalog.name_or_placeholder(&7.into()), "Banco");
        assert_eq!(catalog.name_or_placeholder(&"xyz".into()), "Account xyz");
    }

    #[tokio::test]
    async fn subcategories_follow_normalized_parent() {
        let (_store, session) = seeded().await;
        let subs = CatalogResolver::new(&session)
            .subcategories_of(&"1".into())
            .await
            .unwrap();
        let names: Vec<&str> = subs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Cement", "Steel"]);
    }

    #[tokio::test]
    async fn create_assigns_next_numeric_id() {
        let (store, session) = seeded().await;
        let resolver = CatalogResolver::new(&session);

        let created = resolver.create_category("Permits").await.unwrap();
        assert_eq!(created.id, Identifier::Numeric(3));

        let doc = store
            .get(&format!("categorias/{}", created.doc_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.field("id"), Some(&FieldValue::Integer(3)));
        assert_eq!(doc.field("activo"), Some(&FieldValue::Bool(true)));
    }

    #[tokio::test]
    async fn accounts_store_lowercased_types() {
        let (store, session) = seeded().await;
        let created = CatalogResolver::new(&session)
            .create_account("Caja Chica", "Efectivo", Some("Corriente"))
            .await
            .unwrap();
        assert_eq!(created.id, Identifier::Numeric(1));
        let doc = store
            .get(&format!("cuentas/{}", created.doc_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.text("tipo"), Some("efectivo"));
        assert_eq!(doc.text("tipo_cuenta"), Some("corriente"));
    }

    #[tokio::test]
    async fn deleting_a_category_removes_its_subcategories() {
        let (store, session) = seeded().await;
        let resolver = CatalogResolver::new(&session);
        resolver
            .delete(CatalogKind::Categories, &1.into())
            .await
            .unwrap();

        let remaining = store.list("subcategorias").await.unwrap();
        let ids: Vec<&str> = remaining.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["s3"]);
        assert!(store.get("categorias/a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rename_and_missing_entries() {
        let (store, session) = seeded().await;
        let resolver = CatalogResolver::new(&session);
        resolver
            .rename(CatalogKind::Categories, &"2".into(), "Mano de obra")
            .await
            .unwrap();
        let doc = store.get("categorias/b").await.unwrap().unwrap();
        assert_eq!(doc.text("nombre"), Some("Mano de obra"));

        let err = resolver
            .rename(CatalogKind::Categories, &42.into(), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn find_or_create_reuses_existing_names() {
        let (_store, session) = seeded().await;
        let resolver = CatalogResolver::new(&session);

        let found = resolver
            .find_or_create_subcategory("steel", &1.into())
            .await
            .unwrap();
        assert_eq!(found.id, Identifier::Numeric(11));

        let created = resolver
            .find_or_create_subcategory("Steel", &2.into())
            .await
            .unwrap();
        assert_eq!(created.id, Identifier::Numeric(13));
        assert_eq!(created.parent_category_id, Some(Identifier::Numeric(2)));
    }

    #[tokio::test]
    async fn closed_session_is_reported() {
        let session = Session::closed();
        let err = CatalogResolver::new(&session)
            .load_catalog(CatalogKind::Categories)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotInitialized));
    }
}
