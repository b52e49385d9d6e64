//! Per-project associations with the global catalogs.
//!
//! A project enables a subset of each catalog through its `*_proyecto`
//! sub-collections. Associations whose catalog entry no longer exists are
//! orphans: they never show up in [`ScopeLinker::resolve_active_links`] and
//! are reported separately for cleanup.

use std::collections::HashSet;

use serde::Serialize;

use crate::catalog::{Catalog, CatalogResolver};
use crate::error::Result;
use crate::fields;
use crate::models::{CatalogKind, Identifier, LinkRecord};
use crate::schema::{field, project_collection};
use crate::session::Session;
use crate::store::{commit_chunked, doc_path, Write};

/// An association that resolved to a catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeLink {
    pub id: Identifier,
    pub name: String,
    pub active: bool,
    /// Accounts only.
    pub principal: bool,
    #[serde(skip)]
    pub doc_id: String,
}

/// Resolution of one project's associations of one kind.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LinkReport {
    pub resolved: Vec<ScopeLink>,
    pub orphans: Vec<Identifier>,
    /// Association documents with no usable id at all.
    pub unreadable: usize,
    #[serde(skip)]
    pub orphan_docs: Vec<String>,
}

/// Split raw associations into resolved links and orphans.
///
/// Duplicate associations for one catalog id collapse into the first one;
/// the link stays active if any duplicate is. Resolved links are ordered
/// principal first, then by name.
pub fn resolve_links(records: &[LinkRecord], catalog: &Catalog) -> LinkReport {
    let mut report = LinkReport::default();
    let mut seen_orphans = HashSet::new();

    for record in records {
        let id = record.catalog_id.canonical();
        let Some(entry) = catalog.get(&id) else {
            report.orphan_docs.push(record.doc_id.clone());
            if seen_orphans.insert(id.clone()) {
                report.orphans.push(id);
            }
            continue;
        };

        if let Some(existing) = report.resolved.iter_mut().find(|link| link.id == id) {
            existing.active |= record.active;
            existing.principal |= record.principal;
            continue;
        }
        report.resolved.push(ScopeLink {
            id,
            name: entry.name.clone(),
            active: record.active,
            principal: record.principal,
            doc_id: record.doc_id.clone(),
        });
    }

    report.resolved.sort_by(|a, b| {
        b.principal
            .cmp(&a.principal)
            .then_with(|| a.name.to_uppercase().cmp(&b.name.to_uppercase()))
            .then_with(|| a.id.cmp(&b.id))
    });
    report
}

pub struct ScopeLinker<'a> {
    session: &'a Session,
}

impl<'a> ScopeLinker<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    async fn read_links(&self, project_id: &str, kind: CatalogKind) -> Result<(Vec<LinkRecord>, usize)> {
        let store = self.session.store()?;
        let docs = store
            .list(&project_collection(project_id, kind.link_collection()))
            .await?;

        let mut unreadable = 0;
        let mut records = Vec::with_capacity(docs.len());
        for doc in &docs {
            match LinkRecord::from_document(kind, doc) {
                Ok(record) => records.push(record),
                Err(reason) => {
                    tracing::debug!(project_id, link = %kind, doc = %doc.id, %reason, "Skipping association");
                    unreadable += 1;
                }
            }
        }
        Ok((records, unreadable))
    }

    pub async fn link_report(&self, project_id: &str, kind: CatalogKind) -> Result<LinkReport> {
        let (records, unreadable) = self.read_links(project_id, kind).await?;
        let catalog = CatalogResolver::new(self.session).load_catalog(kind).await?;
        let mut report = resolve_links(&records, &catalog);
        report.unreadable = unreadable;

        if !report.orphans.is_empty() {
            tracing::debug!(
                project_id,
                link = %kind,
                orphans = report.orphans.len(),
                "Project has associations to missing catalog entries"
            );
        }
        Ok(report)
    }

    /// Associations that resolve to a catalog entry, active or not.
    /// Orphans are left out.
    pub async fn resolve_active_links(
        &self,
        project_id: &str,
        kind: CatalogKind,
    ) -> Result<Vec<ScopeLink>> {
        Ok(self.link_report(project_id, kind).await?.resolved)
    }

    /// Catalog ids referenced by associations that do not resolve.
    pub async fn orphan_links(&self, project_id: &str, kind: CatalogKind) -> Result<Vec<Identifier>> {
        Ok(self.link_report(project_id, kind).await?.orphans)
    }

    /// Ids of resolved associations whose `activa` flag is set.
    pub async fn active_ids(&self, project_id: &str, kind: CatalogKind) -> Result<HashSet<Identifier>> {
        Ok(self
            .resolve_active_links(project_id, kind)
            .await?
            .into_iter()
            .filter(|link| link.active)
            .map(|link| link.id)
            .collect())
    }

    /// Replace the project's whole association set for `kind` with `ids`.
    ///
    /// Existing associations are deleted and new ones written in batches of
    /// at most the store's batch limit. A failure part way leaves earlier
    /// batches applied. For accounts, `principal` marks the main account.
    pub async fn assign_links(
        &self,
        project_id: &str,
        kind: CatalogKind,
        ids: &[Identifier],
        principal: Option<&Identifier>,
    ) -> Result<usize> {
        let store = self.session.store()?;
        let collection = project_collection(project_id, kind.link_collection());
        let existing = store.list(&collection).await?;
        let catalog = CatalogResolver::new(self.session).load_catalog(kind).await?;
        let principal = principal.map(Identifier::canonical);
        let now = self.session.clock().now();

        let mut writes: Vec<Write> = existing
            .into_iter()
            .map(|doc| Write::Delete { path: doc.path })
            .collect();

        let mut assigned = HashSet::new();
        for id in ids {
            let id = id.canonical();
            if !assigned.insert(id.clone()) {
                continue;
            }
            let mut fields = fields! {
                field::LINK_ACTIVE => true,
                field::CREATED_AT => now,
                field::UPDATED_AT => now,
            };
            match kind {
                CatalogKind::Accounts => {
                    fields.insert(field::ACCOUNT_ID.into(), id.to_value());
                    fields.insert(
                        field::LINK_ACCOUNT_NAME.into(),
                        catalog.name_or_placeholder(&id).into(),
                    );
                    fields.insert(
                        field::PRINCIPAL.into(),
                        (principal.as_ref() == Some(&id)).into(),
                    );
                }
                CatalogKind::Categories => {
                    fields.insert(field::MASTER_CATEGORY_ID.into(), id.to_value());
                }
                CatalogKind::Subcategories => {
                    fields.insert(field::MASTER_SUBCATEGORY_ID.into(), id.to_value());
                    if let Some(parent) = catalog
                        .get(&id)
                        .and_then(|record| record.parent_category_id.as_ref())
                    {
                        fields.insert(field::CATEGORY_ID.into(), parent.to_value());
                    }
                }
            }
            writes.push(Write::Set {
                path: doc_path(&collection, &store.new_key()),
                fields,
            });
        }

        let batches = commit_chunked(store.as_ref(), writes).await?;
        tracing::info!(
            project_id,
            link = %kind,
            assigned = assigned.len(),
            batches,
            "Replaced project associations"
        );
        Ok(assigned.len())
    }

    /// Delete association documents that point at missing catalog entries.
    pub async fn prune_orphan_links(&self, project_id: &str, kind: CatalogKind) -> Result<usize> {
        let report = self.link_report(project_id, kind).await?;
        if report.orphan_docs.is_empty() {
            return Ok(0);
        }
        let store = self.session.store()?;
        let collection = project_collection(project_id, kind.link_collection());
        let writes: Vec<Write> = report
            .orphan_docs
            .iter()
            .map(|doc_id| Write::Delete {
                path: doc_path(&collection, doc_id),
            })
            .collect();
        let removed = writes.len();
        commit_chunked(store.as_ref(), writes).await?;
        tracing::info!(project_id, link = %kind, removed, "Pruned orphan associations");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldValue;
    use crate::store::{DocumentStore, MemoryStore};
    use std::sync::Arc;

    async fn store_with_categories() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .insert("categorias/c1", fields! { "id" => 1, "nombre" => "Materials" })
            .await;
        store
            .insert("categorias/c2", fields! { "id" => 2, "nombre" => "Labor" })
            .await;
        store
    }

    #[tokio::test]
    async fn orphans_are_dropped_and_reported() {
        let store = store_with_categories().await;
        let links = "proyectos/10/categorias_proyecto";
        store
            .insert(format!("{links}/a"), fields! { "categoria_maestra_id" => 1 })
            .await;
        store
            .insert(format!("{links}/b"), fields! { "categoria_maestra_id" => "99" })
            .await;
        store
            .insert(
                format!("{links}/c"),
                fields! { "categoria_maestra_id" => "2", "activa" => false },
            )
            .await;
        let session = Session::open(store);
        let linker = ScopeLinker::new(&session);

        let resolved = linker
            .resolve_active_links("10", CatalogKind::Categories)
            .await
            .unwrap();
        let ids: Vec<String> = resolved.iter().map(|l| l.id.to_string()).collect();
        assert_eq!(ids, vec!["2", "1"]);
        assert!(!resolved[0].active);

        let orphans = linker
            .orphan_links("10", CatalogKind::Categories)
            .await
            .unwrap();
        let orphans: Vec<String> = orphans.iter().map(ToString::to_string).collect();
        assert_eq!(orphans, vec!["99"]);

        let active = linker.active_ids("10", CatalogKind::Categories).await.unwrap();
        assert_eq!(active, HashSet::from([Identifier::Numeric(1)]));
    }

    #[tokio::test]
    async fn zero_id_fields_fall_back_to_document_key() {
        let store = store_with_categories().await;
        store
            .insert(
                "proyectos/10/categorias_proyecto/2",
                fields! { "categoria_maestra_id" => 0, "categoria_id" => "" },
            )
            .await;
        let session = Session::open(store);
        let resolved = ScopeLinker::new(&session)
            .resolve_active_links("10", CatalogKind::Categories)
            .await
            .unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].name, "Labor");
    }

    #[tokio::test]
    async fn assign_replaces_the_whole_set() {
        let store = store_with_categories().await;
        store
            .insert(
                "subcategorias/s1",
                fields! { "id" => 5, "nombre" => "Cement", "categoria_id" => 1 },
            )
            .await;
        store
            .insert(
                "proyectos/10/subcategorias_proyecto/old",
                fields! { "subcategoria_maestra_id" => 77 },
            )
            .await;
        let session = Session::open(store.clone());
        let linker = ScopeLinker::new(&session);

        let count = linker
            .assign_links(
                "10",
                CatalogKind::Subcategories,
                &[5.into(), "5".into()],
                None,
            )
            .await
            .unwrap();
        assert_eq!(count, 1);

        let docs = store
            .list("proyectos/10/subcategorias_proyecto")
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].field("categoria_id"), Some(&FieldValue::Integer(1)));
        assert_eq!(docs[0].field("subcategoria_maestra_id"), Some(&FieldValue::Integer(5)));
    }

    #[tokio::test]
    async fn account_links_carry_name_and_principal() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert("cuentas/a", fields! { "id" => 1, "nombre" => "Caja" })
            .await;
        store
            .insert("cuentas/b", fields! { "id" => 2, "nombre" => "Banco" })
            .await;
        let session = Session::open(store.clone());
        let linker = ScopeLinker::new(&session);

        linker
            .assign_links("10", CatalogKind::Accounts, &[1.into(), 2.into()], Some(&2.into()))
            .await
            .unwrap();

        let resolved = linker
            .resolve_active_links("10", CatalogKind::Accounts)
            .await
            .unwrap();
        assert_eq!(resolved[0].name, "Banco");
        assert!(resolved[0].principal);
        assert!(!resolved[1].principal);
    }

    #[tokio::test]
    async fn prune_deletes_only_orphans() {
        let store = store_with_categories().await;
        let links = "proyectos/10/categorias_proyecto";
        store
            .insert(format!("{links}/a"), fields! { "categoria_maestra_id" => 1 })
            .await;
        store
            .insert(format!("{links}/b"), fields! { "categoria_maestra_id" => 99 })
            .await;
        let session = Session::open(store.clone());

        let removed = ScopeLinker::new(&session)
            .prune_orphan_links("10", CatalogKind::Categories)
            .await
            .unwrap();
        assert_eq!(removed, 1);
        let remaining = store.list(links).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "a");
    }
}
