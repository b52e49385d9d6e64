use crate::catalog::{Catalog, CatalogResolver};
use crate::links::ScopeLinker;
use crate::models::{CatalogKind, Project};
use crate::projects::ProjectService;
use crate::session::Session;
use crate::transactions::{ListFilter, TransactionService};

use super::{or_default, CatalogOutput, LinksOutput, TransactionOutput};

pub async fn list_projects(session: &Session) -> Vec<Project> {
    or_default("list_projects", ProjectService::new(session).list().await)
}

/// A catalog, or an empty one when it cannot be loaded.
pub async fn load_catalog(session: &Session, kind: CatalogKind) -> Catalog {
    CatalogResolver::new(session)
        .load_catalog(kind)
        .await
        .unwrap_or_else(|err| {
            err.log("load_catalog");
            Catalog::empty(kind)
        })
}

pub async fn list_catalog(session: &Session, kind: CatalogKind) -> CatalogOutput {
    let catalog = load_catalog(session, kind).await;
    CatalogOutput {
        kind,
        entries: catalog.records().into_iter().cloned().collect(),
        skipped: catalog.skipped(),
    }
}

pub async fn list_links(session: &Session, project_id: &str, kind: CatalogKind) -> LinksOutput {
    let report = or_default(
        "link_report",
        ScopeLinker::new(session).link_report(project_id, kind).await,
    );
    LinksOutput {
        project_id: project_id.to_string(),
        kind,
        links: report.resolved,
        orphans: report.orphans,
    }
}

pub async fn list_transactions(
    session: &Session,
    project_id: &str,
    filter: &ListFilter,
) -> Vec<TransactionOutput> {
    or_default(
        "list_transactions",
        TransactionService::new(session).list(project_id, filter).await,
    )
    .iter()
    .map(TransactionOutput::from)
    .collect()
}

/// Newest transactions across all projects. A missing index is logged with
/// instructions and yields an empty list.
pub async fn list_recent(
    session: &Session,
    limit: usize,
    include_deleted: bool,
) -> Vec<TransactionOutput> {
    or_default(
        "global_recent",
        TransactionService::new(session)
            .global_recent(limit, include_deleted)
            .await,
    )
    .iter()
    .map(TransactionOutput::from)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn closed_sessions_list_nothing() {
        let session = Session::closed();
        assert!(list_projects(&session).await.is_empty());
        assert!(list_catalog(&session, CatalogKind::Accounts)
            .await
            .entries
            .is_empty());
        assert!(list_recent(&session, 10, false).await.is_empty());
        let links = list_links(&session, "10", CatalogKind::Categories).await;
        assert!(links.links.is_empty() && links.orphans.is_empty());
    }

    #[tokio::test]
    async fn unreachable_collections_degrade_to_empty() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert("proyectos/10/transacciones/a", fields! { "monto" => 5 })
            .await;
        store.fail_collection("proyectos/10/transacciones");
        let session = Session::open(store);

        assert!(list_transactions(&session, "10", &ListFilter::default())
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn expenses_are_shown_negative() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert(
                "proyectos/10/transacciones/a",
                fields! { "monto" => 5, "tipo" => "Gasto", "fecha" => "2025-01-01" },
            )
            .await;
        let session = Session::open(store);

        let listed = list_transactions(&session, "10", &ListFilter::default()).await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].signed_amount, -5.0);
        assert_eq!(listed[0].kind.as_deref(), Some("gasto"));
    }
}
