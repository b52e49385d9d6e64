use crate::budgets::BudgetService;
use crate::error::Error;
use crate::links::ScopeLinker;
use crate::migrate::AttachmentMigrator;
use crate::models::{BudgetEntry, BudgetPeriod, BudgetTarget, CatalogKind, Identifier, TransferRequest};
use crate::session::Session;
use crate::transactions::{DeleteMode, TransactionService};

/// `{"success": false, ...}` for a failed operation, after logging it.
fn failure(op: &str, err: Error) -> serde_json::Value {
    err.log(op);
    serde_json::json!({
        "success": false,
        "error": err.to_string(),
    })
}

pub async fn migrate_attachments(
    session: &Session,
    project_id: &str,
    dry_run: bool,
) -> serde_json::Value {
    match AttachmentMigrator::new(session).migrate(project_id, dry_run).await {
        Ok(stats) => serde_json::json!({
            "success": stats.failed == 0,
            "project_id": project_id,
            "stats": stats,
        }),
        Err(err) => failure("migrate_attachments", err),
    }
}

pub async fn create_transfer(
    session: &Session,
    project_id: &str,
    request: &TransferRequest,
) -> serde_json::Value {
    match TransactionService::new(session)
        .create_transfer(project_id, request)
        .await
    {
        Ok(legs) => serde_json::json!({
            "success": true,
            "project_id": project_id,
            "expense_id": legs.expense_id,
            "income_id": legs.income_id,
        }),
        Err(err) => failure("create_transfer", err),
    }
}

/// Delete a transaction. Transfer legs take their partner with them.
pub async fn delete_transaction(
    session: &Session,
    project_id: &str,
    id: &str,
    mode: DeleteMode,
) -> serde_json::Value {
    let service = TransactionService::new(session);
    let result = match service.get(project_id, id).await {
        Ok(tx) if tx.is_transfer => service.delete_transfer(project_id, id).await,
        Ok(_) => service.delete(project_id, id, mode).await.map(|()| 1),
        Err(err) => Err(err),
    };
    match result {
        Ok(deleted) => serde_json::json!({
            "success": true,
            "id": id,
            "deleted": deleted,
        }),
        Err(err) => failure("delete_transaction", err),
    }
}

pub async fn assign_links(
    session: &Session,
    project_id: &str,
    kind: CatalogKind,
    ids: &[Identifier],
    principal: Option<&Identifier>,
) -> serde_json::Value {
    match ScopeLinker::new(session)
        .assign_links(project_id, kind, ids, principal)
        .await
    {
        Ok(written) => serde_json::json!({
            "success": true,
            "project_id": project_id,
            "kind": kind,
            "links": written,
        }),
        Err(err) => failure("assign_links", err),
    }
}

pub async fn prune_orphan_links(
    session: &Session,
    project_id: &str,
    kind: CatalogKind,
) -> serde_json::Value {
    match ScopeLinker::new(session)
        .prune_orphan_links(project_id, kind)
        .await
    {
        Ok(removed) => serde_json::json!({
            "success": true,
            "project_id": project_id,
            "kind": kind,
            "removed": removed,
        }),
        Err(err) => failure("prune_orphan_links", err),
    }
}

pub async fn save_budgets(
    session: &Session,
    project_id: &str,
    target: BudgetTarget,
    period: &BudgetPeriod,
    entries: &[BudgetEntry],
) -> serde_json::Value {
    match BudgetService::new(session)
        .save_budgets(project_id, target, period, entries)
        .await
    {
        Ok(written) => serde_json::json!({
            "success": true,
            "project_id": project_id,
            "budgets": written,
        }),
        Err(err) => failure("save_budgets", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;
    use crate::store::{DocumentStore, MemoryStore};
    use chrono::NaiveDate;
    use std::sync::Arc;

    #[tokio::test]
    async fn failures_are_reported_not_raised() {
        let session = Session::open(Arc::new(MemoryStore::new()));
        let request = TransferRequest {
            date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            from_account: 1.into(),
            to_account: 1.into(),
            amount: 10.0,
            note: None,
        };
        let result = create_transfer(&session, "10", &request).await;
        assert_eq!(result["success"], false);

        session.close();
        let result = migrate_attachments(&session, "10", true).await;
        assert_eq!(result["success"], false);
        assert_eq!(result["error"], "Session is not open");
    }

    #[tokio::test]
    async fn deleting_a_transfer_leg_removes_both() {
        let store = Arc::new(MemoryStore::new());
        let session = Session::open(store.clone());
        let request = TransferRequest {
            date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            from_account: 1.into(),
            to_account: 2.into(),
            amount: 10.0,
            note: None,
        };
        let created = create_transfer(&session, "10", &request).await;
        let leg = created["income_id"].as_str().unwrap().to_string();
        store
            .insert("proyectos/10/transacciones/other", fields! { "monto" => 3 })
            .await;

        let result = delete_transaction(&session, "10", &leg, DeleteMode::Soft).await;
        assert_eq!(result["deleted"], 2);
        let remaining = store.list("proyectos/10/transacciones").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "other");
    }
}
