use crate::aggregate::{
    AccountBalance, AggregateQuery, Aggregation, Aggregator, DateRange, ExpenseDetail, ExpenseGroup,
};
use crate::budgets::{BudgetReport, BudgetService};
use crate::links::ScopeLinker;
use crate::models::{BudgetPeriod, BudgetTarget, CatalogKind, Transaction};
use crate::session::Session;
use crate::transactions::TransactionService;

use super::{or_default, or_none, AuditOutput, KindAudit};

pub async fn aggregate(session: &Session, project_id: &str, query: &AggregateQuery) -> Aggregation {
    or_default(
        "aggregate",
        Aggregator::new(session).aggregate(project_id, query).await,
    )
}

pub async fn expense_detail(
    session: &Session,
    project_id: &str,
    range: DateRange,
    group: &ExpenseGroup,
) -> Vec<ExpenseDetail> {
    or_default(
        "expense_detail",
        Aggregator::new(session)
            .expense_detail(project_id, range, group)
            .await,
    )
}

pub async fn account_balances(session: &Session) -> Vec<AccountBalance> {
    or_default(
        "account_balances",
        Aggregator::new(session).account_balances().await,
    )
}

pub async fn expense_date_range(session: &Session, project_id: &str) -> Option<DateRange> {
    or_none(
        "expense_date_range",
        Aggregator::new(session).expense_date_range(project_id).await,
    )
    .flatten()
}

pub async fn budget_report(
    session: &Session,
    project_id: &str,
    target: BudgetTarget,
    period: &BudgetPeriod,
) -> Option<BudgetReport> {
    or_none(
        "budget_report",
        BudgetService::new(session)
            .budget_report(project_id, target, period)
            .await,
    )
}

fn ids(transactions: Vec<Transaction>) -> Vec<String> {
    transactions.into_iter().map(|tx| tx.id).collect()
}

/// Orphaned associations and transactions of one project, plus transfer
/// legs that lost their partner. Each check degrades independently.
pub async fn audit_project(session: &Session, project_id: &str) -> AuditOutput {
    let linker = ScopeLinker::new(session);
    let transactions = TransactionService::new(session);

    let mut output = AuditOutput {
        project_id: project_id.to_string(),
        accounts: KindAudit::default(),
        categories: KindAudit::default(),
        subcategories: KindAudit::default(),
        unpaired_transfers: Vec::new(),
    };
    for kind in CatalogKind::ALL {
        let orphan_links = or_default("orphan_links", linker.orphan_links(project_id, kind).await);
        let orphan_transactions = match kind {
            CatalogKind::Accounts => Vec::new(),
            CatalogKind::Categories => ids(or_default(
                "orphan_category_transactions",
                transactions.orphan_category_transactions(project_id).await,
            )),
            CatalogKind::Subcategories => ids(or_default(
                "orphan_subcategory_transactions",
                transactions.orphan_subcategory_transactions(project_id).await,
            )),
        };
        let audit = KindAudit {
            orphan_links,
            orphan_transactions,
        };
        match kind {
            CatalogKind::Accounts => output.accounts = audit,
            CatalogKind::Categories => output.categories = audit,
            CatalogKind::Subcategories => output.subcategories = audit,
        }
    }
    output.unpaired_transfers = ids(or_default(
        "unpaired_transfers",
        transactions.unpaired_transfers(project_id).await,
    ));

    if output.is_clean() {
        tracing::info!(project_id, "Audit found nothing to fix");
    } else {
        tracing::warn!(
            project_id,
            orphan_category_links = output.categories.orphan_links.len(),
            orphan_subcategory_links = output.subcategories.orphan_links.len(),
            orphan_account_links = output.accounts.orphan_links.len(),
            unpaired_transfers = output.unpaired_transfers.len(),
            "Audit found inconsistencies"
        );
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;
    use crate::models::Identifier;
    use crate::store::MemoryStore;
    use chrono::NaiveDate;
    use std::sync::Arc;

    #[tokio::test]
    async fn audit_collects_every_kind() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert("categorias/a", fields! { "id" => 1, "nombre" => "Materials" })
            .await;
        store
            .insert(
                "proyectos/10/categorias_proyecto/l1",
                fields! { "categoria_maestra_id" => 1 },
            )
            .await;
        store
            .insert(
                "proyectos/10/categorias_proyecto/l2",
                fields! { "categoria_maestra_id" => 99 },
            )
            .await;
        store
            .insert(
                "proyectos/10/cuentas_proyecto/c1",
                fields! { "cuenta_id" => 4 },
            )
            .await;
        store
            .insert(
                "proyectos/10/transacciones/t1",
                fields! { "categoria_id" => 99, "tipo" => "gasto" },
            )
            .await;
        store
            .insert(
                "proyectos/10/transacciones/leg",
                fields! {
                    "es_transferencia" => true,
                    "tipo" => "Gasto",
                    "transferencia_vinculada_id" => "gone",
                },
            )
            .await;
        let session = Session::open(store);

        let audit = audit_project(&session, "10").await;
        assert_eq!(audit.categories.orphan_links, vec![Identifier::Numeric(99)]);
        assert_eq!(audit.categories.orphan_transactions, vec!["t1".to_string()]);
        assert_eq!(audit.accounts.orphan_links, vec![Identifier::Numeric(4)]);
        assert!(audit.subcategories.orphan_links.is_empty());
        assert_eq!(audit.unpaired_transfers, vec!["leg".to_string()]);
        assert!(!audit.is_clean());
    }

    #[tokio::test]
    async fn closed_session_reports_are_empty() {
        let session = Session::closed();
        let range = DateRange::month(2025, 1).unwrap();
        assert!(aggregate(&session, "10", &AggregateQuery::new(range))
            .await
            .rows
            .is_empty());
        assert!(account_balances(&session).await.is_empty());
        assert!(expense_date_range(&session, "10").await.is_none());
        let period = BudgetPeriod::new(
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
        );
        assert!(budget_report(&session, "10", BudgetTarget::Category, &period)
            .await
            .is_none());
        assert!(audit_project(&session, "10").await.is_clean());
    }
}
