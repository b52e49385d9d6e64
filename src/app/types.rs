use serde::Serialize;

use crate::links::ScopeLink;
use crate::models::{CatalogKind, CatalogRecord, Identifier, Transaction};

/// JSON output for one catalog
#[derive(Debug, Serialize)]
pub struct CatalogOutput {
    pub kind: CatalogKind,
    pub entries: Vec<CatalogRecord>,
    /// Records that could not be read.
    pub skipped: usize,
}

/// JSON output for a project's associations of one kind
#[derive(Debug, Serialize)]
pub struct LinksOutput {
    pub project_id: String,
    pub kind: CatalogKind,
    pub links: Vec<ScopeLink>,
    pub orphans: Vec<Identifier>,
}

/// JSON output for transactions
#[derive(Debug, Serialize)]
pub struct TransactionOutput {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub date: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Negative for expenses.
    pub signed_amount: f64,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<Identifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<Identifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subcategory_id: Option<Identifier>,
    pub is_transfer: bool,
    pub active: bool,
}

impl From<&Transaction> for TransactionOutput {
    fn from(tx: &Transaction) -> Self {
        let signed_amount = match tx.kind {
            Some(crate::models::TransactionType::Expense) => -tx.amount,
            _ => tx.amount,
        };
        Self {
            id: tx.id.clone(),
            project_id: tx.project_id.clone(),
            date: tx.date.map(crate::models::format_date),
            kind: tx.kind.map(|kind| kind.as_stored().to_string()),
            signed_amount,
            description: tx.description.clone(),
            account_id: tx.account_id.clone(),
            category_id: tx.category_id.clone(),
            subcategory_id: tx.subcategory_id.clone(),
            is_transfer: tx.is_transfer,
            active: tx.active,
        }
    }
}

/// Orphans of one association kind.
#[derive(Debug, Default, Serialize)]
pub struct KindAudit {
    pub orphan_links: Vec<Identifier>,
    pub orphan_transactions: Vec<String>,
}

/// JSON output for a project audit
#[derive(Debug, Serialize)]
pub struct AuditOutput {
    pub project_id: String,
    pub accounts: KindAudit,
    pub categories: KindAudit,
    pub subcategories: KindAudit,
    /// Transfer legs whose partner is missing or does not point back.
    pub unpaired_transfers: Vec<String>,
}

impl AuditOutput {
    pub fn is_clean(&self) -> bool {
        [&self.accounts, &self.categories, &self.subcategories]
            .iter()
            .all(|audit| audit.orphan_links.is_empty() && audit.orphan_transactions.is_empty())
            && self.unpaired_transfers.is_empty()
    }
}
