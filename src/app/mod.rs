//! Degrade-to-empty boundary for interactive callers and the CLI.
//!
//! Every function here logs a failed operation through [`Error::log`] and
//! returns an empty, `None` or `{"success": false}` result instead of an
//! error.

mod config;
mod list;
mod mutations;
mod reports;
mod types;

use crate::error::{Error, Result};

pub use config::config_output;
pub use list::{list_catalog, list_links, list_projects, list_recent, list_transactions, load_catalog};
pub use mutations::{
    assign_links, create_transfer, delete_transaction, migrate_attachments, prune_orphan_links,
    save_budgets,
};
pub use reports::{
    account_balances, aggregate, audit_project, budget_report, expense_date_range, expense_detail,
};
pub use types::{AuditOutput, CatalogOutput, KindAudit, LinksOutput, TransactionOutput};

fn or_default<T: Default>(op: &str, result: Result<T>) -> T {
    result.unwrap_or_else(|err: Error| {
        err.log(op);
        T::default()
    })
}

fn or_none<T>(op: &str, result: Result<T>) -> Option<T> {
    result.map_err(|err| err.log(op)).ok()
}
