//! Per-period budgets for categories and subcategories.
//!
//! A period's budget set is replaced wholesale on every save. Budgets are
//! matched to a period by exact equality on both stored bounds.

use std::collections::HashMap;

use serde::Serialize;

use crate::aggregate::{Aggregator, DateRange};
use crate::catalog::{Catalog, CatalogResolver};
use crate::error::Result;
use crate::models::{Budget, BudgetEntry, BudgetPeriod, BudgetTarget, CatalogKind, Identifier};
use crate::schema::{field, project_collection};
use crate::session::Session;
use crate::store::{commit_chunked, doc_path, Document, Query, Write};

/// Budgeted against spent for one catalog id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetLine {
    pub id: Identifier,
    pub name: String,
    pub budget: f64,
    pub spent: f64,
    pub remaining: f64,
    /// Spending with no budget line for the period.
    pub unbudgeted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetReport {
    pub target: BudgetTarget,
    pub period: BudgetPeriod,
    pub lines: Vec<BudgetLine>,
    pub total_budget: f64,
    pub total_spent: f64,
}

fn catalog_kind(target: BudgetTarget) -> CatalogKind {
    match target {
        BudgetTarget::Category => CatalogKind::Categories,
        BudgetTarget::Subcategory => CatalogKind::Subcategories,
    }
}

pub struct BudgetService<'a> {
    session: &'a Session,
}

impl<'a> BudgetService<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    async fn period_documents(
        &self,
        project_id: &str,
        target: BudgetTarget,
        period: &BudgetPeriod,
    ) -> Result<Vec<Document>> {
        let store = self.session.store()?;
        let query = Query::new()
            .eq(field::PERIOD_START, period.start_timestamp())
            .eq(field::PERIOD_END, period.end_timestamp());
        Ok(store
            .query(&project_collection(project_id, target.collection()), &query)
            .await?)
    }

    pub async fn budgets_for_period(
        &self,
        project_id: &str,
        target: BudgetTarget,
        period: &BudgetPeriod,
    ) -> Result<Vec<Budget>> {
        let docs = self.period_documents(project_id, target, period).await?;
        let mut budgets = Vec::with_capacity(docs.len());
        for doc in &docs {
            match Budget::from_document(target, doc) {
                Ok(budget) => budgets.push(budget),
                Err(reason) => {
                    tracing::debug!(project_id, doc = %doc.id, %reason, "Skipping budget");
                }
            }
        }
        Ok(budgets)
    }

    /// Replace the budgets stored for `period` with `entries`.
    ///
    /// Missing names are filled from the catalog, and subcategory entries
    /// without a parent get the catalog's. Entries with a blank id are
    /// dropped. Returns the number of budgets written.
    pub async fn save_budgets(
        &self,
        project_id: &str,
        target: BudgetTarget,
        period: &BudgetPeriod,
        entries: &[BudgetEntry],
    ) -> Result<usize> {
        let existing = self.period_documents(project_id, target, period).await?;
        let store = self.session.store()?;
        let catalog = CatalogResolver::new(self.session)
            .load_catalog(catalog_kind(target))
            .await?;

        let collection = project_collection(project_id, target.collection());
        let now = self.session.clock().now();
        let mut writes: Vec<Write> = existing
            .iter()
            .map(|doc| Write::Delete {
                path: doc.path.clone(),
            })
            .collect();

        let mut written = 0;
        for entry in entries {
            if entry.target_id.to_string().trim().is_empty() {
                tracing::warn!(project_id, "Skipping budget entry without an id");
                continue;
            }
            let mut entry = entry.clone();
            let record = catalog.get(&entry.target_id);
            if entry.name.is_none() {
                entry.name = record.map(|record| record.name.clone());
            }
            if target == BudgetTarget::Subcategory && entry.category_id.is_none() {
                entry.category_id = record.and_then(|record| record.parent_category_id.clone());
            }
            writes.push(Write::Set {
                path: doc_path(&collection, &store.new_key()),
                fields: entry.to_fields(target, period, now),
            });
            written += 1;
        }

        let batches = commit_chunked(store.as_ref(), writes).await?;
        tracing::info!(
            project_id,
            ?target,
            start = %period.start,
            end = %period.end,
            replaced = existing.len(),
            written,
            batches,
            "Saved budgets"
        );
        Ok(written)
    }

    /// Budgets for the period joined with live expense totals over the same
    /// dates. Ids with spending but no budget are included with a zero
    /// budget.
    pub async fn budget_report(
        &self,
        project_id: &str,
        target: BudgetTarget,
        period: &BudgetPeriod,
    ) -> Result<BudgetReport> {
        let budgets = self.budgets_for_period(project_id, target, period).await?;
        let range = DateRange::new(period.start, period.end)?;
        let mut spent = Aggregator::new(self.session)
            .spent_in_period(project_id, target, range)
            .await?;
        let catalog = match CatalogResolver::new(self.session)
            .load_catalog(catalog_kind(target))
            .await
        {
            Ok(catalog) => catalog,
            Err(err) => {
                err.log("load_catalog");
                Catalog::empty(catalog_kind(target))
            }
        };

        let mut budgeted: HashMap<Identifier, (f64, Option<String>)> = HashMap::new();
        for budget in budgets {
            let entry = budgeted
                .entry(budget.target_id.canonical())
                .or_insert((0.0, None));
            entry.0 += budget.amount;
            if entry.1.is_none() {
                entry.1 = budget.name;
            }
        }

        let mut lines: Vec<BudgetLine> = budgeted
            .into_iter()
            .map(|(id, (budget, stored_name))| {
                let spent = spent.remove(&id).unwrap_or(0.0);
                let name = catalog
                    .get(&id)
                    .map(|record| record.name.clone())
                    .or(stored_name)
                    .unwrap_or_else(|| catalog.name_or_placeholder(&id));
                BudgetLine {
                    id,
                    name,
                    budget,
                    spent,
                    remaining: budget - spent,
                    unbudgeted: false,
                }
            })
            .collect();
        lines.extend(spent.into_iter().map(|(id, spent)| BudgetLine {
            name: catalog.name_or_placeholder(&id),
            id,
            budget: 0.0,
            spent,
            remaining: -spent,
            unbudgeted: true,
        }));
        lines.sort_by(|a, b| {
            a.unbudgeted
                .cmp(&b.unbudgeted)
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
                .then_with(|| a.id.cmp(&b.id))
        });

        Ok(BudgetReport {
            target,
            period: *period,
            total_budget: lines.iter().map(|line| line.budget).sum(),
            total_spent: lines.iter().map(|line| line.spent).sum(),
            lines,
        })
    }
}
