//! Dashboard totals over a project's transactions.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::catalog::{Catalog, CatalogResolver, Catalogs};
use crate::error::{Error, Result};
use crate::models::{
    is_live, BudgetTarget, CatalogKind, Identifier, Project, Transaction, TransactionType,
};
use crate::schema::{self, field, transactions_of};
use crate::session::Session;
use crate::store::{Document, Query};

/// A grouping axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Month,
    Account,
    Category,
    Subcategory,
}

impl Dimension {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "month" | "mes" => Some(Dimension::Month),
            "account" | "cuenta" => Some(Dimension::Account),
            "category" | "categoria" => Some(Dimension::Category),
            "subcategory" | "subcategoria" => Some(Dimension::Subcategory),
            _ => None,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Dimension::Month => "month",
            Dimension::Account => "account",
            Dimension::Category => "category",
            Dimension::Subcategory => "subcategory",
        })
    }
}

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(Error::invalid(format!(
                "date range starts after it ends ({start} > {end})"
            )));
        }
        Ok(Self { start, end })
    }

    /// The whole calendar month.
    pub fn month(year: i32, month: u32) -> Result<Self> {
        let start = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| Error::invalid(format!("no such month {year}-{month:02}")))?;
        let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
        let end = NaiveDate::from_ymd_opt(next_year, next_month, 1)
            .and_then(|d| d.pred_opt())
            .ok_or_else(|| Error::invalid(format!("no such month {year}-{month:02}")))?;
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

#[derive(Debug, Clone)]
pub struct AggregateQuery {
    pub range: DateRange,
    pub group_by: BTreeSet<Dimension>,
    pub account: Option<Identifier>,
    pub kind: Option<TransactionType>,
}

impl AggregateQuery {
    pub fn new(range: DateRange) -> Self {
        Self {
            range,
            group_by: BTreeSet::new(),
            account: None,
            kind: None,
        }
    }

    pub fn group_by(mut self, dimensions: impl IntoIterator<Item = Dimension>) -> Self {
        self.group_by.extend(dimensions);
        self
    }

    pub fn account(mut self, account: impl Into<Identifier>) -> Self {
        self.account = Some(account.into());
        self
    }

    pub fn kind(mut self, kind: TransactionType) -> Self {
        self.kind = Some(kind);
        self
    }

    fn groups(&self, dimension: Dimension) -> bool {
        self.group_by.contains(&dimension)
    }
}

/// A catalog id with its display name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedRef {
    pub id: Identifier,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<NamedRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<NamedRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<NamedRef>,
    pub total: f64,
    pub count: usize,
}

/// Why transactions were left out of a total.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregateStats {
    pub scanned: usize,
    pub included: usize,
    pub unreadable: usize,
    pub inactive: usize,
    pub transfers: usize,
    pub uncategorized: usize,
    pub bad_date: usize,
    pub out_of_range: usize,
    pub other_kind: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Aggregation {
    pub rows: Vec<AggregateRow>,
    pub stats: AggregateStats,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct GroupKey {
    month: Option<String>,
    account: Option<Identifier>,
    category: Option<Identifier>,
    subcategory: Option<Identifier>,
}

fn named(catalog: &Catalog, id: Option<Identifier>) -> Option<NamedRef> {
    id.map(|id| NamedRef {
        name: catalog.name_or_placeholder(&id),
        id,
    })
}

fn part(row: &AggregateRow, dimension: Dimension) -> Option<&NamedRef> {
    match dimension {
        Dimension::Account => row.account.as_ref(),
        Dimension::Category => row.category.as_ref(),
        Dimension::Subcategory => row.subcategory.as_ref(),
        Dimension::Month => None,
    }
}

fn part_name(row: &AggregateRow, dimension: Dimension) -> &str {
    part(row, dimension).map_or("", |p| p.name.as_str())
}

fn part_id(row: &AggregateRow, dimension: Dimension) -> Option<&Identifier> {
    part(row, dimension).map(|p| &p.id)
}

/// Names first, ids break ties between equal names.
fn compare_parts(a: &AggregateRow, b: &AggregateRow, order: [Dimension; 3]) -> Ordering {
    order
        .iter()
        .map(|&d| part_name(a, d).cmp(part_name(b, d)))
        .chain(order.iter().map(|&d| part_id(a, d).cmp(&part_id(b, d))))
        .find(|ord| ord.is_ne())
        .unwrap_or(Ordering::Equal)
}

fn compare_rows(a: &AggregateRow, b: &AggregateRow, group_by: &BTreeSet<Dimension>) -> Ordering {
    use Dimension::*;

    if group_by.len() == 1 && group_by.contains(&Category) {
        return b
            .total
            .partial_cmp(&a.total)
            .unwrap_or(Ordering::Equal)
            .then_with(|| compare_parts(a, b, [Category, Subcategory, Account]));
    }
    if group_by.contains(&Month) {
        return a
            .month
            .cmp(&b.month)
            .then_with(|| compare_parts(a, b, [Category, Subcategory, Account]));
    }
    compare_parts(a, b, [Account, Category, Subcategory])
}

/// Group and total raw transaction documents.
///
/// Inactive, deleted and transfer records are skipped, as are records in the
/// sentinel `0` category or without one, records with an unreadable date or
/// one outside the range, and records of the other kind when a kind filter
/// is set. Every skip is counted in the stats.
pub fn aggregate_transactions(
    docs: &[Document],
    query: &AggregateQuery,
    names: &Catalogs,
) -> Aggregation {
    let mut stats = AggregateStats::default();
    let mut totals: BTreeMap<GroupKey, (f64, usize)> = BTreeMap::new();

    for doc in docs {
        stats.scanned += 1;
        let tx = match Transaction::from_document(doc) {
            Ok(tx) => tx,
            Err(reason) => {
                tracing::debug!(doc = %doc.path, %reason, "Skipping unreadable transaction");
                stats.unreadable += 1;
                continue;
            }
        };
        if !tx.active {
            stats.inactive += 1;
            continue;
        }
        if tx.is_transfer {
            stats.transfers += 1;
            continue;
        }
        if tx.is_uncategorized() {
            stats.uncategorized += 1;
            continue;
        }
        let Some(date) = tx.date else {
            stats.bad_date += 1;
            continue;
        };
        if !query.range.contains(date) {
            stats.out_of_range += 1;
            continue;
        }
        if let Some(kind) = query.kind {
            if !tx.is(kind) {
                stats.other_kind += 1;
                continue;
            }
        }

        let key = GroupKey {
            month: query
                .groups(Dimension::Month)
                .then(|| format!("{:04}-{:02}", date.year(), date.month())),
            account: tx.account_id.filter(|_| query.groups(Dimension::Account)),
            category: tx.category_id.filter(|_| query.groups(Dimension::Category)),
            subcategory: tx
                .subcategory_id
                .filter(|id| query.groups(Dimension::Subcategory) && !id.is_sentinel_zero()),
        };
        let entry = totals.entry(key).or_insert((0.0, 0));
        entry.0 += tx.amount;
        entry.1 += 1;
        stats.included += 1;
    }

    let mut rows: Vec<AggregateRow> = totals
        .into_iter()
        .map(|(key, (total, count))| AggregateRow {
            month: key.month,
            account: named(names.of(CatalogKind::Accounts), key.account),
            category: named(names.of(CatalogKind::Categories), key.category),
            subcategory: named(names.of(CatalogKind::Subcategories), key.subcategory),
            total,
            count,
        })
        .collect();
    rows.sort_by(|a, b| compare_rows(a, b, &query.group_by));

    Aggregation { rows, stats }
}

/// Selects the expenses behind one aggregate group. `None` matches any value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpenseGroup {
    pub account: Option<Identifier>,
    pub category: Option<Identifier>,
    pub subcategory: Option<Identifier>,
}

impl ExpenseGroup {
    /// The group an aggregate row stands for.
    pub fn of_row(row: &AggregateRow) -> Self {
        let id = |part: &Option<NamedRef>| part.as_ref().map(|p| p.id.clone());
        Self {
            account: id(&row.account),
            category: id(&row.category),
            subcategory: id(&row.subcategory),
        }
    }

    fn matches(&self, tx: &Transaction) -> bool {
        let fits = |wanted: &Option<Identifier>, actual: &Option<Identifier>| {
            wanted
                .as_ref()
                .map_or(true, |w| actual.as_ref().map(Identifier::canonical) == Some(w.canonical()))
        };
        fits(&self.account, &tx.account_id)
            && fits(&self.category, &tx.category_id)
            && fits(&self.subcategory, &tx.subcategory_id)
    }
}

/// One expense record behind a dashboard total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpenseDetail {
    pub id: String,
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<NamedRef>,
    pub category: NamedRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<NamedRef>,
    pub amount: f64,
    pub description: String,
}

/// Live, categorized, non-transfer expenses in `range` that fall in `group`,
/// ordered by category name, subcategory name, then date.
pub fn expense_details(
    docs: &[Document],
    range: DateRange,
    group: &ExpenseGroup,
    names: &Catalogs,
) -> Vec<ExpenseDetail> {
    let mut details: Vec<ExpenseDetail> = docs
        .iter()
        .filter_map(|doc| Transaction::from_document(doc).ok())
        .filter(|tx| tx.active && !tx.is_transfer && tx.is(TransactionType::Expense))
        .filter(|tx| !tx.is_uncategorized() && group.matches(tx))
        .filter_map(|tx| {
            let date = tx.date.filter(|date| range.contains(*date))?;
            let category = named(names.of(CatalogKind::Categories), tx.category_id)?;
            Some(ExpenseDetail {
                account: named(names.of(CatalogKind::Accounts), tx.account_id),
                subcategory: named(
                    names.of(CatalogKind::Subcategories),
                    tx.subcategory_id.filter(|id| !id.is_sentinel_zero()),
                ),
                category,
                date,
                amount: tx.amount,
                description: tx.description,
                id: tx.id,
            })
        })
        .collect();

    details.sort_by(|a, b| {
        a.category
            .name
            .cmp(&b.category.name)
            .then_with(|| {
                let sub = |d: &ExpenseDetail| d.subcategory.as_ref().map(|s| s.name.clone());
                sub(a).cmp(&sub(b))
            })
            .then_with(|| a.date.cmp(&b.date))
            .then_with(|| a.id.cmp(&b.id))
    });
    details
}

/// Income, expense and balance of one account across every project.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountBalance {
    pub account_id: Identifier,
    pub name: String,
    pub income: f64,
    pub expense: f64,
    pub balance: f64,
}

pub struct Aggregator<'a> {
    session: &'a Session,
}

impl<'a> Aggregator<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    async fn transactions(&self, project_id: &str, account: Option<&Identifier>) -> Result<Vec<Document>> {
        let store = self.session.store()?;
        let collection = transactions_of(project_id);
        let docs = match account {
            Some(account) => {
                let query = Query::new().any_of(field::ACCOUNT_ID, account.stored_variants());
                store.query(&collection, &query).await?
            }
            None => store.list(&collection).await?,
        };
        Ok(docs)
    }

    /// A catalog for naming only; failure to load it degrades to
    /// placeholders instead of failing the whole report.
    async fn names_for(&self, kind: CatalogKind, needed: bool) -> Catalog {
        if !needed {
            return Catalog::empty(kind);
        }
        match CatalogResolver::new(self.session).load_catalog(kind).await {
            Ok(catalog) => catalog,
            Err(err) => {
                err.log("load_catalog");
                Catalog::empty(kind)
            }
        }
    }

    pub async fn aggregate(&self, project_id: &str, query: &AggregateQuery) -> Result<Aggregation> {
        let docs = self.transactions(project_id, query.account.as_ref()).await?;
        let names = Catalogs {
            accounts: self
                .names_for(CatalogKind::Accounts, query.groups(Dimension::Account))
                .await,
            categories: self
                .names_for(CatalogKind::Categories, query.groups(Dimension::Category))
                .await,
            subcategories: self
                .names_for(CatalogKind::Subcategories, query.groups(Dimension::Subcategory))
                .await,
        };

        let aggregation = aggregate_transactions(&docs, query, &names);
        tracing::debug!(
            project_id,
            group_by = ?query.group_by,
            rows = aggregation.rows.len(),
            stats = ?aggregation.stats,
            "Aggregated transactions"
        );
        Ok(aggregation)
    }

    /// The expense records that make up one aggregate group.
    pub async fn expense_detail(
        &self,
        project_id: &str,
        range: DateRange,
        group: &ExpenseGroup,
    ) -> Result<Vec<ExpenseDetail>> {
        let docs = self.transactions(project_id, group.account.as_ref()).await?;
        let names = match CatalogResolver::new(self.session).load_all().await {
            Ok(names) => names,
            Err(err) => {
                err.log("load_catalogs");
                Catalogs::empty()
            }
        };
        let details = expense_details(&docs, range, group, &names);
        tracing::debug!(project_id, ?group, rows = details.len(), "Listed expense detail");
        Ok(details)
    }

    /// Earliest and latest date among live, non-transfer expenses.
    pub async fn expense_date_range(&self, project_id: &str) -> Result<Option<DateRange>> {
        let docs = self.transactions(project_id, None).await?;
        let dates: Vec<NaiveDate> = docs
            .iter()
            .filter_map(|doc| Transaction::from_document(doc).ok())
            .filter(|tx| tx.active && !tx.is_transfer && tx.is(TransactionType::Expense))
            .filter_map(|tx| tx.date)
            .collect();

        Ok(match (dates.iter().min(), dates.iter().max()) {
            (Some(&start), Some(&end)) => Some(DateRange { start, end }),
            _ => None,
        })
    }

    /// Expense totals per budgeted catalog id within `range`.
    pub async fn spent_in_period(
        &self,
        project_id: &str,
        target: BudgetTarget,
        range: DateRange,
    ) -> Result<HashMap<Identifier, f64>> {
        let docs = self.transactions(project_id, None).await?;
        let mut spent: HashMap<Identifier, f64> = HashMap::new();
        for tx in docs.iter().filter_map(|doc| Transaction::from_document(doc).ok()) {
            if !tx.active || tx.is_transfer || !tx.is(TransactionType::Expense) {
                continue;
            }
            if !tx.date.is_some_and(|date| range.contains(date)) {
                continue;
            }
            let id = match target {
                BudgetTarget::Category => tx.category_id,
                BudgetTarget::Subcategory => tx.subcategory_id,
            };
            if let Some(id) = id.filter(|id| !id.is_sentinel_zero()) {
                *spent.entry(id).or_default() += tx.amount;
            }
        }
        Ok(spent)
    }

    /// Balances of every catalog account plus any account referenced only by
    /// transactions, ordered by id. Transfers and inactive records are left
    /// out.
    pub async fn account_balances(&self) -> Result<Vec<AccountBalance>> {
        let store = self.session.store()?;
        let accounts = CatalogResolver::new(self.session)
            .load_catalog(CatalogKind::Accounts)
            .await?;
        let projects = store.list(schema::PROJECTS).await?;

        let mut totals: BTreeMap<Identifier, (f64, f64)> = accounts
            .records()
            .into_iter()
            .map(|record| (record.id.canonical(), (0.0, 0.0)))
            .collect();

        for project in projects.iter().filter_map(|doc| Project::from_document(doc).ok()) {
            let docs = store.list(&transactions_of(&project.id)).await?;
            for doc in &docs {
                if !is_live(doc) {
                    continue;
                }
                let Ok(tx) = Transaction::from_document(doc) else {
                    continue;
                };
                let (Some(account), Some(kind)) = (tx.account_id, tx.kind) else {
                    continue;
                };
                if tx.is_transfer {
                    continue;
                }
                let entry = totals.entry(account.canonical()).or_insert((0.0, 0.0));
                match kind {
                    TransactionType::Income => entry.0 += tx.amount,
                    TransactionType::Expense => entry.1 += tx.amount,
                }
            }
        }

        let balances: Vec<AccountBalance> = totals
            .into_iter()
            .map(|(account_id, (income, expense))| AccountBalance {
                name: accounts.name_or_placeholder(&account_id),
                account_id,
                income,
                expense,
                balance: income - expense,
            })
            .collect();
        tracing::info!(accounts = balances.len(), projects = projects.len(), "Computed account balances");
        Ok(balances)
    }
}
