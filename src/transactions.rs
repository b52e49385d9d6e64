//! Transaction reads and writes, transfers and the orphan audits.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::catalog::{Catalog, CatalogResolver};
use crate::error::{Error, Result};
use crate::fields;
use crate::links::ScopeLinker;
use crate::models::{
    format_date, is_live, CatalogKind, FieldValue, Fields, Identifier, NewTransaction,
    Transaction, TransactionPatch, TransactionType, TransferRequest,
};
use crate::schema::{self, field, transactions_of, transfer_text};
use crate::session::Session;
use crate::store::{commit_chunked, doc_path, Direction, Document, Query, Write};

fn account_reference() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"Cuenta (\d+)").expect("valid account reference pattern"))
}

/// Replace `Cuenta <n>` references with account names where known.
pub fn resolve_account_references(description: &str, accounts: &Catalog) -> String {
    account_reference()
        .replace_all(description, |caps: &Captures| {
            caps[1]
                .parse::<i64>()
                .ok()
                .and_then(|id| accounts.get(&Identifier::Numeric(id)))
                .map(|record| record.name.clone())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Account label written into transfer descriptions.
fn transfer_account_label(accounts: &Catalog, id: &Identifier) -> String {
    accounts
        .get(id)
        .map(|record| record.name.clone())
        .unwrap_or_else(|| format!("{} {id}", transfer_text::UNNAMED_ACCOUNT))
}

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub account: Option<Identifier>,
    pub include_deleted: bool,
}

/// Keys of the two legs written by [`TransactionService::create_transfer`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TransferLegs {
    pub expense_id: String,
    pub income_id: String,
}

/// How [`TransactionService::delete`] removes a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    /// Mark inactive and stamp `fecha_eliminacion`.
    Soft,
    Hard,
}

pub struct TransactionService<'a> {
    session: &'a Session,
}

impl<'a> TransactionService<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    async fn account_names(&self) -> Catalog {
        match CatalogResolver::new(self.session)
            .load_catalog(CatalogKind::Accounts)
            .await
        {
            Ok(catalog) => catalog,
            Err(err) => {
                tracing::warn!(error = %err, "Could not load account names");
                Catalog::empty(CatalogKind::Accounts)
            }
        }
    }

    /// Project transactions, newest first. Transfer descriptions get their
    /// account references rewritten to names.
    pub async fn list(&self, project_id: &str, filter: &ListFilter) -> Result<Vec<Transaction>> {
        let store = self.session.store()?;
        let collection = transactions_of(project_id);
        let docs = match &filter.account {
            Some(account) => {
                let query = Query::new().any_of(field::ACCOUNT_ID, account.stored_variants());
                store.query(&collection, &query).await?
            }
            None => store.list(&collection).await?,
        };
        let accounts = self.account_names().await;

        let mut excluded = 0;
        let mut transactions = Vec::with_capacity(docs.len());
        for doc in &docs {
            if !filter.include_deleted && !is_live(doc) {
                excluded += 1;
                continue;
            }
            let mut tx = match Transaction::from_document(doc) {
                Ok(tx) => tx,
                Err(reason) => {
                    tracing::debug!(doc = %doc.path, %reason, "Skipping unreadable transaction");
                    excluded += 1;
                    continue;
                }
            };
            if tx.is_transfer || tx.description.contains(transfer_text::MARKER) {
                tx.description = resolve_account_references(&tx.description, &accounts);
            }
            transactions.push(tx);
        }
        transactions.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id)));

        tracing::info!(
            project_id,
            count = transactions.len(),
            transfers = transactions.iter().filter(|tx| tx.is_transfer).count(),
            excluded,
            "Listed transactions"
        );
        Ok(transactions)
    }

    async fn document(&self, project_id: &str, id: &str) -> Result<Document> {
        let store = self.session.store()?;
        store
            .get(&doc_path(&transactions_of(project_id), id))
            .await?
            .ok_or_else(|| Error::not_found(format!("transaction {id} in project {project_id}")))
    }

    pub async fn get(&self, project_id: &str, id: &str) -> Result<Transaction> {
        let doc = self.document(project_id, id).await?;
        Transaction::from_document(&doc)
            .map_err(|reason| Error::invalid(format!("transaction {id}: {reason}")))
    }

    pub async fn create(&self, project_id: &str, new: &NewTransaction) -> Result<Transaction> {
        if !new.amount.is_finite() {
            return Err(Error::invalid("amount must be a finite number"));
        }
        let store = self.session.store()?;
        let collection = transactions_of(project_id);
        let fields = new.to_fields(project_id, self.session.clock().now());
        let key = store.add(&collection, fields.clone()).await?;
        tracing::info!(project_id, id = %key, kind = %new.kind, amount = new.amount.abs(), "Created transaction");

        let doc = Document::new(doc_path(&collection, &key), fields);
        Transaction::from_document(&doc)
            .map_err(|reason| Error::invalid(format!("transaction {key}: {reason}")))
    }

    pub async fn update(&self, project_id: &str, id: &str, patch: &TransactionPatch) -> Result<()> {
        if patch.is_empty() {
            return Err(Error::invalid("nothing to update"));
        }
        if patch.amount.is_some_and(|amount| !amount.is_finite()) {
            return Err(Error::invalid("amount must be a finite number"));
        }
        let doc = self.document(project_id, id).await?;
        let store = self.session.store()?;
        store
            .update(&doc.path, patch.to_fields(self.session.clock().now()))
            .await?;
        tracing::info!(project_id, id, "Updated transaction");
        Ok(())
    }

    pub async fn delete(&self, project_id: &str, id: &str, mode: DeleteMode) -> Result<()> {
        let doc = self.document(project_id, id).await?;
        let store = self.session.store()?;
        match mode {
            DeleteMode::Soft => {
                let now = self.session.clock().now();
                store
                    .update(
                        &doc.path,
                        fields! {
                            field::ACTIVE => false,
                            field::DELETED_AT => now,
                            field::UPDATED_AT => now,
                        },
                    )
                    .await?;
            }
            DeleteMode::Hard => store.delete(&doc.path).await?,
        }
        tracing::info!(project_id, id, ?mode, "Deleted transaction");
        Ok(())
    }

    /// Write both legs of a transfer in one atomic batch: an expense on the
    /// source account and an income on the destination, each pointing at the
    /// other through `transferencia_vinculada_id`.
    pub async fn create_transfer(
        &self,
        project_id: &str,
        request: &TransferRequest,
    ) -> Result<TransferLegs> {
        let from = request.from_account.canonical();
        let to = request.to_account.canonical();
        if from == to {
            return Err(Error::invalid("cannot transfer to the same account"));
        }
        if !(request.amount.is_finite() && request.amount > 0.0) {
            return Err(Error::invalid("transfer amount must be positive"));
        }

        let store = self.session.store()?;
        let accounts = self.account_names().await;
        let from_name = transfer_account_label(&accounts, &from);
        let to_name = transfer_account_label(&accounts, &to);

        let note = request
            .note
            .as_deref()
            .map(str::trim)
            .filter(|note| !note.is_empty());
        let with_note = |text: String| match note {
            Some(note) => format!("{text} - {note}"),
            None => text,
        };
        let comment = note.unwrap_or(transfer_text::DEFAULT_COMMENT);

        let collection = transactions_of(project_id);
        let expense_id = store.new_key();
        let income_id = store.new_key();
        let now = self.session.clock().now();

        let leg = |kind: TransactionType, account: &Identifier, description: String, other: &str| -> Fields {
            fields! {
                field::KIND => kind.title(),
                field::ACCOUNT_ID => account,
                field::CATEGORY_ID => 0,
                field::SUBCATEGORY_ID => 0,
                field::DATE => format_date(request.date),
                field::AMOUNT => request.amount.abs(),
                field::DESCRIPTION => description,
                field::COMMENT => comment,
                field::PROJECT_ID => project_id,
                field::IS_TRANSFER => true,
                field::LINKED_TRANSFER => other,
                field::ACTIVE => true,
                field::CREATED_AT => now,
                field::UPDATED_AT => now,
            }
        };

        let writes = vec![
            Write::Set {
                path: doc_path(&collection, &expense_id),
                fields: leg(
                    TransactionType::Expense,
                    &from,
                    with_note(format!("{} {to_name}", transfer_text::TO)),
                    &income_id,
                ),
            },
            Write::Set {
                path: doc_path(&collection, &income_id),
                fields: leg(
                    TransactionType::Income,
                    &to,
                    with_note(format!("{} {from_name}", transfer_text::FROM)),
                    &expense_id,
                ),
            },
        ];
        store.commit(writes).await?;

        tracing::info!(
            project_id,
            from = %from_name,
            to = %to_name,
            amount = request.amount,
            date = %request.date,
            "Created transfer"
        );
        Ok(TransferLegs {
            expense_id,
            income_id,
        })
    }

    /// Delete a transfer leg and its partner in one batch.
    pub async fn delete_transfer(&self, project_id: &str, leg_id: &str) -> Result<usize> {
        let leg = self.get(project_id, leg_id).await?;
        if !leg.is_transfer {
            return Err(Error::invalid(format!("transaction {leg_id} is not a transfer")));
        }
        let store = self.session.store()?;
        let collection = transactions_of(project_id);

        let mut writes = vec![Write::Delete {
            path: doc_path(&collection, &leg.id),
        }];
        match &leg.linked_transfer_id {
            Some(partner) if store.get(&doc_path(&collection, partner)).await?.is_some() => {
                writes.push(Write::Delete {
                    path: doc_path(&collection, partner),
                });
            }
            partner => {
                tracing::warn!(project_id, leg_id, ?partner, "Transfer leg has no partner to delete");
            }
        }
        let deleted = writes.len();
        store.commit(writes).await?;
        tracing::info!(project_id, leg_id, deleted, "Deleted transfer");
        Ok(deleted)
    }

    /// Transfer legs whose partner is missing or does not point back.
    pub async fn unpaired_transfers(&self, project_id: &str) -> Result<Vec<Transaction>> {
        let legs: Vec<Transaction> = self
            .list(project_id, &ListFilter { account: None, include_deleted: true })
            .await?
            .into_iter()
            .filter(|tx| tx.is_transfer)
            .collect();

        let unpaired: Vec<Transaction> = legs
            .iter()
            .filter(|leg| {
                let partner = leg
                    .linked_transfer_id
                    .as_ref()
                    .and_then(|other| legs.iter().find(|candidate| &candidate.id == other));
                !partner.is_some_and(|partner| {
                    partner.linked_transfer_id.as_deref() == Some(leg.id.as_str())
                        && partner.kind != leg.kind
                })
            })
            .cloned()
            .collect();
        Ok(unpaired)
    }

    /// Move transactions to another category and subcategory, updating the
    /// denormalized names. Writes are chunked at the store's batch limit.
    pub async fn reassign(
        &self,
        project_id: &str,
        ids: &[String],
        category: &Identifier,
        subcategory: Option<&Identifier>,
    ) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let store = self.session.store()?;
        let resolver = CatalogResolver::new(self.session);
        let categories = resolver.load_catalog(CatalogKind::Categories).await?;
        let subcategories = resolver.load_catalog(CatalogKind::Subcategories).await?;

        let now = self.session.clock().now();
        let mut fields = fields! {
            field::CATEGORY_ID => category,
            field::CATEGORY_NAME => categories.name_or_placeholder(category),
            field::UPDATED_AT => now,
        };
        match subcategory {
            Some(sub) => {
                fields.insert(field::SUBCATEGORY_ID.into(), sub.to_value());
                fields.insert(
                    field::SUBCATEGORY_NAME.into(),
                    subcategories.name_or_placeholder(sub).into(),
                );
            }
            None => {
                fields.insert(field::SUBCATEGORY_ID.into(), FieldValue::Null);
                fields.insert(field::SUBCATEGORY_NAME.into(), FieldValue::Null);
            }
        }

        let collection = transactions_of(project_id);
        let writes: Vec<Write> = ids
            .iter()
            .map(|id| Write::Update {
                path: doc_path(&collection, id),
                fields: fields.clone(),
            })
            .collect();
        let batches = commit_chunked(store.as_ref(), writes).await?;
        tracing::info!(
            project_id,
            count = ids.len(),
            batches,
            category = %category,
            subcategory = ?subcategory,
            "Reassigned transactions"
        );
        Ok(ids.len())
    }

    async fn ids_matching(
        &self,
        project_id: &str,
        matches: impl Fn(&Transaction) -> bool,
    ) -> Result<Vec<String>> {
        let store = self.session.store()?;
        let docs = store.list(&transactions_of(project_id)).await?;
        Ok(docs
            .iter()
            .filter_map(|doc| Transaction::from_document(doc).ok())
            .filter(|tx| !tx.is_transfer && matches(tx))
            .map(|tx| tx.id)
            .collect())
    }

    /// Reassign every non-transfer transaction in category `from`, or every
    /// uncategorized one when `from` is `None`.
    pub async fn reassign_by_category(
        &self,
        project_id: &str,
        from: Option<&Identifier>,
        category: &Identifier,
        subcategory: Option<&Identifier>,
    ) -> Result<usize> {
        let from = from.map(Identifier::canonical);
        let ids = self
            .ids_matching(project_id, |tx| match &from {
                Some(from) => tx.category_id.as_ref() == Some(from),
                None => tx.is_uncategorized(),
            })
            .await?;
        self.reassign(project_id, &ids, category, subcategory).await
    }

    /// Same as [`Self::reassign_by_category`], matching on the subcategory.
    pub async fn reassign_by_subcategory(
        &self,
        project_id: &str,
        from: Option<&Identifier>,
        category: &Identifier,
        subcategory: Option<&Identifier>,
    ) -> Result<usize> {
        let from = from.map(Identifier::canonical);
        let ids = self
            .ids_matching(project_id, |tx| match &from {
                Some(from) => tx.subcategory_id.as_ref() == Some(from),
                None => tx
                    .subcategory_id
                    .as_ref()
                    .map_or(true, Identifier::is_sentinel_zero),
            })
            .await?;
        self.reassign(project_id, &ids, category, subcategory).await
    }

    /// Most recent transactions across every project, by `fecha` descending.
    ///
    /// Removed records are filtered after the query, so the fetch size doubles
    /// until `limit` live rows are found or the collection runs out.
    ///
    /// Needs a collection-group index on `transacciones.fecha`; without it
    /// the store fails and this returns [`Error::MissingIndex`].
    pub async fn global_recent(&self, limit: usize, include_deleted: bool) -> Result<Vec<Transaction>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let store = self.session.store()?;
        let mut fetch = limit;
        loop {
            let query = Query::new()
                .order_by(field::DATE, Direction::Descending)
                .limit(fetch);
            let docs = store.collection_group(schema::TRANSACTIONS, &query).await?;
            let exhausted = docs.len() < fetch;

            let mut transactions: Vec<Transaction> = docs
                .iter()
                .filter(|doc| include_deleted || is_live(doc))
                .filter_map(|doc| Transaction::from_document(doc).ok())
                .collect();
            if transactions.len() >= limit || exhausted {
                transactions.truncate(limit);
                tracing::info!(
                    count = transactions.len(),
                    fetched = docs.len(),
                    "Listed recent transactions across projects"
                );
                return Ok(transactions);
            }
            fetch = fetch.saturating_mul(2);
        }
    }

    pub async fn orphan_category_transactions(&self, project_id: &str) -> Result<Vec<Transaction>> {
        self.orphans(project_id, CatalogKind::Categories).await
    }

    pub async fn orphan_subcategory_transactions(
        &self,
        project_id: &str,
    ) -> Result<Vec<Transaction>> {
        self.orphans(project_id, CatalogKind::Subcategories).await
    }

    /// Live transactions whose category (or subcategory) is not active for
    /// the project. A record counts when its id is outside the project's
    /// active set, or when the id is missing or `0` but a denormalized name
    /// is still present. Projects with no associations of that kind have no
    /// orphans.
    async fn orphans(&self, project_id: &str, kind: CatalogKind) -> Result<Vec<Transaction>> {
        let active: HashSet<Identifier> = ScopeLinker::new(self.session)
            .active_ids(project_id, kind)
            .await?;
        if active.is_empty() {
            tracing::info!(project_id, link = %kind, "No project associations, skipping orphan audit");
            return Ok(Vec::new());
        }

        let store = self.session.store()?;
        let docs = store.list(&transactions_of(project_id)).await?;
        let orphans: Vec<Transaction> = docs
            .iter()
            .filter(|doc| is_live(doc))
            .filter_map(|doc| Transaction::from_document(doc).ok())
            .filter(|tx| {
                let (id, name) = match kind {
                    CatalogKind::Subcategories => (&tx.subcategory_id, &tx.subcategory_name),
                    _ => (&tx.category_id, &tx.category_name),
                };
                match id.as_ref().filter(|id| !id.is_sentinel_zero()) {
                    Some(id) => !active.contains(&id.canonical()),
                    None => name.is_some(),
                }
            })
            .collect();

        tracing::info!(project_id, link = %kind, count = orphans.len(), "Orphan transaction audit");
        Ok(orphans)
    }
}
