use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::schema::{field, kind};
use crate::store::Document;

use super::{FieldValue, Fields, Identifier, Parsed, SkipReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Income,
    Expense,
}

impl TransactionType {
    /// Case-insensitive; accepts the stored Spanish spellings and English.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            kind::INCOME | "income" => Some(TransactionType::Income),
            kind::EXPENSE | "expense" => Some(TransactionType::Expense),
            _ => None,
        }
    }

    /// Spelling written by regular transaction writes.
    pub fn as_stored(self) -> &'static str {
        match self {
            TransactionType::Income => kind::INCOME,
            TransactionType::Expense => kind::EXPENSE,
        }
    }

    /// Capitalized spelling used on transfer legs.
    pub fn title(self) -> &'static str {
        match self {
            TransactionType::Income => kind::INCOME_TITLE,
            TransactionType::Expense => kind::EXPENSE_TITLE,
        }
    }

    /// Every stored spelling, for `in` filters.
    pub fn stored_variants(self) -> Vec<FieldValue> {
        vec![self.title().into(), self.as_stored().into()]
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_stored())
    }
}

/// A transaction row as read from a project's `transacciones` collection.
///
/// Parsing is lenient: absent ids stay `None`, unreadable dates leave `date`
/// empty. Only a present but non-numeric `monto` rejects the record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub date: Option<NaiveDate>,
    pub kind: Option<TransactionType>,
    pub account_id: Option<Identifier>,
    pub category_id: Option<Identifier>,
    pub subcategory_id: Option<Identifier>,
    pub amount: f64,
    pub description: String,
    pub comment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subcategory_name: Option<String>,
    pub is_transfer: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_transfer_id: Option<String>,
    pub active: bool,
    pub attachment_paths: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub legacy_attachments: Vec<String>,
}

impl Transaction {
    pub fn from_document(doc: &Document) -> Parsed<Self> {
        let amount = match doc.field(field::AMOUNT) {
            None => 0.0,
            Some(raw) => raw.as_f64().ok_or_else(|| SkipReason::InvalidField {
                field: field::AMOUNT,
                value: raw.to_string(),
            })?,
        };

        let id_of = |name| doc.field(name).and_then(Identifier::normalize);

        let mut legacy_attachments = doc
            .field(field::LEGACY_ATTACHMENTS)
            .map(FieldValue::string_items)
            .unwrap_or_default();
        if legacy_attachments.is_empty() {
            legacy_attachments = doc
                .field(field::LEGACY_ATTACHMENTS_EN)
                .map(FieldValue::string_items)
                .unwrap_or_default();
        }

        Ok(Self {
            id: doc.id.clone(),
            project_id: doc
                .parent_project()
                .map(str::to_string)
                .or_else(|| doc.text(field::PROJECT_ID).map(str::to_string)),
            date: doc.field(field::DATE).and_then(FieldValue::as_date),
            kind: doc.text(field::KIND).and_then(TransactionType::parse),
            account_id: id_of(field::ACCOUNT_ID),
            category_id: id_of(field::CATEGORY_ID),
            subcategory_id: id_of(field::SUBCATEGORY_ID),
            amount,
            description: doc.text(field::DESCRIPTION).unwrap_or_default().to_string(),
            comment: doc.text(field::COMMENT).unwrap_or_default().to_string(),
            category_name: doc.text(field::CATEGORY_NAME).map(str::to_string),
            subcategory_name: doc.text(field::SUBCATEGORY_NAME).map(str::to_string),
            is_transfer: doc.field(field::IS_TRANSFER).is_some_and(FieldValue::is_true),
            linked_transfer_id: doc.text(field::LINKED_TRANSFER).map(str::to_string),
            active: is_live(doc),
            attachment_paths: doc
                .field(field::ATTACHMENT_PATHS)
                .map(FieldValue::string_items)
                .unwrap_or_default(),
            legacy_attachments,
        })
    }

    pub fn is(&self, kind: TransactionType) -> bool {
        self.kind == Some(kind)
    }

    /// `None`, zero, or blank category.
    pub fn is_uncategorized(&self) -> bool {
        self.category_id
            .as_ref()
            .map_or(true, Identifier::is_sentinel_zero)
    }
}

/// `activo` defaults to true; either removal flag hides the record.
pub fn is_live(doc: &Document) -> bool {
    doc.flag(field::ACTIVE, true)
        && !doc.flag(field::REMOVED, false)
        && !doc.field(field::DELETED).is_some_and(FieldValue::is_true)
}

/// Input for a regular (non-transfer) transaction.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub date: NaiveDate,
    pub kind: TransactionType,
    pub account_id: Identifier,
    pub category_id: Identifier,
    pub subcategory_id: Option<Identifier>,
    pub amount: f64,
    pub description: String,
    pub comment: String,
    pub category_name: Option<String>,
    pub subcategory_name: Option<String>,
    pub attachment_paths: Vec<String>,
    pub legacy_attachments: Vec<String>,
}

impl NewTransaction {
    pub fn new(
        date: NaiveDate,
        kind: TransactionType,
        account_id: impl Into<Identifier>,
        category_id: impl Into<Identifier>,
        amount: f64,
    ) -> Self {
        Self {
            date,
            kind,
            account_id: account_id.into(),
            category_id: category_id.into(),
            subcategory_id: None,
            amount,
            description: String::new(),
            comment: String::new(),
            category_name: None,
            subcategory_name: None,
            attachment_paths: Vec::new(),
            legacy_attachments: Vec::new(),
        }
    }

    pub fn with_subcategory(mut self, id: impl Into<Identifier>) -> Self {
        self.subcategory_id = Some(id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Stored form. Attachment paths win; legacy URLs are only written when
    /// no path is given.
    pub fn to_fields(&self, project_id: &str, now: DateTime<Utc>) -> Fields {
        let mut fields = crate::fields! {
            field::DATE => format_date(self.date),
            field::KIND => self.kind.as_stored(),
            field::ACCOUNT_ID => &self.account_id,
            field::CATEGORY_ID => &self.category_id,
            field::AMOUNT => self.amount.abs(),
            field::DESCRIPTION => self.description.as_str(),
            field::COMMENT => self.comment.as_str(),
            field::PROJECT_ID => project_id,
            field::ACTIVE => true,
            field::CREATED_AT => now,
            field::UPDATED_AT => now,
        };
        if let Some(sub) = &self.subcategory_id {
            fields.insert(field::SUBCATEGORY_ID.into(), sub.to_value());
        }
        if let Some(name) = &self.category_name {
            fields.insert(field::CATEGORY_NAME.into(), name.as_str().into());
        }
        if let Some(name) = &self.subcategory_name {
            fields.insert(field::SUBCATEGORY_NAME.into(), name.as_str().into());
        }
        if !self.attachment_paths.is_empty() {
            fields.insert(
                field::ATTACHMENT_PATHS.into(),
                self.attachment_paths.clone().into(),
            );
        } else if !self.legacy_attachments.is_empty() {
            fields.insert(
                field::LEGACY_ATTACHMENTS.into(),
                self.legacy_attachments.clone().into(),
            );
        }
        fields
    }
}

/// Partial update. `None` leaves the stored field untouched.
#[derive(Debug, Clone, Default)]
pub struct TransactionPatch {
    pub date: Option<NaiveDate>,
    pub kind: Option<TransactionType>,
    pub account_id: Option<Identifier>,
    pub category_id: Option<Identifier>,
    pub subcategory_id: Option<Identifier>,
    pub amount: Option<f64>,
    pub description: Option<String>,
    pub comment: Option<String>,
    pub attachment_paths: Option<Vec<String>>,
}

impl TransactionPatch {
    pub fn is_empty(&self) -> bool {
        self.to_fields_inner().is_empty()
    }

    pub fn to_fields(&self, now: DateTime<Utc>) -> Fields {
        let mut fields = self.to_fields_inner();
        fields.insert(field::MODIFIED_AT.into(), now.into());
        fields.insert(field::UPDATED_AT.into(), now.into());
        fields
    }

    fn to_fields_inner(&self) -> Fields {
        let mut fields = Fields::new();
        let mut put = |name: &str, value: Option<FieldValue>| {
            if let Some(value) = value {
                fields.insert(name.to_string(), value);
            }
        };
        put(field::DATE, self.date.map(|d| format_date(d).into()));
        put(field::KIND, self.kind.map(|k| k.as_stored().into()));
        put(field::ACCOUNT_ID, self.account_id.as_ref().map(Identifier::to_value));
        put(field::CATEGORY_ID, self.category_id.as_ref().map(Identifier::to_value));
        put(
            field::SUBCATEGORY_ID,
            self.subcategory_id.as_ref().map(Identifier::to_value),
        );
        put(field::AMOUNT, self.amount.map(|a| a.abs().into()));
        put(field::DESCRIPTION, self.description.clone().map(Into::into));
        put(field::COMMENT, self.comment.clone().map(Into::into));
        put(
            field::ATTACHMENT_PATHS,
            self.attachment_paths.clone().map(Into::into),
        );
        fields
    }
}

/// A move of money between two accounts of one project.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub date: NaiveDate,
    pub from_account: Identifier,
    pub to_account: Identifier,
    pub amount: f64,
    pub note: Option<String>,
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;

    fn doc(fields: Fields) -> Document {
        Document::new("proyectos/7/transacciones/t1", fields)
    }

    #[test]
    fn type_parsing_is_case_insensitive() {
        assert_eq!(TransactionType::parse("Gasto"), Some(TransactionType::Expense));
        assert_eq!(TransactionType::parse(" INGRESO "), Some(TransactionType::Income));
        assert_eq!(TransactionType::parse("expense"), Some(TransactionType::Expense));
        assert_eq!(TransactionType::parse("transfer"), None);
    }

    #[test]
    fn parses_mixed_representations() {
        let tx = Transaction::from_document(&doc(fields! {
            "fecha" => "2024-01-05 00:00:00",
            "tipo" => "gasto",
            "cuenta_id" => "3",
            "categoria_id" => 1,
            "monto" => "100.5",
            "es_transferencia" => false,
        }))
        .unwrap();
        assert_eq!(tx.project_id.as_deref(), Some("7"));
        assert_eq!(tx.date, NaiveDate::from_ymd_opt(2024, 1, 5));
        assert_eq!(tx.account_id, Some(Identifier::Numeric(3)));
        assert_eq!(tx.amount, 100.5);
        assert!(tx.active);
        assert!(!tx.is_uncategorized());
    }

    #[test]
    fn garbage_amount_is_a_skip() {
        let outcome = Transaction::from_document(&doc(fields! { "monto" => "abc" }));
        assert!(matches!(
            outcome,
            Err(SkipReason::InvalidField { field: "monto", .. })
        ));
    }

    #[test]
    fn removal_flags_hide_records() {
        let inactive = doc(fields! { "activo" => false });
        let removed = doc(fields! { "eliminado" => true });
        let deleted = doc(fields! { "deleted" => true });
        let live = doc(fields! { "deleted" => "yes" });
        assert!(!is_live(&inactive));
        assert!(!is_live(&removed));
        assert!(!is_live(&deleted));
        assert!(is_live(&live));
    }

    #[test]
    fn new_transaction_stores_absolute_amount_and_prefers_paths() {
        let now = Utc::now();
        let mut input = NewTransaction::new(
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            TransactionType::Expense,
            2,
            5,
            -40.0,
        );
        input.attachment_paths = vec!["Proyecto/7/a.pdf".to_string()];
        input.legacy_attachments = vec!["https://old".to_string()];
        let fields = input.to_fields("7", now);
        assert_eq!(fields.get("monto"), Some(&FieldValue::Double(40.0)));
        assert_eq!(fields.get("tipo"), Some(&FieldValue::from("gasto")));
        assert_eq!(fields.get("fecha"), Some(&FieldValue::from("2024-03-01")));
        assert!(fields.contains_key("adjuntos_paths"));
        assert!(!fields.contains_key("adjuntos"));
    }

    #[test]
    fn empty_patch_only_touches_timestamps() {
        let patch = TransactionPatch::default();
        assert!(patch.is_empty());
        assert_eq!(patch.to_fields(Utc::now()).len(), 2);
    }
}
