use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use crate::schema::{self, field};
use crate::store::Document;

use super::{FieldValue, Fields, Identifier, Parsed, SkipReason};

/// What a budget line is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetTarget {
    Category,
    Subcategory,
}

impl BudgetTarget {
    pub fn collection(self) -> &'static str {
        match self {
            BudgetTarget::Category => schema::CATEGORY_BUDGETS,
            BudgetTarget::Subcategory => schema::SUBCATEGORY_BUDGETS,
        }
    }

    /// Field holding the budgeted catalog id (also the transaction field
    /// spending is matched on).
    pub fn id_field(self) -> &'static str {
        match self {
            BudgetTarget::Category => field::CATEGORY_ID,
            BudgetTarget::Subcategory => field::SUBCATEGORY_ID,
        }
    }

    pub fn name_field(self) -> &'static str {
        match self {
            BudgetTarget::Category => field::BUDGET_CATEGORY_NAME,
            BudgetTarget::Subcategory => field::BUDGET_SUBCATEGORY_NAME,
        }
    }
}

/// Inclusive budget period. Stored as a start-of-day and an end-of-day
/// timestamp, and matched by exact equality on both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BudgetPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl BudgetPeriod {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn start_timestamp(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.start.and_time(chrono::NaiveTime::MIN))
    }

    pub fn end_timestamp(&self) -> DateTime<Utc> {
        let end_of_day =
            chrono::NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(chrono::NaiveTime::MIN);
        Utc.from_utc_datetime(&self.end.and_time(end_of_day))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Budget {
    pub doc_id: String,
    pub target: BudgetTarget,
    pub target_id: Identifier,
    /// Subcategory budgets also record their parent category.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<Identifier>,
    pub amount: f64,
    pub notes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Budget {
    pub fn from_document(target: BudgetTarget, doc: &Document) -> Parsed<Self> {
        let target_id = doc
            .field(target.id_field())
            .and_then(Identifier::normalize)
            .ok_or(SkipReason::MissingField(target.id_field()))?;
        let amount = match doc.field(field::AMOUNT) {
            None => 0.0,
            Some(raw) => raw.as_f64().ok_or_else(|| SkipReason::InvalidField {
                field: field::AMOUNT,
                value: raw.to_string(),
            })?,
        };
        let category_id = match target {
            BudgetTarget::Subcategory => doc
                .field(field::CATEGORY_ID)
                .and_then(Identifier::normalize),
            BudgetTarget::Category => None,
        };
        Ok(Self {
            doc_id: doc.id.clone(),
            target,
            target_id,
            category_id,
            amount,
            notes: doc.text(field::NOTES).unwrap_or_default().to_string(),
            name: doc.text(target.name_field()).map(str::to_string),
        })
    }
}

/// One line of a budget set being saved.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetEntry {
    pub target_id: Identifier,
    pub category_id: Option<Identifier>,
    pub amount: f64,
    pub notes: String,
    pub name: Option<String>,
}

impl BudgetEntry {
    pub fn new(target_id: impl Into<Identifier>, amount: f64) -> Self {
        Self {
            target_id: target_id.into(),
            category_id: None,
            amount,
            notes: String::new(),
            name: None,
        }
    }

    pub fn to_fields(
        &self,
        target: BudgetTarget,
        period: &BudgetPeriod,
        now: DateTime<Utc>,
    ) -> Fields {
        let mut fields = crate::fields! {
            target.id_field() => &self.target_id,
            field::AMOUNT => self.amount,
            field::NOTES => self.notes.as_str(),
            target.name_field() => self.name.clone().unwrap_or_default(),
            field::PERIOD_START => period.start_timestamp(),
            field::PERIOD_END => period.end_timestamp(),
            field::CREATED_AT => now,
            field::UPDATED_AT => now,
        };
        if let (BudgetTarget::Subcategory, Some(category)) = (target, &self.category_id) {
            fields.insert(field::CATEGORY_ID.into(), FieldValue::from(category));
        }
        fields
    }
}
