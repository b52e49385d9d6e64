use std::cmp::Ordering;

use crate::models::{FieldValue, Fields};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
    /// Value is an array; matches any element.
    In,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: FieldValue,
}

impl Filter {
    pub fn matches(&self, fields: &Fields) -> bool {
        let Some(actual) = fields.get(&self.field) else {
            return false;
        };
        match self.op {
            FilterOp::Eq => actual.query_eq(&self.value),
            FilterOp::In => match &self.value {
                FieldValue::Array(options) => options.iter().any(|o| actual.query_eq(o)),
                other => actual.query_eq(other),
            },
            FilterOp::Lt => actual.compare(&self.value) == Some(Ordering::Less),
            FilterOp::Le => matches!(
                actual.compare(&self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOp::Gt => actual.compare(&self.value) == Some(Ordering::Greater),
            FilterOp::Ge => matches!(
                actual.compare(&self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Conjunction of filters with optional ordering and limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, field: &str, op: FilterOp, value: impl Into<FieldValue>) -> Self {
        self.filters.push(Filter {
            field: field.to_string(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn eq(self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.filter(field, FilterOp::Eq, value)
    }

    /// Matches any of `values`. A single value degrades to equality.
    pub fn any_of(self, field: &str, mut values: Vec<FieldValue>) -> Self {
        if values.len() == 1 {
            let only = values.remove(0);
            self.eq(field, only)
        } else {
            self.filter(field, FilterOp::In, FieldValue::Array(values))
        }
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, fields: &Fields) -> bool {
        self.filters.iter().all(|f| f.matches(fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;

    #[test]
    fn in_filter_matches_any_stored_form() {
        let query = Query::new().any_of(
            "cuenta_id",
            vec![FieldValue::Integer(3), FieldValue::from("3")],
        );
        assert!(query.matches(&fields! { "cuenta_id" => 3 }));
        assert!(query.matches(&fields! { "cuenta_id" => "3" }));
        assert!(!query.matches(&fields! { "cuenta_id" => 4 }));
        assert!(!query.matches(&fields! {}));
    }

    #[test]
    fn range_filters_need_comparable_types() {
        let query = Query::new().filter("fecha", FilterOp::Ge, "2024-01-01");
        assert!(query.matches(&fields! { "fecha" => "2024-02-01" }));
        assert!(!query.matches(&fields! { "fecha" => 20240201 }));
    }
}
