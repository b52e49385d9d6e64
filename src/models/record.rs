//! Raw document values.
//!
//! Records in the store were written by several generations of the desktop
//! client, so the same field can arrive as an integer, a float, a numeric
//! string or be missing entirely. Everything read from the store is held as a
//! [`FieldValue`] and converted into typed models by explicit, total parsing
//! functions that return [`Parsed`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// Field map of a single document.
pub type Fields = BTreeMap<String, FieldValue>;

/// A single document field, mirroring the value kinds the store supports.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    Array(Vec<FieldValue>),
    Map(Fields),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Loose truthiness, as the legacy client evaluated `activo`/`eliminado`.
    pub fn truthy(&self) -> bool {
        match self {
            FieldValue::Null => false,
            FieldValue::Bool(b) => *b,
            FieldValue::Integer(n) => *n != 0,
            FieldValue::Double(f) => *f != 0.0,
            FieldValue::String(s) => !s.is_empty(),
            FieldValue::Timestamp(_) => true,
            FieldValue::Array(items) => !items.is_empty(),
            FieldValue::Map(fields) => !fields.is_empty(),
        }
    }

    /// Strict `== true` comparison (`1` counts, `"true"` does not).
    pub fn is_true(&self) -> bool {
        match self {
            FieldValue::Bool(b) => *b,
            FieldValue::Integer(n) => *n == 1,
            FieldValue::Double(f) => *f == 1.0,
            _ => false,
        }
    }

    /// Numeric view used for amounts: numbers and numeric strings.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(n) => Some(*n as f64),
            FieldValue::Double(f) => Some(*f),
            FieldValue::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            FieldValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Strings inside an array value; non-string items are dropped.
    pub fn string_items(&self) -> Vec<String> {
        match self {
            FieldValue::Array(items) => items
                .iter()
                .filter_map(|v| v.as_str())
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Calendar date carried by this value.
    ///
    /// Strings are `YYYY-MM-DD`, optionally followed by a time component
    /// separated by whitespace or `T`. Components need not be zero padded.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Timestamp(ts) => Some(ts.date_naive()),
            FieldValue::String(s) => parse_loose_date(s),
            _ => None,
        }
    }

    /// Ordering used by range filters and `order_by`. Values of different
    /// kinds do not compare, except integers against doubles.
    pub fn compare(&self, other: &FieldValue) -> Option<std::cmp::Ordering> {
        use FieldValue::*;
        match (self, other) {
            (Null, Null) => Some(std::cmp::Ordering::Equal),
            (Bool(a), Bool(b)) => Some(a.cmp(b)),
            (Integer(a), Integer(b)) => Some(a.cmp(b)),
            (Integer(a), Double(b)) => (*a as f64).partial_cmp(b),
            (Double(a), Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Double(a), Double(b)) => a.partial_cmp(b),
            (String(a), String(b)) => Some(a.cmp(b)),
            (Timestamp(a), Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Equality used by query filters: `5` and `5.0` match, `5` and `"5"` do not.
    pub fn query_eq(&self, other: &FieldValue) -> bool {
        matches!(self.compare(other), Some(std::cmp::Ordering::Equal)) || self == other
    }
}

fn parse_loose_date(raw: &str) -> Option<NaiveDate> {
    let token = raw.split_whitespace().next()?;
    let token = token.split('T').next()?;
    let mut parts = token.split('-');
    let year: i32 = parts.next()?.parse().ok()?;
    let month: u32 = parts.next()?.parse().ok()?;
    let day: u32 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str("null"),
            FieldValue::Bool(b) => b.fmt(f),
            FieldValue::Integer(n) => n.fmt(f),
            FieldValue::Double(d) => d.fmt(f),
            FieldValue::String(s) => s.fmt(f),
            FieldValue::Timestamp(ts) => f.write_str(&ts.to_rfc3339()),
            FieldValue::Array(items) => write!(f, "[{} items]", items.len()),
            FieldValue::Map(fields) => write!(f, "{{{} fields}}", fields.len()),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Null => serializer.serialize_unit(),
            FieldValue::Bool(b) => serializer.serialize_bool(*b),
            FieldValue::Integer(n) => serializer.serialize_i64(*n),
            FieldValue::Double(d) => serializer.serialize_f64(*d),
            FieldValue::String(s) => serializer.serialize_str(s),
            FieldValue::Timestamp(ts) => serializer.serialize_str(&ts.to_rfc3339()),
            FieldValue::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            FieldValue::Map(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (k, v) in fields {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Integer(value as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Double(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(value: Vec<String>) -> Self {
        FieldValue::Array(value.into_iter().map(FieldValue::String).collect())
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// Build a [`Fields`] map from `key => value` pairs.
#[macro_export]
macro_rules! fields {
    ($($key:expr => $value:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut map = $crate::models::Fields::new();
        $( map.insert(($key).to_string(), $crate::models::FieldValue::from($value)); )*
        map
    }};
}

/// Why a raw record was left out of a typed result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingField(&'static str),
    InvalidField { field: &'static str, value: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingField(field) => write!(f, "missing field '{field}'"),
            SkipReason::InvalidField { field, value } => {
                write!(f, "invalid value {value:?} for field '{field}'")
            }
        }
    }
}

/// Outcome of parsing one raw record.
pub type Parsed<T> = Result<T, SkipReason>;
