use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use super::FieldValue;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Invalid identifier {value:?}: identifiers must be a non-empty number or key")]
pub struct IdentifierError {
    value: String,
}

/// Canonical identifier for catalog entries and their references.
///
/// Catalog ids were written both as numeric `id` fields and as string document
/// keys, and references to them as integers or numeric strings. Everything
/// goes through [`Identifier::normalize`], which tries an integer first and
/// falls back to the string form, so `5`, `5.0`, `"5"` and `" 5 "` all map to
/// `Numeric(5)`. An `Opaque` value produced by normalization never holds a
/// string that parses as an integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum Identifier {
    Numeric(i64),
    Opaque(String),
}

impl Identifier {
    /// Normalize a raw field value. Returns `None` for null, empty strings,
    /// booleans, arrays, maps and non-integral numbers.
    pub fn normalize(raw: &FieldValue) -> Option<Self> {
        match raw {
            FieldValue::Integer(n) => Some(Identifier::Numeric(*n)),
            FieldValue::Double(f) => {
                if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                    Some(Identifier::Numeric(*f as i64))
                } else {
                    None
                }
            }
            FieldValue::String(s) => Self::parse(s),
            _ => None,
        }
    }

    /// Normalize a string form; `None` when blank.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        match trimmed.parse::<i64>() {
            Ok(n) => Some(Identifier::Numeric(n)),
            Err(_) => Some(Identifier::Opaque(trimmed.to_string())),
        }
    }

    /// Re-normalize an identifier. Identity for anything built by
    /// [`Identifier::normalize`] or [`Identifier::parse`].
    pub fn canonical(&self) -> Self {
        match self {
            Identifier::Numeric(n) => Identifier::Numeric(*n),
            Identifier::Opaque(s) => Self::parse(s).unwrap_or_else(|| self.clone()),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Identifier::Numeric(n) => Some(*n),
            Identifier::Opaque(_) => None,
        }
    }

    /// The reserved `0` category that marks transfer legs as uncategorized.
    pub fn is_sentinel_zero(&self) -> bool {
        matches!(self, Identifier::Numeric(0))
    }

    /// Stored representation: numbers as integers, keys as strings.
    pub fn to_value(&self) -> FieldValue {
        match self {
            Identifier::Numeric(n) => FieldValue::Integer(*n),
            Identifier::Opaque(s) => FieldValue::String(s.clone()),
        }
    }

    /// Every stored representation a query must match to find this id.
    pub fn stored_variants(&self) -> Vec<FieldValue> {
        match self {
            Identifier::Numeric(n) => {
                vec![FieldValue::Integer(*n), FieldValue::String(n.to_string())]
            }
            Identifier::Opaque(s) => vec![FieldValue::String(s.clone())],
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Numeric(n) => n.fmt(f),
            Identifier::Opaque(s) => s.fmt(f),
        }
    }
}

impl FromStr for Identifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| IdentifierError {
            value: s.to_string(),
        })
    }
}

impl From<i64> for Identifier {
    fn from(value: i64) -> Self {
        Identifier::Numeric(value)
    }
}

impl From<i32> for Identifier {
    fn from(value: i32) -> Self {
        Identifier::Numeric(value as i64)
    }
}

impl From<&str> for Identifier {
    /// Normalizing conversion; a blank string is kept as an empty key.
    fn from(value: &str) -> Self {
        Self::parse(value).unwrap_or_else(|| Identifier::Opaque(value.trim().to_string()))
    }
}

impl From<String> for Identifier {
    fn from(value: String) -> Self {
        Identifier::from(value.as_str())
    }
}

impl From<Identifier> for FieldValue {
    fn from(value: Identifier) -> Self {
        value.to_value()
    }
}

impl From<&Identifier> for FieldValue {
    fn from(value: &Identifier) -> Self {
        value.to_value()
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        let value = match &raw {
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => FieldValue::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => FieldValue::String(s.clone()),
            _ => FieldValue::Null,
        };
        Identifier::normalize(&value)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid identifier: {raw}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_and_numeric_string_normalize_to_the_same_key() {
        let from_int = Identifier::normalize(&FieldValue::Integer(5)).unwrap();
        let from_str = Identifier::normalize(&FieldValue::from("5")).unwrap();
        let from_padded = Identifier::normalize(&FieldValue::from(" 5 ")).unwrap();
        let from_double = Identifier::normalize(&FieldValue::Double(5.0)).unwrap();
        assert_eq!(from_int, Identifier::Numeric(5));
        assert_eq!(from_int, from_str);
        assert_eq!(from_int, from_padded);
        assert_eq!(from_int, from_double);
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in [
            FieldValue::Integer(5),
            FieldValue::from("5"),
            FieldValue::from("abcDEF123"),
            FieldValue::from("007"),
        ] {
            let once = Identifier::normalize(&raw).unwrap();
            let twice = Identifier::normalize(&once.to_value()).unwrap();
            assert_eq!(once, twice);
            assert_eq!(once.canonical(), once);
        }
    }

    #[test]
    fn opaque_keys_fall_back_to_their_string_form() {
        let id = Identifier::normalize(&FieldValue::from("x9Fq2")).unwrap();
        assert_eq!(id, Identifier::Opaque("x9Fq2".to_string()));
        assert_eq!(id.to_string(), "x9Fq2");
        assert_eq!(id.as_i64(), None);
    }

    #[test]
    fn opaque_keys_are_trimmed() {
        let padded = Identifier::normalize(&FieldValue::from(" abc ")).unwrap();
        assert_eq!(padded, Identifier::Opaque("abc".to_string()));
        assert_eq!(padded, Identifier::from("abc"));
        assert_eq!(
            Identifier::Opaque(" abc".to_string()).canonical(),
            Identifier::Opaque("abc".to_string())
        );
        assert_eq!(padded.to_value(), FieldValue::from("abc"));
    }

    #[test]
    fn absent_like_values_do_not_normalize() {
        assert_eq!(Identifier::normalize(&FieldValue::Null), None);
        assert_eq!(Identifier::normalize(&FieldValue::from("")), None);
        assert_eq!(Identifier::normalize(&FieldValue::from("   ")), None);
        assert_eq!(Identifier::normalize(&FieldValue::Bool(true)), None);
        assert_eq!(Identifier::normalize(&FieldValue::Double(2.5)), None);
    }

    #[test]
    fn canonical_repairs_hand_built_opaque_numbers() {
        let id = Identifier::Opaque("42".to_string());
        assert_eq!(id.canonical(), Identifier::Numeric(42));
    }

    #[test]
    fn sentinel_zero_is_numeric_zero_only() {
        assert!(Identifier::from("0").is_sentinel_zero());
        assert!(Identifier::from(0).is_sentinel_zero());
        assert!(!Identifier::from("zero").is_sentinel_zero());
    }

    #[test]
    fn serde_round_trips_through_json_forms() {
        let numeric: Identifier = serde_json::from_str("\"12\"").unwrap();
        assert_eq!(numeric, Identifier::Numeric(12));
        assert_eq!(serde_json::to_string(&numeric).unwrap(), "12");

        let opaque: Identifier = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(serde_json::to_string(&opaque).unwrap(), "\"abc\"");

        assert!(serde_json::from_str::<Identifier>("null").is_err());
    }

    #[test]
    fn from_str_rejects_blank_values() {
        assert!("".parse::<Identifier>().is_err());
        assert_eq!("17".parse::<Identifier>(), Ok(Identifier::Numeric(17)));
    }
}
