//! Firestore REST `Value` encoding.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};

use crate::models::{FieldValue, Fields};

pub fn encode_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => json!({ "nullValue": null }),
        FieldValue::Bool(b) => json!({ "booleanValue": b }),
        FieldValue::Integer(n) => json!({ "integerValue": n.to_string() }),
        FieldValue::Double(d) => json!({ "doubleValue": d }),
        FieldValue::String(s) => json!({ "stringValue": s }),
        FieldValue::Timestamp(ts) => {
            json!({ "timestampValue": ts.to_rfc3339_opts(SecondsFormat::AutoSi, true) })
        }
        FieldValue::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        FieldValue::Map(fields) => json!({ "mapValue": { "fields": encode_fields(fields) } }),
    }
}

pub fn encode_fields(fields: &Fields) -> Map<String, Value> {
    fields
        .iter()
        .map(|(name, value)| (name.clone(), encode_value(value)))
        .collect()
}

pub fn decode_value(raw: &Value) -> Result<FieldValue> {
    let object = raw.as_object().context("Firestore value is not an object")?;
    let Some((kind, inner)) = object.iter().next() else {
        bail!("Firestore value has no type tag");
    };

    let value = match kind.as_str() {
        "nullValue" => FieldValue::Null,
        "booleanValue" => FieldValue::Bool(inner.as_bool().context("bad booleanValue")?),
        "integerValue" => {
            // Sent as a decimal string, but accept plain numbers too.
            let n = match inner {
                Value::String(s) => s.parse::<i64>().context("bad integerValue")?,
                other => other.as_i64().context("bad integerValue")?,
            };
            FieldValue::Integer(n)
        }
        "doubleValue" => match inner {
            Value::String(s) => match s.as_str() {
                "NaN" => FieldValue::Double(f64::NAN),
                "Infinity" => FieldValue::Double(f64::INFINITY),
                "-Infinity" => FieldValue::Double(f64::NEG_INFINITY),
                _ => FieldValue::Double(s.parse().context("bad doubleValue")?),
            },
            other => FieldValue::Double(other.as_f64().context("bad doubleValue")?),
        },
        "timestampValue" => {
            let text = inner.as_str().context("bad timestampValue")?;
            let ts = DateTime::parse_from_rfc3339(text)
                .with_context(|| format!("bad timestampValue {text:?}"))?;
            FieldValue::Timestamp(ts.with_timezone(&Utc))
        }
        "stringValue" | "referenceValue" | "bytesValue" => {
            FieldValue::String(inner.as_str().unwrap_or_default().to_string())
        }
        "arrayValue" => {
            let items = match inner.get("values") {
                Some(Value::Array(values)) => values
                    .iter()
                    .map(decode_value)
                    .collect::<Result<Vec<_>>>()?,
                _ => Vec::new(),
            };
            FieldValue::Array(items)
        }
        "mapValue" => match inner.get("fields") {
            Some(Value::Object(fields)) => FieldValue::Map(decode_fields(fields)?),
            _ => FieldValue::Map(Fields::new()),
        },
        "geoPointValue" => {
            let coord = |name: &str| {
                FieldValue::Double(inner.get(name).and_then(Value::as_f64).unwrap_or_default())
            };
            FieldValue::Map(crate::fields! {
                "latitude" => coord("latitude"),
                "longitude" => coord("longitude"),
            })
        }
        other => bail!("Unsupported Firestore value type: {other}"),
    };
    Ok(value)
}

pub fn decode_fields(raw: &Map<String, Value>) -> Result<Fields> {
    raw.iter()
        .map(|(name, value)| {
            decode_value(value)
                .with_context(|| format!("field '{name}'"))
                .map(|decoded| (name.clone(), decoded))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn integers_travel_as_strings() {
        assert_eq!(
            encode_value(&FieldValue::Integer(42)),
            json!({ "integerValue": "42" })
        );
        assert_eq!(
            decode_value(&json!({ "integerValue": "42" })).unwrap(),
            FieldValue::Integer(42)
        );
    }

    #[test]
    fn nested_values_decode() {
        let raw = json!({
            "mapValue": { "fields": {
                "adjuntos_paths": { "arrayValue": { "values": [
                    { "stringValue": "Proyecto/1/a.pdf" }
                ] } },
                "empty": { "arrayValue": {} },
                "fecha_inicio": { "timestampValue": "2024-01-01T00:00:00Z" }
            } }
        });
        let FieldValue::Map(fields) = decode_value(&raw).unwrap() else {
            panic!("expected map");
        };
        assert_eq!(
            fields["adjuntos_paths"].string_items(),
            vec!["Proyecto/1/a.pdf".to_string()]
        );
        assert_eq!(fields["empty"], FieldValue::Array(Vec::new()));
        assert_eq!(
            fields["fecha_inicio"],
            FieldValue::Timestamp(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn timestamps_encode_in_utc() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap();
        assert_eq!(
            encode_value(&FieldValue::Timestamp(ts)),
            json!({ "timestampValue": "2024-01-31T23:59:59Z" })
        );
    }

    #[test]
    fn unknown_tags_are_errors() {
        assert!(decode_value(&json!({ "vectorValue": {} })).is_err());
        assert!(decode_value(&json!("plain")).is_err());
    }
}
