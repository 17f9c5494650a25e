//! Normalisation of loosely typed worker values.
//!
//! Workers only emit JSON, so the shapes below are recovered by looking at the
//! value itself. String columns that merely look numeric or timestamp-shaped
//! are reinterpreted too; callers that need the raw text should read the
//! untouched [`QueryOutcome`](crate::model::QueryOutcome) rows instead.

use std::str::FromStr;

use bigdecimal::num_bigint::BigInt;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::model::{CoercedValue, Row};

static TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d{3})?Z$").expect("timestamp pattern")
});

static NUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\d+(\.\d+)?$").expect("numeric pattern"));

/// Coerces one wire value.
pub fn coerce_value(value: &Value) -> CoercedValue {
    match value {
        Value::Null => CoercedValue::Null,
        Value::Bool(flag) => CoercedValue::Bool(*flag),
        Value::Number(number) => {
            if let Some(int) = number.as_i64() {
                CoercedValue::Integer(int)
            } else if let Some(wide) = number.as_u64() {
                CoercedValue::BigInteger(BigInt::from(wide))
            } else {
                CoercedValue::Float(number.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(text) => coerce_text(text),
        Value::Array(items) => match as_bytes(items) {
            Some(bytes) => CoercedValue::Bytes(bytes),
            None => CoercedValue::Json(value.clone()),
        },
        Value::Object(_) => CoercedValue::Json(value.clone()),
    }
}

/// Coerces every top-level column of a worker row.
pub fn coerce_row(columns: &Map<String, Value>) -> Row {
    columns
        .iter()
        .map(|(name, value)| (name.clone(), coerce_value(value)))
        .collect::<Row>()
        .with_wire(columns)
}

fn coerce_text(text: &str) -> CoercedValue {
    if TIMESTAMP.is_match(text) {
        if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
            return CoercedValue::Timestamp(ts.with_timezone(&Utc));
        }
    }

    if NUMERIC.is_match(text) {
        if text.contains('.') {
            if let Ok(decimal) = BigDecimal::from_str(text) {
                return CoercedValue::Decimal(decimal);
            }
        } else if let Ok(int) = text.parse::<i64>() {
            return CoercedValue::Integer(int);
        } else if let Ok(big) = BigInt::from_str(text) {
            return CoercedValue::BigInteger(big);
        }
    }

    CoercedValue::Text(text.to_string())
}

// Binary columns arrive as arrays of octets. The target field is not
// consulted here: any non-empty array of integers in 0..=255 becomes `Bytes`.
// `Row::decode` still hands such a value to a numeric list field as integers.
// An empty array stays JSON since there is nothing to tell it apart from an
// empty list.
fn as_bytes(items: &[Value]) -> Option<Vec<u8>> {
    if items.is_empty() {
        return None;
    }
    items
        .iter()
        .map(|item| item.as_u64().and_then(|n| u8::try_from(n).ok()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_plain_strings_are_unchanged() {
        for text in ["Ann", "", "12abc", "1.2.3", "2024-01-01", "-", "1e5"] {
            assert_eq!(
                coerce_value(&json!(text)),
                CoercedValue::Text(text.to_string()),
                "{text}"
            );
        }
    }

    #[test]
    fn test_integer_strings() {
        assert_eq!(coerce_value(&json!("42")), CoercedValue::Integer(42));
        assert_eq!(coerce_value(&json!("-7")), CoercedValue::Integer(-7));
        assert_eq!(
            coerce_value(&json!("123456789012345678901234567890")),
            CoercedValue::BigInteger(BigInt::from_str("123456789012345678901234567890").unwrap())
        );
    }

    #[test]
    fn test_decimal_strings() {
        assert_eq!(
            coerce_value(&json!("19.99")),
            CoercedValue::Decimal(BigDecimal::from_str("19.99").unwrap())
        );
        assert_eq!(
            coerce_value(&json!("-0.5")),
            CoercedValue::Decimal(BigDecimal::from_str("-0.5").unwrap())
        );
    }

    #[test]
    fn test_timestamps() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(
            coerce_value(&json!("2024-03-01T12:30:00.000Z")),
            CoercedValue::Timestamp(expected)
        );
        assert_eq!(
            coerce_value(&json!("2024-03-01T12:30:00Z")),
            CoercedValue::Timestamp(expected)
        );
        // Impossible dates keep their text.
        assert_eq!(
            coerce_value(&json!("2024-13-45T12:30:00Z")),
            CoercedValue::Text("2024-13-45T12:30:00Z".to_string())
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(coerce_value(&json!(5)), CoercedValue::Integer(5));
        assert_eq!(coerce_value(&json!(2.5)), CoercedValue::Float(2.5));
        assert_eq!(
            coerce_value(&json!(u64::MAX)),
            CoercedValue::BigInteger(BigInt::from(u64::MAX))
        );
    }

    #[test]
    fn test_octet_arrays_become_bytes() {
        assert_eq!(
            coerce_value(&json!([104, 105, 0, 255])),
            CoercedValue::Bytes(vec![104, 105, 0, 255])
        );
        assert_eq!(coerce_value(&json!([1, 256])), CoercedValue::Json(json!([1, 256])));
        assert_eq!(coerce_value(&json!([1, -1])), CoercedValue::Json(json!([1, -1])));
        assert_eq!(coerce_value(&json!([])), CoercedValue::Json(json!([])));
        assert_eq!(coerce_value(&json!(["a"])), CoercedValue::Json(json!(["a"])));
    }

    #[test]
    fn test_small_integer_lists_still_decode_as_numbers() {
        #[derive(serde::Deserialize)]
        struct Scores {
            scores: Vec<i32>,
        }

        let columns = json!({"scores": [3, 5, 8]});
        let row = coerce_row(columns.as_object().unwrap());
        assert_eq!(row.get("scores"), Some(&CoercedValue::Bytes(vec![3, 5, 8])));

        let decoded: Scores = row.decode().unwrap();
        assert_eq!(decoded.scores, vec![3, 5, 8]);
    }

    #[test]
    fn test_nested_values_are_not_coerced() {
        let nested = json!({"count": "12", "at": "2024-03-01T12:30:00Z"});
        assert_eq!(coerce_value(&nested), CoercedValue::Json(nested.clone()));
    }

    #[test]
    fn test_coerce_row() {
        let columns = json!({
            "id": 1,
            "name": "Ann",
            "balance": "10.25",
            "avatar": [137, 80, 78, 71],
            "deleted_at": null
        });
        let row = coerce_row(columns.as_object().unwrap());

        assert_eq!(row.len(), 5);
        assert_eq!(row.get("id"), Some(&CoercedValue::Integer(1)));
        assert_eq!(row.get("name").and_then(CoercedValue::as_str), Some("Ann"));
        assert_eq!(
            row.get("balance"),
            Some(&CoercedValue::Decimal(BigDecimal::from_str("10.25").unwrap()))
        );
        assert_eq!(
            row.get("avatar").and_then(CoercedValue::as_bytes),
            Some(&[137u8, 80, 78, 71][..])
        );
        assert!(row.get("deleted_at").unwrap().is_null());
    }

    #[test]
    fn test_coercion_is_stable_through_json() {
        let columns = json!({"name": "Ann", "id": 3, "flag": true});
        let row = coerce_row(columns.as_object().unwrap());
        assert_eq!(row.to_json(), columns);
    }
}
