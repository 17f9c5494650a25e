use bigdecimal::num_bigint::BigInt;
use bigdecimal::BigDecimal;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::{Deserialize, DeserializeOwned};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::model::decode::RowDeserializer;

/// A wire value after normalisation.
///
/// Workers only speak JSON, so binary columns arrive as integer arrays,
/// timestamps as ISO-8601 strings and wide numbers as strings. Coercion turns
/// those back into the shapes typed callers expect.
#[derive(Debug, Clone, PartialEq)]
pub enum CoercedValue {
    Null,
    Bool(bool),
    Integer(i64),
    BigInteger(BigInt),
    Decimal(BigDecimal),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
    /// Nested arrays and objects are passed through untouched.
    Json(Value),
}

impl CoercedValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CoercedValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CoercedValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CoercedValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            CoercedValue::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<&DateTime<Utc>> {
        match self {
            CoercedValue::Timestamp(ts) => Some(ts),
            _ => None,
        }
    }
}

impl Serialize for CoercedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CoercedValue::Null => serializer.serialize_none(),
            CoercedValue::Bool(value) => serializer.serialize_bool(*value),
            CoercedValue::Integer(value) => serializer.serialize_i64(*value),
            CoercedValue::BigInteger(value) => serializer.serialize_str(&value.to_string()),
            CoercedValue::Decimal(value) => serializer.serialize_str(&value.to_string()),
            CoercedValue::Float(value) => serializer.serialize_f64(*value),
            CoercedValue::Text(value) => serializer.serialize_str(value),
            CoercedValue::Bytes(bytes) => serializer.serialize_bytes(bytes),
            CoercedValue::Timestamp(ts) => {
                serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            CoercedValue::Json(value) => value.serialize(serializer),
        }
    }
}

/// One result row with coerced column values.
///
/// Serialises as the coerced columns only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: BTreeMap<String, CoercedValue>,
    wire: BTreeMap<String, Value>,
}

impl Row {
    pub fn new(columns: BTreeMap<String, CoercedValue>) -> Self {
        Self {
            columns,
            wire: BTreeMap::new(),
        }
    }

    /// Keeps the columns as the worker sent them, next to the coerced ones.
    pub fn with_wire(mut self, wire: &Map<String, Value>) -> Self {
        self.wire = wire.iter().map(|(name, value)| (name.clone(), value.clone())).collect();
        self
    }

    /// A column exactly as the worker sent it, when known.
    pub fn wire(&self, column: &str) -> Option<&Value> {
        self.wire.get(column)
    }

    pub fn get(&self, column: &str) -> Option<&CoercedValue> {
        self.columns.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&String, &CoercedValue)> {
        self.columns.iter()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Maps the row onto a declared shape field by field.
    ///
    /// The target's field types decide how each column is read, so a column
    /// coerced to a number still fills a `String` field with its wire text.
    /// Columns the target does not declare are ignored; declared fields with
    /// no column or a `NULL` column get the zero value of their type.
    pub fn decode<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(RowDeserializer::new(self))
    }

    pub fn to_json(&self) -> Value {
        // Serialising a map of CoercedValue into a Value cannot fail: every
        // variant maps onto a plain JSON value and all keys are strings.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.columns.serialize(serializer)
    }
}

impl FromIterator<(String, CoercedValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, CoercedValue)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
