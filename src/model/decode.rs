//! Field-by-field mapping of a [`Row`] onto a caller's type.
//!
//! Each column is handed to the target field as whatever that field asks
//! for. Coercion guesses shapes from the value alone, so the field type wins:
//! a digit-only `VARCHAR` still lands in a `String` field as the text the
//! worker sent, and a `DECIMAL` string lands in an `f64` field as a number.
//! Columns the target does not name are ignored; fields with no column, or a
//! `NULL` column, take the zero value of their type (`0`, `""`, `false`,
//! `None`, empty collections, nested structs of zeroes).

use chrono::SecondsFormat;
use serde::de::value::{SeqDeserializer, StrDeserializer};
use serde::de::{
    self, DeserializeSeed, Deserializer as _, Error as _, IntoDeserializer, MapAccess, Visitor,
};
use serde::forward_to_deserialize_any;
use serde_json::Value;

use crate::model::value::{CoercedValue, Row};

type Error = serde_json::Error;

pub(crate) struct RowDeserializer<'a> {
    row: &'a Row,
}

impl<'a> RowDeserializer<'a> {
    pub(crate) fn new(row: &'a Row) -> Self {
        Self { row }
    }

    fn cell(&self, column: &str) -> Cell<'a> {
        Cell {
            value: self.row.get(column),
            wire: self.row.wire(column),
        }
    }

    fn all_columns(&self) -> Columns<'a> {
        Columns::new(
            self.row
                .columns()
                .map(|(name, _)| (name.as_str(), self.cell(name)))
                .collect(),
        )
    }
}

impl<'de, 'a> de::Deserializer<'de> for RowDeserializer<'a> {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_map(self.all_columns())
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Error> {
        let entries = fields.iter().map(|field| (*field, self.cell(field))).collect();
        visitor.visit_map(Columns::new(entries))
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Error> {
        visitor.visit_newtype_struct(self)
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct seq tuple tuple_struct map enum
        identifier ignored_any
    }
}

/// `(field name, cell)` pairs fed to a struct or map visitor.
struct Columns<'a> {
    entries: std::vec::IntoIter<(&'a str, Cell<'a>)>,
    pending: Option<Cell<'a>>,
}

impl<'a> Columns<'a> {
    fn new(entries: Vec<(&'a str, Cell<'a>)>) -> Self {
        Self {
            entries: entries.into_iter(),
            pending: None,
        }
    }

    fn zeroes(fields: &'static [&'static str]) -> Self {
        let zero = Cell {
            value: None,
            wire: None,
        };
        Self::new(fields.iter().map(|field| (*field, zero)).collect())
    }
}

impl<'de, 'a> MapAccess<'de> for Columns<'a> {
    type Error = Error;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>, Error> {
        match self.entries.next() {
            Some((name, cell)) => {
                self.pending = Some(cell);
                let key: StrDeserializer<'_, Error> = name.into_deserializer();
                seed.deserialize(key).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, Error> {
        let cell = self
            .pending
            .take()
            .ok_or_else(|| Error::custom("column value requested before its name"))?;
        seed.deserialize(cell)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.entries.len())
    }
}

/// One column: the coerced value plus the value as it came off the wire.
/// Both are absent for a column the row does not have.
#[derive(Clone, Copy)]
struct Cell<'a> {
    value: Option<&'a CoercedValue>,
    wire: Option<&'a Value>,
}

impl<'a> Cell<'a> {
    /// The coerced value, `None` for missing and `NULL` columns alike.
    fn present(&self) -> Option<&'a CoercedValue> {
        self.value.filter(|value| !value.is_null())
    }

    fn integer<'de, V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        match self.present() {
            None => visitor.visit_i64(0),
            Some(CoercedValue::Integer(n)) => visitor.visit_i64(*n),
            Some(CoercedValue::BigInteger(n)) => {
                let text = n.to_string();
                if let Ok(n) = text.parse::<u64>() {
                    visitor.visit_u64(n)
                } else if let Ok(n) = text.parse::<i128>() {
                    visitor.visit_i128(n)
                } else {
                    visitor.visit_string(text)
                }
            }
            Some(CoercedValue::Bool(flag)) => visitor.visit_u64(u64::from(*flag)),
            Some(_) => self.deserialize_any(visitor),
        }
    }

    fn float<'de, V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        match self.present() {
            None => visitor.visit_f64(0.0),
            Some(CoercedValue::Float(n)) => visitor.visit_f64(*n),
            Some(CoercedValue::Integer(n)) => visitor.visit_f64(*n as f64),
            Some(CoercedValue::BigInteger(n)) => parse_float(n.to_string(), visitor),
            Some(CoercedValue::Decimal(n)) => parse_float(n.to_string(), visitor),
            Some(_) => self.deserialize_any(visitor),
        }
    }

    fn text<'de, V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        if let Some(Value::String(text)) = self.wire {
            return visitor.visit_str(text);
        }
        match self.present() {
            None => visitor.visit_str(""),
            Some(CoercedValue::Text(text)) => visitor.visit_str(text),
            Some(CoercedValue::Bool(flag)) => visitor.visit_string(flag.to_string()),
            Some(CoercedValue::Integer(n)) => visitor.visit_string(n.to_string()),
            Some(CoercedValue::BigInteger(n)) => visitor.visit_string(n.to_string()),
            Some(CoercedValue::Decimal(n)) => visitor.visit_string(n.to_string()),
            Some(CoercedValue::Float(n)) => visitor.visit_string(n.to_string()),
            Some(CoercedValue::Timestamp(ts)) => {
                visitor.visit_string(ts.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            Some(CoercedValue::Bytes(bytes)) => {
                visitor.visit_string(String::from_utf8_lossy(bytes).into_owned())
            }
            Some(CoercedValue::Json(Value::String(text))) => visitor.visit_str(text),
            Some(CoercedValue::Json(other)) => visitor.visit_string(other.to_string()),
            Some(CoercedValue::Null) => visitor.visit_str(""),
        }
    }
}

fn parse_float<'de, V: Visitor<'de>>(text: String, visitor: V) -> Result<V::Value, Error> {
    match text.parse::<f64>() {
        Ok(n) => visitor.visit_f64(n),
        Err(_) => visitor.visit_string(text),
    }
}

fn byte_seq<'de, V: Visitor<'de>>(bytes: &[u8], visitor: V) -> Result<V::Value, Error> {
    SeqDeserializer::<_, Error>::new(bytes.iter().copied()).deserialize_any(visitor)
}

macro_rules! integers {
    ($($method:ident)*) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
                self.integer(visitor)
            }
        )*
    };
}

impl<'de, 'a> de::Deserializer<'de> for Cell<'a> {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        match self.present() {
            None => visitor.visit_unit(),
            Some(CoercedValue::Bool(flag)) => visitor.visit_bool(*flag),
            Some(CoercedValue::Integer(n)) => visitor.visit_i64(*n),
            Some(CoercedValue::BigInteger(n)) => visitor.visit_string(n.to_string()),
            Some(CoercedValue::Decimal(n)) => visitor.visit_string(n.to_string()),
            Some(CoercedValue::Float(n)) => visitor.visit_f64(*n),
            Some(CoercedValue::Text(text)) => visitor.visit_str(text),
            Some(CoercedValue::Bytes(bytes)) => byte_seq(bytes, visitor),
            Some(CoercedValue::Timestamp(ts)) => {
                visitor.visit_string(ts.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            Some(CoercedValue::Json(value)) => value.clone().deserialize_any(visitor),
            Some(CoercedValue::Null) => visitor.visit_unit(),
        }
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        match self.present() {
            None => visitor.visit_bool(false),
            Some(CoercedValue::Bool(flag)) => visitor.visit_bool(*flag),
            // TINYINT(1) columns arrive as 0/1.
            Some(CoercedValue::Integer(n)) => visitor.visit_bool(*n != 0),
            Some(CoercedValue::Text(text)) if text.eq_ignore_ascii_case("true") => {
                visitor.visit_bool(true)
            }
            Some(CoercedValue::Text(text)) if text.eq_ignore_ascii_case("false") => {
                visitor.visit_bool(false)
            }
            Some(_) => self.deserialize_any(visitor),
        }
    }

    integers! {
        deserialize_i8 deserialize_i16 deserialize_i32 deserialize_i64 deserialize_i128
        deserialize_u8 deserialize_u16 deserialize_u32 deserialize_u64 deserialize_u128
    }

    fn deserialize_f32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        self.float(visitor)
    }

    fn deserialize_f64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        self.float(visitor)
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        self.text(visitor)
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        self.text(visitor)
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        self.text(visitor)
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        match self.present() {
            None => visitor.visit_bytes(&[]),
            Some(CoercedValue::Bytes(bytes)) => visitor.visit_bytes(bytes),
            Some(CoercedValue::Text(text)) => visitor.visit_bytes(text.as_bytes()),
            Some(_) => self.deserialize_any(visitor),
        }
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        self.deserialize_bytes(visitor)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        match self.present() {
            None => visitor.visit_none(),
            Some(_) => visitor.visit_some(self),
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        match self.present() {
            None => visitor.visit_unit(),
            Some(_) => self.deserialize_any(visitor),
        }
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Error> {
        self.deserialize_unit(visitor)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Error> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        match self.present() {
            None => byte_seq(&[], visitor),
            Some(CoercedValue::Bytes(bytes)) => byte_seq(bytes, visitor),
            Some(CoercedValue::Json(value)) => value.clone().deserialize_seq(visitor),
            Some(_) => self.deserialize_any(visitor),
        }
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value, Error> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Error> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        match self.present() {
            None => visitor.visit_map(Columns::new(Vec::new())),
            Some(CoercedValue::Json(value)) => value.clone().deserialize_map(visitor),
            Some(_) => self.deserialize_any(visitor),
        }
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Error> {
        match self.present() {
            None => visitor.visit_map(Columns::zeroes(fields)),
            Some(CoercedValue::Json(value)) => value.clone().deserialize_struct(name, fields, visitor),
            Some(_) => self.deserialize_any(visitor),
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Error> {
        match self.present() {
            Some(CoercedValue::Text(text)) => {
                let variant: StrDeserializer<'_, Error> = text.as_str().into_deserializer();
                visitor.visit_enum(variant)
            }
            Some(CoercedValue::Json(value)) => value.clone().deserialize_enum(name, variants, visitor),
            _ => self.deserialize_any(visitor),
        }
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        self.text(visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_unit()
    }
}
