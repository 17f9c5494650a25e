//! Turning raw request data into handler arguments.

use std::collections::HashMap;

use percent_encoding::percent_decode_str;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::api::routes::{ParamBinding, ValueShape};

/// Malformed client input. Reported to the client as `400 Bad Request`.
#[derive(Debug, Error)]
#[error("invalid argument '{name}': {message}")]
pub struct ArgumentError {
    pub name: String,
    pub message: String,
}

impl ArgumentError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// An inbound request, reduced to what dispatch needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    pub verb: String,
    pub path: String,
    pub query: Option<String>,
    pub body: String,
}

impl Request {
    pub fn new(verb: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }
}

/// Arguments for one handler call, in declaration order.
///
/// Query-bound values arrive already coerced to their declared shape, body
/// values as parsed JSON. Absent values are `null`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    values: Vec<Value>,
}

impl Args {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn raw(&self, index: usize) -> &Value {
        static NULL: Value = Value::Null;
        self.values.get(index).unwrap_or(&NULL)
    }

    /// Decodes argument `index` into `T`; failures are [`ArgumentError`]s.
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> Result<T, ArgumentError> {
        serde_json::from_value(self.raw(index).clone())
            .map_err(|err| ArgumentError::new(format!("#{index}"), err.to_string()))
    }

    /// Like [`Args::get`] but maps `null` to `None`.
    pub fn optional<T: DeserializeOwned>(&self, index: usize) -> Result<Option<T>, ArgumentError> {
        match self.raw(index) {
            Value::Null => Ok(None),
            _ => self.get(index).map(Some),
        }
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

/// Splits a raw query string into decoded key/value pairs.
///
/// Only well-formed `key=value` pairs are kept; `+` decodes to a space and a
/// repeated key keeps its last value.
pub fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter_map(|pair| {
            let mut parts = pair.split('=');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(key), Some(value), None) if !key.is_empty() && !value.is_empty() => {
                    Some((decode_component(key), decode_component(value)))
                }
                _ => None,
            }
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

/// Coerces a decoded query value to its declared shape.
pub fn coerce_query_value(name: &str, raw: &str, shape: ValueShape) -> Result<Value, ArgumentError> {
    let invalid = |what: &str| ArgumentError::new(name, format!("'{raw}' is not a valid {what}"));
    let value = match shape {
        ValueShape::Text => Value::String(raw.to_string()),
        ValueShape::Int => Value::from(raw.parse::<i32>().map_err(|_| invalid("integer"))?),
        ValueShape::Long => Value::from(raw.parse::<i64>().map_err(|_| invalid("long"))?),
        // Anything other than a case-insensitive "true" is false.
        ValueShape::Bool => Value::Bool(raw.eq_ignore_ascii_case("true")),
        ValueShape::Double => {
            let number = raw.parse::<f64>().map_err(|_| invalid("double"))?;
            serde_json::Number::from_f64(number)
                .map(Value::Number)
                .ok_or_else(|| invalid("finite double"))?
        }
    };
    Ok(value)
}

/// Builds the argument list for `params` from `request`.
pub fn bind_arguments(params: &[ParamBinding], request: &Request) -> Result<Args, ArgumentError> {
    let query = request.query.as_deref().map(parse_query).unwrap_or_default();

    let values = params
        .iter()
        .map(|param| match param {
            ParamBinding::Query { name, shape } => match query.get(name) {
                Some(raw) => coerce_query_value(name, raw, *shape),
                None => Ok(Value::Null),
            },
            ParamBinding::Body => {
                if request.body.trim().is_empty() {
                    return Err(ArgumentError::new("body", "request body is empty"));
                }
                serde_json::from_str(&request.body)
                    .map_err(|err| ArgumentError::new("body", err.to_string()))
            }
            ParamBinding::Unbound => Ok(Value::Null),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Args::new(values))
}
