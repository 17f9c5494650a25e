use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::model::value::{CoercedValue, Row};

/// One record of the query worker's reply, in batch order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOutcome {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub affected_rows: u64,
    #[serde(default, deserialize_with = "lenient_id")]
    pub insert_id: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Map<String, Value>>>,
}

impl QueryOutcome {
    /// Outcome used when the worker exits cleanly without writing anything.
    pub fn nothing_affected() -> Self {
        Self::default()
    }

    pub fn is_select(&self) -> bool {
        self.kind.as_deref() == Some("SELECT")
    }
}

/// One entry of the file worker's `results` list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileOperationResult {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub result: Option<Map<String, Value>>,
    #[serde(default)]
    pub error: Option<String>,
}

impl FileOperationResult {
    /// Looks up one field of the action-specific payload.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.result.as_ref().and_then(|result| result.get(name))
    }
}

/// The file worker's reply envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileExecutionResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub results: Vec<FileOperationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileExecutionResult {
    /// Best available failure description for an unsuccessful envelope.
    pub fn failure_message(&self) -> String {
        self.error
            .clone()
            .or_else(|| self.results.iter().find_map(|r| r.error.clone()))
            .unwrap_or_else(|| "File operation failed".to_string())
    }
}

/// Outcome of a data-modifying statement as handed to repository callers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryExecutionResult {
    pub affected_rows: u64,
    pub insert_id: Option<i64>,
    pub message: Option<String>,
    pub error: Option<String>,
}

impl QueryExecutionResult {
    pub fn no_result() -> Self {
        Self {
            message: Some("No result".to_string()),
            ..Self::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

impl From<&QueryOutcome> for QueryExecutionResult {
    fn from(outcome: &QueryOutcome) -> Self {
        Self {
            affected_rows: outcome.affected_rows,
            insert_id: outcome.insert_id,
            message: outcome.message.clone(),
            error: outcome.error.clone(),
        }
    }
}

impl fmt::Display for QueryExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "affectedRows: {}, insertId: ", self.affected_rows)?;
        match self.insert_id {
            Some(id) => write!(f, "{id}")?,
            None => f.write_str("null")?,
        }
        write!(
            f,
            ", message: '{}', error: '{}'",
            self.message.as_deref().unwrap_or("null"),
            self.error.as_deref().unwrap_or("null")
        )
    }
}

/// Outcome of a `SELECT` with every row coerced.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectQueryResult {
    pub row_count: usize,
    pub message: String,
    pub rows: Vec<Row>,
    pub error: Option<String>,
}

impl SelectQueryResult {
    pub fn new(rows: Vec<Row>) -> Self {
        let row_count = rows.len();
        let message = if row_count > 0 {
            format!("{row_count} rows found")
        } else {
            "No rows found".to_string()
        };
        Self {
            row_count,
            message,
            rows,
            error: None,
        }
    }

    pub fn no_result() -> Self {
        Self {
            message: "No result".to_string(),
            ..Self::default()
        }
    }

    pub fn has_rows(&self) -> bool {
        !self.rows.is_empty()
    }

    pub fn first_row(&self) -> Option<&Row> {
        self.rows.first()
    }

    pub fn value(&self, row_index: usize, column: &str) -> Option<&CoercedValue> {
        self.rows.get(row_index).and_then(|row| row.get(column))
    }
}

fn lenient_number(value: Option<Value>) -> Option<i64> {
    match value? {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_u64().and_then(|n| i64::try_from(n).ok())),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

// Workers may send ids as numbers, numeric strings (BIGINT) or null.
fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    Ok(lenient_number(Option::<Value>::deserialize(deserializer)?))
}

fn lenient_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let count = lenient_number(Option::<Value>::deserialize(deserializer)?);
    Ok(count.and_then(|n| u64::try_from(n).ok()).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_outcome_parses_worker_record() {
        let outcome: QueryOutcome = serde_json::from_value(json!({
            "type": "DELETE",
            "affectedRows": 0,
            "insertId": null,
            "message": "DELETE execute successfully",
            "error": null
        }))
        .unwrap();

        assert_eq!(outcome.kind.as_deref(), Some("DELETE"));
        assert_eq!(outcome.affected_rows, 0);
        assert_eq!(outcome.insert_id, None);
        assert!(outcome.rows.is_none());
    }

    #[test]
    fn test_insert_id_accepts_numeric_strings() {
        let outcome: QueryOutcome =
            serde_json::from_value(json!({"type": "INSERT", "affectedRows": 1, "insertId": "42"}))
                .unwrap();
        assert_eq!(outcome.insert_id, Some(42));

        let outcome: QueryOutcome =
            serde_json::from_value(json!({"insertId": "not-a-number"})).unwrap();
        assert_eq!(outcome.insert_id, None);
    }

    #[test]
    fn test_query_execution_result_wire_shape() {
        let result = QueryExecutionResult {
            affected_rows: 0,
            insert_id: None,
            message: Some("DELETE execute successfully".to_string()),
            error: None,
        };
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({
                "affectedRows": 0,
                "insertId": null,
                "message": "DELETE execute successfully",
                "error": null
            })
        );
    }

    #[test]
    fn test_query_execution_result_display() {
        let result = QueryExecutionResult {
            affected_rows: 2,
            insert_id: Some(7),
            message: Some("INSERT execute successfully".to_string()),
            error: None,
        };
        assert_eq!(
            result.to_string(),
            "affectedRows: 2, insertId: 7, message: 'INSERT execute successfully', error: 'null'"
        );
    }

    #[test]
    fn test_file_envelope_failure_message() {
        let envelope: FileExecutionResult = serde_json::from_value(json!({
            "success": false,
            "results": [{"action": "readFile", "path": "/nope", "result": null, "error": "ENOENT"}]
        }))
        .unwrap();
        assert_eq!(envelope.failure_message(), "ENOENT");

        let envelope = FileExecutionResult {
            success: false,
            error: Some("bad batch".to_string()),
            ..Default::default()
        };
        assert_eq!(envelope.failure_message(), "bad batch");
        assert_eq!(FileExecutionResult::default().failure_message(), "File operation failed");
    }

    #[test]
    fn test_select_result_accessors() {
        let row: Row = [("id".to_string(), CoercedValue::Integer(3))]
            .into_iter()
            .collect();
        let select = SelectQueryResult::new(vec![row]);
        assert_eq!(select.row_count, 1);
        assert_eq!(select.message, "1 rows found");
        assert!(select.has_rows());
        assert_eq!(select.value(0, "id"), Some(&CoercedValue::Integer(3)));
        assert_eq!(select.value(1, "id"), None);

        let empty = SelectQueryResult::new(Vec::new());
        assert_eq!(empty.message, "No rows found");
        assert!(empty.first_row().is_none());
    }
}
