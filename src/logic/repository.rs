//! Repository method descriptors.
//!
//! A repository is declared as a set of named methods, each tagged with the
//! kind of data operation it performs and the shape its result is mapped to.
//! Templates are normalised once, when the descriptor is built, so a call only
//! has to collect its arguments.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

static NAMED_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\?([A-Za-z_][A-Za-z0-9_]*)").expect("placeholder pattern"));

/// The declared return shape of a repository method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnShape {
    /// Nothing is returned to the caller.
    Unit,
    /// A [`QueryExecutionResult`](crate::model::QueryExecutionResult).
    Execution,
    /// A [`SelectQueryResult`](crate::model::SelectQueryResult).
    Select,
    /// The first row of the result set.
    Row,
    /// Every row of the result set.
    Rows,
    /// The first entry of a file envelope.
    FileResult,
    /// Every entry of a file envelope, in batch order.
    FileResults,
    /// The whole file envelope.
    FileExecution,
}

impl ReturnShape {
    pub fn is_file_shape(&self) -> bool {
        matches!(
            self,
            ReturnShape::FileResult | ReturnShape::FileResults | ReturnShape::FileExecution
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodKind {
    /// A single SQL statement with positional parameters.
    Query { sql: String, params: Vec<String> },
    /// A batch built from every file-operation argument.
    File,
    /// A method carrying neither marker. Calling it always fails.
    Unmarked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryMethod {
    name: String,
    kind: MethodKind,
    returns: ReturnShape,
}

impl RepositoryMethod {
    /// Declares a query method.
    ///
    /// `params` names the method parameters in call order. Any `?name`
    /// placeholder naming one of them is reduced to a bare `?`; arguments are
    /// bound purely by position.
    pub fn query(
        name: impl Into<String>,
        sql: &str,
        params: &[&str],
        returns: ReturnShape,
    ) -> Self {
        Self {
            name: name.into(),
            kind: MethodKind::Query {
                sql: positional_sql(sql, params),
                params: params.iter().map(|p| p.to_string()).collect(),
            },
            returns,
        }
    }

    pub fn file(name: impl Into<String>, returns: ReturnShape) -> Self {
        Self {
            name: name.into(),
            kind: MethodKind::File,
            returns,
        }
    }

    pub fn unmarked(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: MethodKind::Unmarked,
            returns: ReturnShape::Unit,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &MethodKind {
        &self.kind
    }

    pub fn returns(&self) -> ReturnShape {
        self.returns
    }

    /// Number of arguments a query method expects.
    pub fn arity(&self) -> Option<usize> {
        match &self.kind {
            MethodKind::Query { params, .. } => Some(params.len()),
            _ => None,
        }
    }
}

fn positional_sql(sql: &str, params: &[&str]) -> String {
    NAMED_PLACEHOLDER
        .replace_all(sql, |caps: &Captures| {
            if params.contains(&&caps[1]) {
                "?".to_string()
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}
