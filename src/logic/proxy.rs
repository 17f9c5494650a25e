use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::logic::coerce::coerce_row;
use crate::logic::repository::{MethodKind, RepositoryMethod, ReturnShape};
use crate::model::{
    FileExecutionResult, FileOperation, FileOperationResult, QueryExecutionResult,
    QueryOperation, QueryOutcome, Row, SelectQueryResult, TypeKey,
};
use crate::registry::RepositoryDescriptor;
use crate::store::{BridgeError, DataBridge};

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("method '{method}' is not declared on {repository}")]
    UnknownMethod { repository: TypeKey, method: String },

    #[error("method '{method}' on {repository} is not supported: it carries no query or file marker")]
    Unsupported { repository: TypeKey, method: String },

    #[error("method '{method}' on {repository} expects {expected} argument(s), got {actual}")]
    Arity {
        repository: TypeKey,
        method: String,
        expected: usize,
        actual: usize,
    },

    /// The worker ran the batch but the operation itself failed.
    #[error("{method} failed: {message}")]
    Operation { method: String, message: String },

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("result of '{method}' is {actual:?}, not {expected:?}")]
    UnexpectedShape {
        method: String,
        expected: ReturnShape,
        actual: ReturnShape,
    },

    #[error("failed to decode result of '{method}': {source}")]
    Decode {
        method: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A repository call result in its declared shape.
///
/// Serialises the way a handler would return it: `Unit` and absent rows as
/// `null`, everything else as its plain JSON form.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Mapped {
    Unit,
    Execution(QueryExecutionResult),
    Select(SelectQueryResult),
    Row(Option<Row>),
    Rows(Option<Vec<Row>>),
    FileResult(Option<FileOperationResult>),
    FileResults(Vec<FileOperationResult>),
    FileExecution(FileExecutionResult),
}

impl Mapped {
    pub fn shape(&self) -> ReturnShape {
        match self {
            Mapped::Unit => ReturnShape::Unit,
            Mapped::Execution(_) => ReturnShape::Execution,
            Mapped::Select(_) => ReturnShape::Select,
            Mapped::Row(_) => ReturnShape::Row,
            Mapped::Rows(_) => ReturnShape::Rows,
            Mapped::FileResult(_) => ReturnShape::FileResult,
            Mapped::FileResults(_) => ReturnShape::FileResults,
            Mapped::FileExecution(_) => ReturnShape::FileExecution,
        }
    }
}

/// Stands in for a declared repository.
///
/// Every call is classified by the method descriptor captured at setup, turned
/// into a one-call batch and sent over the bridge. Calls are independent and
/// may run concurrently.
pub struct RepositoryProxy {
    repository: TypeKey,
    methods: HashMap<String, RepositoryMethod>,
    bridge: Arc<dyn DataBridge>,
}

impl RepositoryProxy {
    pub fn new(descriptor: &RepositoryDescriptor, bridge: Arc<dyn DataBridge>) -> Self {
        let methods = descriptor
            .methods()
            .iter()
            .inspect(|method| warn_on_mismatched_shape(descriptor.key(), method))
            .map(|method| (method.name().to_string(), method.clone()))
            .collect();
        Self {
            repository: descriptor.key(),
            methods,
            bridge,
        }
    }

    pub fn repository(&self) -> TypeKey {
        self.repository
    }

    pub fn method(&self, name: &str) -> Option<&RepositoryMethod> {
        self.methods.get(name)
    }

    /// Invokes a declared method with its arguments in declaration order.
    pub fn call(&self, method: &str, args: Vec<Value>) -> Result<Mapped, ProxyError> {
        let descriptor = self.methods.get(method).ok_or_else(|| ProxyError::UnknownMethod {
            repository: self.repository,
            method: method.to_string(),
        })?;

        match descriptor.kind() {
            MethodKind::Query { sql, .. } => {
                let expected = descriptor.arity().unwrap_or_default();
                if args.len() != expected {
                    return Err(ProxyError::Arity {
                        repository: self.repository,
                        method: method.to_string(),
                        expected,
                        actual: args.len(),
                    });
                }
                info!("Executing query: {sql}");
                debug!("With parameters: {args:?}");

                let batch = [QueryOperation::new(sql.as_str(), args)];
                let outcome = self.bridge.execute_queries(&batch)?.into_iter().next();
                map_query(method, descriptor.returns(), outcome)
            }
            MethodKind::File => {
                let batch = file_operations(&args);
                if batch.len() != args.len() {
                    debug!(
                        "{method}: {} argument(s) are not file operations and were skipped",
                        args.len() - batch.len()
                    );
                }
                info!("Executing file operation: {method}");
                debug!("With operations: {batch:?}");

                let envelope = self.bridge.execute_files(&batch)?;
                map_file(method, descriptor.returns(), envelope)
            }
            MethodKind::Unmarked => Err(ProxyError::Unsupported {
                repository: self.repository,
                method: method.to_string(),
            }),
        }
    }

    /// Calls an `Execution` method.
    pub fn execute(&self, method: &str, args: Vec<Value>) -> Result<QueryExecutionResult, ProxyError> {
        match self.call(method, args)? {
            Mapped::Execution(result) => Ok(result),
            other => Err(unexpected(method, ReturnShape::Execution, &other)),
        }
    }

    /// Calls a `Select` method.
    pub fn select(&self, method: &str, args: Vec<Value>) -> Result<SelectQueryResult, ProxyError> {
        match self.call(method, args)? {
            Mapped::Select(result) => Ok(result),
            other => Err(unexpected(method, ReturnShape::Select, &other)),
        }
    }

    /// Calls a `Row` method and decodes the row into `T`.
    pub fn fetch_one<T: DeserializeOwned>(
        &self,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Option<T>, ProxyError> {
        match self.call(method, args)? {
            Mapped::Row(row) => row.map(|row| decode(method, &row)).transpose(),
            other => Err(unexpected(method, ReturnShape::Row, &other)),
        }
    }

    /// Calls a `Rows` method and decodes every row into `T`.
    pub fn fetch_all<T: DeserializeOwned>(
        &self,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Option<Vec<T>>, ProxyError> {
        match self.call(method, args)? {
            Mapped::Rows(rows) => rows
                .map(|rows| rows.iter().map(|row| decode(method, row)).collect())
                .transpose(),
            other => Err(unexpected(method, ReturnShape::Rows, &other)),
        }
    }

    /// Calls a file method and returns every entry of the envelope.
    pub fn run_files(
        &self,
        method: &str,
        operations: Vec<FileOperation>,
    ) -> Result<Mapped, ProxyError> {
        let args = operations
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| ProxyError::Decode {
                method: method.to_string(),
                source,
            })?;
        self.call(method, args)
    }
}

// Such a method still loads; every call to it fails with `UnexpectedShape`.
fn warn_on_mismatched_shape(repository: TypeKey, method: &RepositoryMethod) {
    let returns = method.returns();
    let mismatched = match method.kind() {
        MethodKind::Query { .. } => returns.is_file_shape(),
        MethodKind::File => !returns.is_file_shape() && returns != ReturnShape::Unit,
        MethodKind::Unmarked => false,
    };
    if mismatched {
        warn!(
            "{repository}::{} declares {returns:?}, which its {} marker cannot produce",
            method.name(),
            match method.kind() {
                MethodKind::File => "file",
                _ => "query",
            }
        );
    }
}

fn file_operations(args: &[Value]) -> Vec<FileOperation> {
    args.iter()
        .filter_map(|arg| serde_json::from_value::<FileOperation>(arg.clone()).ok())
        .collect()
}

fn decode<T: DeserializeOwned>(method: &str, row: &Row) -> Result<T, ProxyError> {
    row.decode().map_err(|source| ProxyError::Decode {
        method: method.to_string(),
        source,
    })
}

fn unexpected(method: &str, expected: ReturnShape, actual: &Mapped) -> ProxyError {
    ProxyError::UnexpectedShape {
        method: method.to_string(),
        expected,
        actual: actual.shape(),
    }
}

fn operation_failed(method: &str, outcome: &QueryOutcome) -> Result<(), ProxyError> {
    match &outcome.error {
        Some(message) => Err(ProxyError::Operation {
            method: method.to_string(),
            message: message.clone(),
        }),
        None => Ok(()),
    }
}

fn coerced_rows(outcome: &QueryOutcome) -> Vec<Row> {
    outcome
        .rows
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(coerce_row)
        .collect()
}

// Execution and Select carry a per-statement error as a field, the way the
// worker reports it. Row-shaped results have nowhere to put it.
fn map_query(
    method: &str,
    returns: ReturnShape,
    outcome: Option<QueryOutcome>,
) -> Result<Mapped, ProxyError> {
    let mapped = match (returns, outcome) {
        (ReturnShape::Unit, Some(outcome)) => {
            operation_failed(method, &outcome)?;
            Mapped::Unit
        }
        (ReturnShape::Unit, None) => Mapped::Unit,
        (ReturnShape::Execution, Some(outcome)) => {
            Mapped::Execution(QueryExecutionResult::from(&outcome))
        }
        (ReturnShape::Execution, None) => Mapped::Execution(QueryExecutionResult::no_result()),
        (ReturnShape::Select, Some(outcome)) => {
            let mut result = SelectQueryResult::new(coerced_rows(&outcome));
            result.error = outcome.error;
            Mapped::Select(result)
        }
        (ReturnShape::Select, None) => Mapped::Select(SelectQueryResult::no_result()),
        (ReturnShape::Row, Some(outcome)) => {
            operation_failed(method, &outcome)?;
            Mapped::Row(coerced_rows(&outcome).into_iter().next())
        }
        (ReturnShape::Rows, Some(outcome)) => {
            operation_failed(method, &outcome)?;
            Mapped::Rows(Some(coerced_rows(&outcome)))
        }
        (ReturnShape::Row, None) => Mapped::Row(None),
        (ReturnShape::Rows, None) => Mapped::Rows(None),
        (shape, _) => {
            warn!("{method}: file result shape {shape:?} declared on a query method");
            return Err(ProxyError::UnexpectedShape {
                method: method.to_string(),
                expected: shape,
                actual: ReturnShape::Execution,
            });
        }
    };
    Ok(mapped)
}

fn map_file(
    method: &str,
    returns: ReturnShape,
    envelope: FileExecutionResult,
) -> Result<Mapped, ProxyError> {
    let mapped = match returns {
        ReturnShape::Unit => Mapped::Unit,
        ReturnShape::FileResult => Mapped::FileResult(envelope.results.into_iter().next()),
        ReturnShape::FileResults => Mapped::FileResults(envelope.results),
        ReturnShape::FileExecution => Mapped::FileExecution(envelope),
        shape => {
            warn!("{method}: query result shape {shape:?} declared on a file method");
            return Err(ProxyError::UnexpectedShape {
                method: method.to_string(),
                expected: shape,
                actual: ReturnShape::FileExecution,
            });
        }
    };
    Ok(mapped)
}
