//! Failures raised while running a worker batch.
//!
//! Every variant is fatal to the whole batch. Per-operation failures reported
//! inside a well-formed query reply are not errors at this layer.

use std::fmt;
use std::io;

use thiserror::Error;

/// Which worker protocol a batch was sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerKind {
    Query,
    File,
}

impl WorkerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerKind::Query => "query-executor",
            WorkerKind::File => "file-executor",
        }
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to serialise {worker} batch: {source}")]
    SerializeBatch {
        worker: WorkerKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to prepare {worker} batch file: {source}")]
    BatchFile {
        worker: WorkerKind,
        #[source]
        source: io::Error,
    },

    #[error("{worker} worker '{program}' failed to start: {source}")]
    Spawn {
        worker: WorkerKind,
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("interrupted while waiting for {worker} worker")]
    Interrupted { worker: WorkerKind },

    #[error("I/O error communicating with {worker} worker: {source}")]
    Io {
        worker: WorkerKind,
        #[source]
        source: io::Error,
    },

    /// The worker exited unsuccessfully; `stderr` holds everything it wrote.
    /// `code` is -1 when the process was terminated by a signal.
    #[error("{worker} worker exited with status {code}: {stderr}")]
    NonZeroExit {
        worker: WorkerKind,
        code: i32,
        stderr: String,
    },

    #[error("failed to parse {worker} worker output: {source}")]
    MalformedOutput {
        worker: WorkerKind,
        output: String,
        #[source]
        source: serde_json::Error,
    },

    /// The worker replied with a well-formed envelope flagged unsuccessful.
    #[error("{worker} worker reported failure: {message}")]
    WorkerReported { worker: WorkerKind, message: String },
}

impl BridgeError {
    pub fn worker(&self) -> WorkerKind {
        match self {
            BridgeError::SerializeBatch { worker, .. }
            | BridgeError::BatchFile { worker, .. }
            | BridgeError::Spawn { worker, .. }
            | BridgeError::Interrupted { worker }
            | BridgeError::Io { worker, .. }
            | BridgeError::NonZeroExit { worker, .. }
            | BridgeError::MalformedOutput { worker, .. }
            | BridgeError::WorkerReported { worker, .. } => *worker,
        }
    }

    /// Classifies an I/O failure that happened while waiting on a worker.
    pub fn from_wait(worker: WorkerKind, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::Interrupted {
            BridgeError::Interrupted { worker }
        } else {
            BridgeError::Io { worker, source }
        }
    }

    /// The worker's own error text, when it reported one.
    ///
    /// Workers write a JSON object with an `error` field to stderr before
    /// exiting; raw stderr is returned when it is not JSON.
    pub fn worker_message(&self) -> Option<String> {
        match self {
            BridgeError::NonZeroExit { stderr, .. } => {
                let reported = serde_json::from_str::<serde_json::Value>(stderr.trim())
                    .ok()
                    .and_then(|value| value.get("error").and_then(|e| e.as_str()).map(str::to_string));
                Some(reported.unwrap_or_else(|| stderr.trim().to_string()))
            }
            BridgeError::WorkerReported { message, .. } => Some(message.clone()),
            _ => None,
        }
    }
}
