use std::path::PathBuf;

use crate::model::{FileExecutionResult, FileOperation, QueryOperation, QueryOutcome};
use crate::store::error::{BridgeError, WorkerKind};

/// Executes batches of data operations out of process.
///
/// Each call is independent: one batch, one worker process, one reply.
pub trait DataBridge: Send + Sync {
    /// Runs a batch of SQL statements and returns one outcome per statement,
    /// in batch order.
    fn execute_queries(&self, batch: &[QueryOperation]) -> Result<Vec<QueryOutcome>, BridgeError>;

    /// Runs a batch of file actions. Only successful envelopes are returned.
    fn execute_files(&self, batch: &[FileOperation]) -> Result<FileExecutionResult, BridgeError>;
}

/// A fully described worker process launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerInvocation {
    pub kind: WorkerKind,
    pub program: String,
    pub script: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl WorkerInvocation {
    /// Path of the batch file, always the last argument.
    pub fn batch_path(&self) -> Option<&str> {
        self.args.last().map(String::as_str)
    }
}

/// Everything a worker produced, collected after it exited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerOutput {
    /// Exit code, `None` when terminated by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl WorkerOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn exited_cleanly(&self) -> bool {
        self.status == Some(0)
    }
}

/// Starts a worker process and waits for it to exit.
///
/// The production implementation is
/// [`ProcessLauncher`](crate::store::process::ProcessLauncher); tests inject
/// canned output instead of spawning Node.js.
pub trait WorkerLauncher: Send + Sync {
    fn launch(&self, invocation: &WorkerInvocation) -> Result<WorkerOutput, BridgeError>;
}
