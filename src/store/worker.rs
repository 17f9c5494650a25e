//! The JSON-over-stdio batch bridge.
//!
//! A call serialises its batch to a private temp file, launches one worker
//! with the file path as its last argument, waits for exit and then reads the
//! reply. The temp file is removed when the call returns, on every path.

use std::io::Write;
use std::path::Path;

use log::{debug, error, info, warn};
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::config::{DatabaseConfig, WorkerConfig};
use crate::model::{FileExecutionResult, FileOperation, QueryOperation, QueryOutcome};
use crate::store::error::{BridgeError, WorkerKind};
use crate::store::process::ProcessLauncher;
use crate::store::traits::{DataBridge, WorkerInvocation, WorkerLauncher};

#[derive(Debug, Clone)]
pub struct WorkerBridge<L = ProcessLauncher> {
    worker: WorkerConfig,
    database: DatabaseConfig,
    launcher: L,
}

impl WorkerBridge<ProcessLauncher> {
    pub fn spawning(worker: WorkerConfig, database: DatabaseConfig) -> Self {
        Self::new(worker, database, ProcessLauncher)
    }
}

impl<L: WorkerLauncher> WorkerBridge<L> {
    pub fn new(worker: WorkerConfig, database: DatabaseConfig, launcher: L) -> Self {
        Self {
            worker,
            database,
            launcher,
        }
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    fn connection_args(&self) -> Vec<String> {
        vec![
            self.database.host.clone(),
            self.database.port.to_string(),
            self.database.username.clone(),
            self.database.password.clone(),
            self.database.database.clone(),
        ]
    }

    /// Runs one batch and returns the trimmed stdout, `None` when empty.
    fn run_batch<T: Serialize>(
        &self,
        kind: WorkerKind,
        script: &Path,
        file_prefix: &str,
        mut args: Vec<String>,
        batch: &[T],
        first: &str,
    ) -> Result<Option<String>, BridgeError> {
        let mut batch_file = tempfile::Builder::new()
            .prefix(file_prefix)
            .suffix(".json")
            .tempfile()
            .map_err(|source| BridgeError::BatchFile { worker: kind, source })?;

        write_batch(kind, &mut batch_file, batch)?;
        args.push(batch_file.path().to_string_lossy().into_owned());

        let invocation = WorkerInvocation {
            kind,
            program: self.worker.program.clone(),
            script: script.to_path_buf(),
            args,
            working_dir: self.worker.working_dir.clone(),
        };

        info!("Executing: {} ({} operation(s))", script.display(), batch.len());

        let output = self.launcher.launch(&invocation).map_err(|err| {
            error!(
                "{kind} batch of {} operation(s) failed (first: {first}): {err}",
                batch.len()
            );
            err
        })?;

        if !output.exited_cleanly() {
            let code = output.status.unwrap_or(-1);
            error!(
                "{kind} batch of {} operation(s) exited with status {code} (first: {first}): {}",
                batch.len(),
                output.stderr.trim()
            );
            return Err(BridgeError::NonZeroExit {
                worker: kind,
                code,
                stderr: output.stderr,
            });
        }

        if !output.stderr.trim().is_empty() {
            debug!("{kind} worker stderr: {}", output.stderr.trim());
        }

        let stdout = output.stdout.trim();
        if stdout.is_empty() {
            info!("{kind} worker returned empty output");
            return Ok(None);
        }
        Ok(Some(stdout.to_string()))
    }
}

/// The first statement of a query batch, for failure logs.
fn first_statement(batch: &[QueryOperation]) -> String {
    batch
        .first()
        .map(|op| op.sql.clone())
        .unwrap_or_else(|| "<empty batch>".to_string())
}

/// The first action and path of a file batch, for failure logs.
fn first_action(batch: &[FileOperation]) -> String {
    batch
        .first()
        .map(|op| format!("{} {}", op.action.as_str(), op.path))
        .unwrap_or_else(|| "<empty batch>".to_string())
}

fn write_batch<T: Serialize>(
    kind: WorkerKind,
    batch_file: &mut NamedTempFile,
    batch: &[T],
) -> Result<(), BridgeError> {
    serde_json::to_writer(&mut *batch_file, batch)
        .map_err(|source| BridgeError::SerializeBatch { worker: kind, source })?;
    batch_file
        .flush()
        .map_err(|source| BridgeError::BatchFile { worker: kind, source })
}

impl<L: WorkerLauncher> DataBridge for WorkerBridge<L> {
    fn execute_queries(&self, batch: &[QueryOperation]) -> Result<Vec<QueryOutcome>, BridgeError> {
        let kind = WorkerKind::Query;
        let Some(stdout) = self.run_batch(
            kind,
            &self.worker.query_script,
            "batch",
            self.connection_args(),
            batch,
            &first_statement(batch),
        )?
        else {
            return Ok(vec![QueryOutcome::nothing_affected()]);
        };

        let outcomes: Vec<QueryOutcome> =
            serde_json::from_str(&stdout).map_err(|source| {
                error!("Failed to parse {kind} output: {stdout}");
                BridgeError::MalformedOutput {
                    worker: kind,
                    output: stdout.clone(),
                    source,
                }
            })?;

        if outcomes.len() != batch.len() {
            warn!(
                "{kind} returned {} result(s) for {} operation(s)",
                outcomes.len(),
                batch.len()
            );
        }
        Ok(outcomes)
    }

    fn execute_files(&self, batch: &[FileOperation]) -> Result<FileExecutionResult, BridgeError> {
        let kind = WorkerKind::File;
        let Some(stdout) = self.run_batch(
            kind,
            &self.worker.file_script,
            "file.ops",
            Vec::new(),
            batch,
            &first_action(batch),
        )?
        else {
            return Ok(FileExecutionResult {
                success: true,
                ..FileExecutionResult::default()
            });
        };

        let envelope: FileExecutionResult =
            serde_json::from_str(&stdout).map_err(|source| {
                error!("Failed to parse {kind} output: {stdout}");
                BridgeError::MalformedOutput {
                    worker: kind,
                    output: stdout.clone(),
                    source,
                }
            })?;

        if !envelope.success {
            let message = envelope.failure_message();
            error!(
                "{kind} reported failure for {} operation(s) (first: {}): {message}",
                batch.len(),
                first_action(batch)
            );
            return Err(BridgeError::WorkerReported {
                worker: kind,
                message,
            });
        }
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::traits::WorkerOutput;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::path::PathBuf;

    /// Records every launch, including the batch file contents it was given.
    struct CannedLauncher {
        output: Result<WorkerOutput, fn(WorkerKind) -> BridgeError>,
        launches: Mutex<Vec<(WorkerInvocation, Value)>>,
    }

    impl CannedLauncher {
        fn replying(output: WorkerOutput) -> Self {
            Self {
                output: Ok(output),
                launches: Mutex::new(Vec::new()),
            }
        }

        fn failing(make: fn(WorkerKind) -> BridgeError) -> Self {
            Self {
                output: Err(make),
                launches: Mutex::new(Vec::new()),
            }
        }

        fn only_launch(&self) -> (WorkerInvocation, Value) {
            let launches = self.launches.lock();
            assert_eq!(launches.len(), 1);
            launches[0].clone()
        }
    }

    impl WorkerLauncher for CannedLauncher {
        fn launch(&self, invocation: &WorkerInvocation) -> Result<WorkerOutput, BridgeError> {
            let path = invocation.batch_path().expect("batch path argument");
            let contents = std::fs::read_to_string(path).expect("batch file exists during launch");
            let batch: Value = serde_json::from_str(&contents).expect("batch file is JSON");
            self.launches.lock().push((invocation.clone(), batch));
            match &self.output {
                Ok(output) => Ok(output.clone()),
                Err(make) => Err(make(invocation.kind)),
            }
        }
    }

    fn bridge(launcher: CannedLauncher) -> WorkerBridge<CannedLauncher> {
        let database = DatabaseConfig {
            host: "db.local".to_string(),
            port: 3307,
            username: "app".to_string(),
            password: "pw".to_string(),
            database: "shop".to_string(),
        };
        let worker = WorkerConfig {
            program: "node".to_string(),
            query_script: PathBuf::from("scripts/query-executor.js"),
            file_script: PathBuf::from("scripts/file-executor.js"),
            working_dir: None,
        };
        WorkerBridge::new(worker, database, launcher)
    }

    #[test]
    fn test_query_batch_round_trip_preserves_order() {
        let reply = json!([
            {"type": "SELECT", "affectedRows": 1, "insertId": null, "message": "1 rows found",
             "rows": [{"id": 1, "name": "Ann"}]},
            {"type": "UPDATE", "affectedRows": 3, "insertId": null,
             "message": "UPDATE execute successfully", "error": null}
        ]);
        let bridge = bridge(CannedLauncher::replying(WorkerOutput::success(reply.to_string())));
        let batch = vec![
            QueryOperation::new("SELECT * FROM users WHERE id=?", vec![json!(1)]),
            QueryOperation::new("UPDATE users SET active=? WHERE team=?", vec![json!(true), json!("red")]),
        ];

        let outcomes = bridge.execute_queries(&batch).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].kind.as_deref(), Some("SELECT"));
        assert_eq!(outcomes[0].rows.as_ref().unwrap()[0]["name"], json!("Ann"));
        assert_eq!(outcomes[1].kind.as_deref(), Some("UPDATE"));
        assert_eq!(outcomes[1].affected_rows, 3);

        let (invocation, written) = bridge.launcher().only_launch();
        assert_eq!(written, serde_json::to_value(&batch).unwrap());
        assert_eq!(invocation.program, "node");
        assert_eq!(invocation.script, PathBuf::from("scripts/query-executor.js"));
        assert_eq!(&invocation.args[..5], ["db.local", "3307", "app", "pw", "shop"]);
        assert_eq!(invocation.args.len(), 6);
    }

    #[test]
    fn test_batch_file_is_removed_after_call() {
        let bridge = bridge(CannedLauncher::replying(WorkerOutput::success("[]")));
        bridge
            .execute_queries(&[QueryOperation::new("SELECT 1", vec![])])
            .unwrap();
        let (invocation, _) = bridge.launcher().only_launch();
        assert!(!Path::new(invocation.batch_path().unwrap()).exists());
    }

    #[test]
    fn test_batch_file_is_removed_after_failure() {
        let bridge = bridge(CannedLauncher::replying(WorkerOutput::failure(1, "boom")));
        bridge
            .execute_queries(&[QueryOperation::new("SELECT 1", vec![])])
            .unwrap_err();
        let (invocation, _) = bridge.launcher().only_launch();
        assert!(!Path::new(invocation.batch_path().unwrap()).exists());
    }

    #[test]
    fn test_empty_stdout_means_nothing_affected() {
        let bridge = bridge(CannedLauncher::replying(WorkerOutput::success("  \n")));
        let outcomes = bridge
            .execute_queries(&[QueryOperation::new("DELETE FROM users WHERE id=?", vec![json!(9)])])
            .unwrap();
        assert_eq!(outcomes, vec![QueryOutcome::nothing_affected()]);
        assert_eq!(outcomes[0].affected_rows, 0);
    }

    #[test]
    fn test_non_zero_exit_is_fatal_even_with_stdout() {
        let output = WorkerOutput {
            status: Some(1),
            stdout: r#"[{"type":"INSERT","affectedRows":1}]"#.to_string(),
            stderr: r#"{"error":"ER_DUP_ENTRY"}"#.to_string(),
        };
        let bridge = bridge(CannedLauncher::replying(output));
        let err = bridge
            .execute_queries(&[QueryOperation::new("INSERT INTO users VALUES (?)", vec![json!(1)])])
            .unwrap_err();

        match &err {
            BridgeError::NonZeroExit { code, stderr, .. } => {
                assert_eq!(*code, 1);
                assert!(stderr.contains("ER_DUP_ENTRY"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.worker_message().as_deref(), Some("ER_DUP_ENTRY"));
    }

    #[test]
    fn test_signal_termination_is_fatal() {
        let output = WorkerOutput {
            status: None,
            stdout: "[]".to_string(),
            stderr: String::new(),
        };
        let bridge = bridge(CannedLauncher::replying(output));
        let err = bridge.execute_queries(&[]).unwrap_err();
        assert!(matches!(err, BridgeError::NonZeroExit { code: -1, .. }));
    }

    #[test]
    fn test_malformed_output_is_distinct_failure() {
        let bridge = bridge(CannedLauncher::replying(WorkerOutput::success("rows: 1")));
        let err = bridge
            .execute_queries(&[QueryOperation::new("SELECT 1", vec![])])
            .unwrap_err();
        match err {
            BridgeError::MalformedOutput { output, .. } => assert_eq!(output, "rows: 1"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_launcher_failure_propagates() {
        let bridge = bridge(CannedLauncher::failing(|worker| BridgeError::Interrupted { worker }));
        let err = bridge
            .execute_queries(&[QueryOperation::new("SELECT 1", vec![])])
            .unwrap_err();
        assert!(matches!(err, BridgeError::Interrupted { worker: WorkerKind::Query }));
    }

    #[test]
    fn test_file_batch_success_envelope() {
        let reply = json!({
            "success": true,
            "results": [{"action": "readFile", "path": "/tmp/a.txt", "result": {"content": "hi"}}]
        });
        let bridge = bridge(CannedLauncher::replying(WorkerOutput::success(reply.to_string())));
        let envelope = bridge
            .execute_files(&[FileOperation::read("/tmp/a.txt")])
            .unwrap();

        assert!(envelope.success);
        assert_eq!(envelope.results.len(), 1);
        assert_eq!(envelope.results[0].field("content"), Some(&json!("hi")));

        let (invocation, written) = bridge.launcher().only_launch();
        assert_eq!(invocation.kind, WorkerKind::File);
        assert_eq!(invocation.args.len(), 1);
        assert_eq!(written, json!([{"action": "readFile", "path": "/tmp/a.txt"}]));
    }

    #[test]
    fn test_unsuccessful_envelope_is_fatal() {
        let reply = json!({
            "success": false,
            "error": "disk full",
            "results": [{"action": "writeFile", "path": "/tmp/a.txt", "result": {"bytesWritten": 0}}]
        });
        let bridge = bridge(CannedLauncher::replying(WorkerOutput::success(reply.to_string())));
        let err = bridge
            .execute_files(&[FileOperation::write("/tmp/a.txt", "x")])
            .unwrap_err();
        match err {
            BridgeError::WorkerReported { message, worker } => {
                assert_eq!(message, "disk full");
                assert_eq!(worker, WorkerKind::File);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_empty_file_reply_is_empty_success() {
        let bridge = bridge(CannedLauncher::replying(WorkerOutput::success("")));
        let envelope = bridge.execute_files(&[FileOperation::stats("/tmp")]).unwrap();
        assert!(envelope.success);
        assert!(envelope.results.is_empty());
    }

    #[test]
    fn test_failure_logs_name_first_operation_not_batch_file() {
        let queries = vec![
            QueryOperation::new("INSERT INTO users VALUES (?)", vec![json!(1)]),
            QueryOperation::new("SELECT 1", vec![]),
        ];
        assert_eq!(first_statement(&queries), "INSERT INTO users VALUES (?)");

        let files = vec![
            FileOperation::write("/tmp/out.txt", "x"),
            FileOperation::read("/tmp/in.txt"),
        ];
        assert_eq!(first_action(&files), "writeFile /tmp/out.txt");

        assert_eq!(first_statement(&[]), "<empty batch>");
        assert_eq!(first_action(&[]), "<empty batch>");
    }
}

#[cfg(all(test, unix))]
mod process_tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_query_worker_reads_batch_file_argument() {
        // Echo the batch file back as a single SELECT row so the test sees
        // exactly what the worker received as its sixth argument.
        let mut script = tempfile::Builder::new().suffix(".sh").tempfile().unwrap();
        writeln!(
            script,
            r#"printf '[{{"type":"SELECT","affectedRows":1,"rows":[{{"batch":%s}}]}}]' "$(cat "$6")""#
        )
        .unwrap();

        let worker = WorkerConfig {
            program: "sh".to_string(),
            query_script: script.path().to_path_buf(),
            ..WorkerConfig::default()
        };
        let bridge = WorkerBridge::spawning(worker, DatabaseConfig::default());
        let batch = vec![QueryOperation::new("SELECT ?", vec![serde_json::json!(5)])];

        let outcomes = bridge.execute_queries(&batch).unwrap();
        let rows = outcomes[0].rows.as_ref().unwrap();
        assert_eq!(rows[0]["batch"], serde_json::to_value(&batch).unwrap());
    }
}
