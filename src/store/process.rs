//! Worker launches backed by real child processes.

use std::process::{Command, Stdio};

use log::debug;

use crate::store::error::BridgeError;
use crate::store::traits::{WorkerInvocation, WorkerLauncher, WorkerOutput};

/// Spawns one child process per invocation and blocks until it exits.
///
/// Stdout and stderr are drained concurrently while waiting so a chatty
/// worker cannot stall on a full pipe. There is no timeout; a hung worker
/// blocks the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessLauncher;

impl WorkerLauncher for ProcessLauncher {
    fn launch(&self, invocation: &WorkerInvocation) -> Result<WorkerOutput, BridgeError> {
        let mut command = Command::new(&invocation.program);
        command
            .arg(&invocation.script)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(dir) = &invocation.working_dir {
            command.current_dir(dir);
        }

        debug!(
            "Spawning {} worker: {} {}",
            invocation.kind,
            invocation.program,
            invocation.script.display()
        );

        let child = command.spawn().map_err(|source| BridgeError::Spawn {
            worker: invocation.kind,
            program: invocation.program.clone(),
            source,
        })?;

        let output = child
            .wait_with_output()
            .map_err(|source| BridgeError::from_wait(invocation.kind, source))?;

        debug!(
            "{} worker exited with {:?} ({} bytes stdout, {} bytes stderr)",
            invocation.kind,
            output.status.code(),
            output.stdout.len(),
            output.stderr.len()
        );

        Ok(WorkerOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
