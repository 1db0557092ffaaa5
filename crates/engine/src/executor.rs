//! Task execution interface and the subprocess-backed implementation.
//!
//! The dispatcher owns the per-task timeout and wraps `execute` in it;
//! an executor only has to guarantee that dropping its future kills
//! whatever it started (`kill_on_drop` below).

use std::process::Stdio;

use async_trait::async_trait;
use gaffer_db::models::task::Task;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use crate::accounts::Account;

/// Maximum stdout or stderr size captured per stream (10 MiB).
/// Anything past the limit is discarded, not buffered.
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Outcome of one task execution.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    /// Whether the work succeeded (exit status 0 for subprocesses).
    pub success: bool,
    /// Short reason recorded on the task when `success` is false.
    pub failure_reason: Option<String>,
    /// Captured stdout; written to the task's `.log` artifact.
    pub log: Vec<u8>,
    /// Captured stderr; written to the task's `.trace` artifact.
    pub trace: Vec<u8>,
}

/// Infrastructure failures distinct from the task's own work failing.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("failed to spawn executor command: {0}")]
    Spawn(std::io::Error),

    #[error("I/O error during execution: {0}")]
    Io(std::io::Error),
}

/// Runs one task against one leased account.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(
        &self,
        account: &Account,
        task: &Task,
    ) -> Result<ExecutionReport, ExecutorError>;
}

/// Executor that spawns a configured command per task.
///
/// The task is described to the child as a JSON document on stdin; the
/// account is identified by name only, secrets never leave the daemon.
/// Stdout becomes the log artifact, stderr the trace artifact, and exit
/// status 0 means success.
pub struct CommandExecutor {
    program: String,
    args: Vec<String>,
}

impl CommandExecutor {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl Executor for CommandExecutor {
    async fn execute(
        &self,
        account: &Account,
        task: &Task,
    ) -> Result<ExecutionReport, ExecutorError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(ExecutorError::Spawn)?;

        // Write the task description to stdin, then close it.
        if let Some(mut stdin) = child.stdin.take() {
            let input = serde_json::json!({
                "task_id": task.id,
                "order_id": task.order_id,
                "name": task.name,
                "account": account.name(),
                "payload": task.payload,
            });
            let bytes = serde_json::to_vec(&input).unwrap_or_default();
            // Best-effort write; if the process closes stdin early, ignore the error.
            let _ = stdin.write_all(&bytes).await;
            drop(stdin);
        }

        // Take stdout/stderr handles and read them in spawned tasks so we
        // can still call `child.wait()` (which borrows `&mut child`).
        let stdout_handle = child.stdout.take();
        let stderr_handle = child.stderr.take();

        let stdout_task = tokio::spawn(async move { read_stream(stdout_handle).await });
        let stderr_task = tokio::spawn(async move { read_stream(stderr_handle).await });

        let status = child.wait().await.map_err(ExecutorError::Io)?;
        let log = stdout_task.await.unwrap_or_default();
        let trace = stderr_task.await.unwrap_or_default();

        let failure_reason = if status.success() {
            None
        } else {
            Some(match status.code() {
                Some(code) => format!("exit status {code}"),
                None => "killed by signal".to_string(),
            })
        };

        Ok(ExecutionReport {
            success: status.success(),
            failure_reason,
            log,
            trace,
        })
    }
}

/// Read an output stream into a byte buffer, capped at [`MAX_OUTPUT_BYTES`].
/// The stream is always drained to EOF; bytes past the cap are discarded,
/// so a verbose child is never left blocked on a full pipe.
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        if (&mut h)
            .take(MAX_OUTPUT_BYTES as u64)
            .read_to_end(&mut buf)
            .await
            .is_ok()
        {
            let _ = tokio::io::copy(&mut h, &mut tokio::io::sink()).await;
        }
    }
    buf
}
