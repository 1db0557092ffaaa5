//! Naming scheme for per-task execution artifacts.
//!
//! Every task gets a log file (executor stdout) and a trace file
//! (executor stderr) under the configured artifact directory, keyed by
//! task id. The scheme lives in `core` so the engine (writer) and the
//! API (reader) cannot drift apart.

use std::path::{Path, PathBuf};

use crate::types::DbId;

/// File name of a task's log artifact.
pub fn log_filename(task_id: DbId) -> String {
    format!("{task_id}.log")
}

/// File name of a task's trace artifact.
pub fn trace_filename(task_id: DbId) -> String {
    format!("{task_id}.trace")
}

/// Absolute path of a task's log artifact under `log_dir`.
pub fn log_path(log_dir: &Path, task_id: DbId) -> PathBuf {
    log_dir.join(log_filename(task_id))
}

/// Absolute path of a task's trace artifact under `log_dir`.
pub fn trace_path(log_dir: &Path, task_id: DbId) -> PathBuf {
    log_dir.join(trace_filename(task_id))
}
