//! Task entity model and DTOs.

use gaffer_core::status::StatusId;
use gaffer_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `tasks` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Task {
    pub id: DbId,
    pub order_id: DbId,
    pub name: String,
    pub status_id: StatusId,
    pub payload: serde_json::Value,
    /// Name of the account the dispatcher leased for the run. Set when
    /// the task is claimed, cleared again if the task is requeued.
    pub account_used: Option<String>,
    pub error_message: Option<String>,
    /// Artifact paths, recorded once the files have been written.
    pub log_path: Option<String>,
    pub trace_path: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
}

/// One unit of work produced by a service decomposing an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    /// Human-readable task name (shown in listings, e.g. the hostname).
    pub name: String,
    /// Input handed to the executor for this task.
    pub payload: serde_json::Value,
}

/// Query parameters for `GET /api/v1/tasks` and `/tasks/count`.
#[derive(Debug, Default, Deserialize)]
pub struct TaskListQuery {
    /// Restrict to tasks belonging to one order.
    pub order_id: Option<DbId>,
    /// Filter by status ID (e.g. 2 = queued, 3 = running).
    pub status_id: Option<StatusId>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}
