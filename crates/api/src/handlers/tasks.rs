//! Handlers for the `/tasks` resource.
//!
//! All endpoints require authentication via [`AuthOperator`]. Task rows
//! are reported as stored; unlike orders there is nothing to derive.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use gaffer_core::error::CoreError;
use gaffer_core::status::validate_task_status_id;
use gaffer_core::types::DbId;
use gaffer_db::models::task::TaskListQuery;

use crate::auth::AuthOperator;
use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// List / count
// ---------------------------------------------------------------------------

/// GET /api/v1/tasks
///
/// List tasks in creation order. Supports optional `order_id`,
/// `status_id`, `limit`, and `offset` query parameters; `limit` is
/// clamped to 100.
pub async fn list_tasks(
    _operator: AuthOperator,
    State(state): State<AppState>,
    Query(params): Query<TaskListQuery>,
) -> AppResult<impl IntoResponse> {
    if let Some(status_id) = params.status_id {
        validate_task_status_id(status_id)?;
    }
    let tasks = state.manager.list_tasks(&params).await?;
    Ok(Json(DataResponse { data: tasks }))
}

/// GET /api/v1/tasks/count
///
/// Count tasks matching the same filters as the list endpoint.
pub async fn count_tasks(
    _operator: AuthOperator,
    State(state): State<AppState>,
    Query(params): Query<TaskListQuery>,
) -> AppResult<impl IntoResponse> {
    if let Some(status_id) = params.status_id {
        validate_task_status_id(status_id)?;
    }
    let count = state.manager.count_tasks(&params).await?;
    Ok(Json(DataResponse { data: count }))
}

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

/// GET /api/v1/tasks/{id}
///
/// Get a single task by id. Returns 404 for an unknown id.
pub async fn get_task(
    _operator: AuthOperator,
    State(state): State<AppState>,
    Path(task_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let task = state
        .manager
        .get_task(task_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "Task",
            id: task_id,
        })?;

    Ok(Json(DataResponse { data: task }))
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

/// GET /api/v1/tasks/{id}/log
///
/// Raw captured stdout of the task's run. An existing task whose log
/// file is missing (not run yet, artifacts cleaned) reads as an empty
/// body; only an unknown task id is a 404.
pub async fn get_task_log(
    _operator: AuthOperator,
    State(state): State<AppState>,
    Path(task_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let log = state
        .manager
        .task_log(task_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "Task",
            id: task_id,
        })?;

    Ok(log)
}

/// GET /api/v1/tasks/{id}/trace
///
/// Raw captured stderr of the task's run. Same missing-file semantics
/// as the log endpoint.
pub async fn get_task_trace(
    _operator: AuthOperator,
    State(state): State<AppState>,
    Path(task_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let trace = state
        .manager
        .task_trace(task_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "Task",
            id: task_id,
        })?;

    Ok(trace)
}
