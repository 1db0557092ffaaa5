//! Route definitions for the `/tasks` resource.
//!
//! All endpoints require authentication.

use axum::routing::get;
use axum::Router;

use crate::handlers::tasks;
use crate::state::AppState;

/// Routes mounted at `/tasks`.
///
/// ```text
/// GET    /                -> list_tasks
/// GET    /count           -> count_tasks
/// GET    /{id}            -> get_task
/// GET    /{id}/log        -> get_task_log
/// GET    /{id}/trace      -> get_task_trace
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(tasks::list_tasks))
        .route("/count", get(tasks::count_tasks))
        .route("/{id}", get(tasks::get_task))
        .route("/{id}/log", get(tasks::get_task_log))
        .route("/{id}/trace", get(tasks::get_task_trace))
}
