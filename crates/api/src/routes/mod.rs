pub mod health;
pub mod orders;
pub mod tasks;

use axum::routing::get;
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /orders                 submit, list
/// /orders/count           count
/// /orders/{id}            get (derived status)
/// /orders/{id}/status     derived status name
/// /tasks                  list
/// /tasks/count            count
/// /tasks/{id}             get
/// /tasks/{id}/log         raw stdout artifact
/// /tasks/{id}/trace       raw stderr artifact
/// /queue                  dispatch stats snapshot
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Order submission and status reads.
        .nest("/orders", orders::router())
        // Task reads and artifacts.
        .nest("/tasks", tasks::router())
        // Dispatch queue snapshot.
        .route("/queue", get(handlers::queue::queue_stats))
}
