//! Handler for the dispatch queue snapshot.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::auth::AuthOperator;
use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/queue
///
/// Point-in-time dispatch stats: queue depth, running tasks, worker
/// slots, and account pool occupancy.
pub async fn queue_stats(
    _operator: AuthOperator,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let stats = state.queue.stats().await?;
    Ok(Json(DataResponse { data: stats }))
}
