//! Route definitions for the `/orders` resource.
//!
//! All endpoints require authentication.

use axum::routing::get;
use axum::Router;

use crate::handlers::orders;
use crate::state::AppState;

/// Routes mounted at `/orders`.
///
/// ```text
/// GET    /                -> list_orders
/// POST   /                -> submit_order
/// GET    /count           -> count_orders
/// GET    /{id}            -> get_order
/// GET    /{id}/status     -> get_order_status
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::list_orders).post(orders::submit_order))
        .route("/count", get(orders::count_orders))
        .route("/{id}", get(orders::get_order))
        .route("/{id}/status", get(orders::get_order_status))
}
