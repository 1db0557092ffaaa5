//! Handlers for the `/orders` resource.
//!
//! All endpoints require authentication via [`AuthOperator`]. Order reads
//! report the *derived* status: the stored row only moves when an order
//! is closed, but clients should see `in_progress` the moment work is in
//! flight.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use gaffer_core::error::CoreError;
use gaffer_core::status::{order_status_name, StatusId};
use gaffer_core::types::{DbId, Timestamp};
use gaffer_db::models::order::{Order, OrderListQuery, SubmitOrder};
use serde::Serialize;

use crate::auth::AuthOperator;
use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

/// An order as the API reports it: the status fields carry the derived
/// status, not the stored one.
#[derive(Debug, Serialize)]
pub struct OrderView {
    pub id: DbId,
    pub service: String,
    pub status_id: StatusId,
    pub status: &'static str,
    pub payload: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub closed_at: Option<Timestamp>,
}

impl OrderView {
    fn from_parts(order: Order, derived: StatusId) -> Self {
        Self {
            id: order.id,
            service: order.service,
            status_id: derived,
            status: order_status_name(derived),
            payload: order.payload,
            created_at: order.created_at,
            updated_at: order.updated_at,
            closed_at: order.closed_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/orders
///
/// Submit a new order. Returns 201 with the order id as plain text; the
/// tasks are queued before the response is sent, execution happens in
/// the background. An unresolvable or undecomposable order is aborted
/// and reported as 400.
pub async fn submit_order(
    operator: AuthOperator,
    State(state): State<AppState>,
    Json(input): Json<SubmitOrder>,
) -> AppResult<impl IntoResponse> {
    let service = input.service.clone();
    let order_id = state.manager.place_order(input).await?;

    tracing::info!(
        order_id,
        service = %service,
        operator = %operator.name,
        "Order submitted",
    );

    Ok((StatusCode::CREATED, order_id.to_string()))
}

// ---------------------------------------------------------------------------
// List / count
// ---------------------------------------------------------------------------

/// GET /api/v1/orders
///
/// List orders, newest first. Supports optional `status_id`, `service`,
/// `limit`, and `offset` query parameters; `limit` is clamped to 100.
pub async fn list_orders(
    _operator: AuthOperator,
    State(state): State<AppState>,
    Query(params): Query<OrderListQuery>,
) -> AppResult<impl IntoResponse> {
    let orders = state.manager.list_orders(&params).await?;
    let views: Vec<OrderView> = orders
        .into_iter()
        .map(|(order, derived)| OrderView::from_parts(order, derived))
        .collect();

    Ok(Json(DataResponse { data: views }))
}

/// GET /api/v1/orders/count
///
/// Count orders matching the same filters as the list endpoint.
pub async fn count_orders(
    _operator: AuthOperator,
    State(state): State<AppState>,
    Query(params): Query<OrderListQuery>,
) -> AppResult<impl IntoResponse> {
    let count = state.manager.count_orders(&params).await?;
    Ok(Json(DataResponse { data: count }))
}

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

/// GET /api/v1/orders/{id}
///
/// Get a single order with its derived status. Returns 404 for an
/// unknown id.
pub async fn get_order(
    _operator: AuthOperator,
    State(state): State<AppState>,
    Path(order_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let (order, derived) = state
        .manager
        .order_with_status(order_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "Order",
            id: order_id,
        })?;

    Ok(Json(OrderView::from_parts(order, derived)))
}

/// GET /api/v1/orders/{id}/status
///
/// Get just the derived status name of an order.
pub async fn get_order_status(
    _operator: AuthOperator,
    State(state): State<AppState>,
    Path(order_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let (_, derived) = state
        .manager
        .order_with_status(order_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "Order",
            id: order_id,
        })?;

    Ok(Json(DataResponse {
        data: order_status_name(derived),
    }))
}
