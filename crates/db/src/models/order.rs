//! Order entity model and DTOs.

use gaffer_core::status::StatusId;
use gaffer_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `orders` table.
///
/// `status_id` is the *stored* status; while tasks are in flight the
/// effective status is derived from them at read time.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Order {
    pub id: DbId,
    pub service: String,
    pub status_id: StatusId,
    pub payload: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub closed_at: Option<Timestamp>,
}

/// DTO for submitting a new order via `POST /api/v1/orders`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitOrder {
    /// Name of the service that will decompose this order.
    pub service: String,
    /// Service-specific payload; must be a JSON object.
    pub payload: serde_json::Value,
}

/// Query parameters for `GET /api/v1/orders` and `/orders/count`.
#[derive(Debug, Default, Deserialize)]
pub struct OrderListQuery {
    /// Filter by status ID (e.g. 2 = in_progress, 4 = failed).
    pub status_id: Option<StatusId>,
    /// Filter by service name.
    pub service: Option<String>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}
