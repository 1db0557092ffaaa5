//! Repository for the `orders` table.
//!
//! Uses the status enums from `gaffer-core` for every transition;
//! every status literal is a named constant.

use chrono::Utc;
use gaffer_core::pagination::{clamp_limit, clamp_offset};
use gaffer_core::status::{OrderStatus, StatusId, TaskStatus};
use gaffer_core::types::DbId;

use crate::models::order::{Order, OrderListQuery, SubmitOrder};
use crate::DbPool;

/// Column list for `orders` queries.
const COLUMNS: &str = "\
    id, service, status_id, payload, created_at, updated_at, closed_at";

/// Provides CRUD operations for orders.
pub struct OrderRepo;

impl OrderRepo {
    /// Persist a newly submitted order with status `new`.
    pub async fn create(pool: &DbPool, input: &SubmitOrder) -> Result<Order, sqlx::Error> {
        let now = Utc::now();
        let query = format!(
            "INSERT INTO orders (service, status_id, payload, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Order>(&query)
            .bind(&input.service)
            .bind(OrderStatus::New.id())
            .bind(&input.payload)
            .bind(now)
            .bind(now)
            .fetch_one(pool)
            .await
    }

    /// Find an order by its ID.
    pub async fn find_by_id(pool: &DbPool, id: DbId) -> Result<Option<Order>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM orders WHERE id = ?");
        sqlx::query_as::<_, Order>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List orders, newest first, with optional status/service filters.
    pub async fn list(pool: &DbPool, params: &OrderListQuery) -> Result<Vec<Order>, sqlx::Error> {
        let limit = clamp_limit(params.limit);
        let offset = clamp_offset(params.offset);

        let where_clause = Self::where_clause(params);
        let query = format!(
            "SELECT {COLUMNS} FROM orders \
             {where_clause} \
             ORDER BY created_at DESC, id DESC \
             LIMIT ? OFFSET ?"
        );

        let mut q = sqlx::query_as::<_, Order>(&query);
        if let Some(sid) = params.status_id {
            q = q.bind(sid);
        }
        if let Some(service) = &params.service {
            q = q.bind(service);
        }
        q.bind(limit).bind(offset).fetch_all(pool).await
    }

    /// Count orders matching the same filters as [`Self::list`].
    pub async fn count(pool: &DbPool, params: &OrderListQuery) -> Result<i64, sqlx::Error> {
        let where_clause = Self::where_clause(params);
        let query = format!("SELECT COUNT(*) FROM orders {where_clause}");

        let mut q = sqlx::query_as::<_, (i64,)>(&query);
        if let Some(sid) = params.status_id {
            q = q.bind(sid);
        }
        if let Some(service) = &params.service {
            q = q.bind(service);
        }
        let (count,) = q.fetch_one(pool).await?;
        Ok(count)
    }

    /// Abort an order that is still `new` (service resolution or
    /// decomposition failed before any task could run).
    ///
    /// Returns `false` if the order was not `new` anymore.
    pub async fn mark_aborted(pool: &DbPool, id: DbId) -> Result<bool, sqlx::Error> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE orders \
             SET status_id = ?, closed_at = ?, updated_at = ? \
             WHERE id = ? AND status_id = ?",
        )
        .bind(OrderStatus::Aborted.id())
        .bind(now)
        .bind(now)
        .bind(id)
        .bind(OrderStatus::New.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Close an order iff every one of its tasks is terminal.
    ///
    /// A single statement decides and applies the final status: `failed`
    /// when any task failed, `completed` otherwise. Orders with no tasks
    /// at all, already-closed orders, and orders with work still in
    /// flight are left untouched. Returns the final status when the
    /// order closed.
    pub async fn close_if_complete(
        pool: &DbPool,
        id: DbId,
    ) -> Result<Option<StatusId>, sqlx::Error> {
        let now = Utc::now();
        let row: Option<(StatusId,)> = sqlx::query_as(
            "UPDATE orders \
             SET status_id = CASE WHEN EXISTS ( \
                     SELECT 1 FROM tasks \
                     WHERE tasks.order_id = orders.id AND tasks.status_id = ? \
                 ) THEN ? ELSE ? END, \
                 closed_at = ?, \
                 updated_at = ? \
             WHERE id = ? \
               AND status_id NOT IN (?, ?, ?) \
               AND EXISTS (SELECT 1 FROM tasks WHERE tasks.order_id = orders.id) \
               AND NOT EXISTS ( \
                   SELECT 1 FROM tasks \
                   WHERE tasks.order_id = orders.id AND tasks.status_id NOT IN (?, ?) \
               ) \
             RETURNING status_id",
        )
        .bind(TaskStatus::Failed.id())
        .bind(OrderStatus::Failed.id())
        .bind(OrderStatus::Completed.id())
        .bind(now)
        .bind(now)
        .bind(id)
        .bind(OrderStatus::Completed.id())
        .bind(OrderStatus::Failed.id())
        .bind(OrderStatus::Aborted.id())
        .bind(TaskStatus::Completed.id())
        .bind(TaskStatus::Failed.id())
        .fetch_optional(pool)
        .await?;
        Ok(row.map(|(status_id,)| status_id))
    }

    /// IDs of orders that are not yet closed (startup recovery input).
    pub async fn open_order_ids(pool: &DbPool) -> Result<Vec<DbId>, sqlx::Error> {
        let rows: Vec<(DbId,)> = sqlx::query_as(
            "SELECT id FROM orders WHERE status_id NOT IN (?, ?, ?) ORDER BY id ASC",
        )
        .bind(OrderStatus::Completed.id())
        .bind(OrderStatus::Failed.id())
        .bind(OrderStatus::Aborted.id())
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Shared WHERE clause for `list` / `count`. Binds must be applied
    /// in the same order the conditions are pushed here.
    fn where_clause(params: &OrderListQuery) -> String {
        let mut conditions: Vec<&str> = Vec::new();
        if params.status_id.is_some() {
            conditions.push("status_id = ?");
        }
        if params.service.is_some() {
            conditions.push("service = ?");
        }
        if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        }
    }
}
