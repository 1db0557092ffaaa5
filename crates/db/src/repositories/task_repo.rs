//! Repository for the `tasks` table.
//!
//! The dispatcher is the only writer after creation: claim, complete,
//! fail. Every transition is guarded by the expected current status in
//! the WHERE clause, so a lost race updates zero rows instead of
//! clobbering a newer state.

use chrono::Utc;
use gaffer_core::pagination::{clamp_limit, clamp_offset};
use gaffer_core::status::{StatusId, TaskStatus};
use gaffer_core::types::DbId;

use crate::models::task::{Task, TaskListQuery, TaskSpec};
use crate::DbPool;

/// Column list for `tasks` queries.
const COLUMNS: &str = "\
    id, order_id, name, status_id, payload, account_used, error_message, \
    log_path, trace_path, created_at, updated_at, started_at, finished_at";

/// Provides CRUD operations for tasks.
pub struct TaskRepo;

impl TaskRepo {
    /// Insert all tasks for an order in one transaction with status `new`.
    ///
    /// All-or-nothing: a failed insert rolls the batch back so the order
    /// can be aborted cleanly instead of half-decomposed.
    pub async fn create_for_order(
        pool: &DbPool,
        order_id: DbId,
        specs: &[TaskSpec],
    ) -> Result<Vec<Task>, sqlx::Error> {
        let now = Utc::now();
        let query = format!(
            "INSERT INTO tasks (order_id, name, status_id, payload, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?) \
             RETURNING {COLUMNS}"
        );

        let mut tx = pool.begin().await?;
        let mut tasks = Vec::with_capacity(specs.len());
        for spec in specs {
            let task = sqlx::query_as::<_, Task>(&query)
                .bind(order_id)
                .bind(&spec.name)
                .bind(TaskStatus::New.id())
                .bind(&spec.payload)
                .bind(now)
                .bind(now)
                .fetch_one(&mut *tx)
                .await?;
            tasks.push(task);
        }
        tx.commit().await?;
        Ok(tasks)
    }

    /// Find a task by its ID.
    pub async fn find_by_id(pool: &DbPool, id: DbId) -> Result<Option<Task>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tasks WHERE id = ?");
        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List tasks in creation order with optional order/status filters.
    pub async fn list(pool: &DbPool, params: &TaskListQuery) -> Result<Vec<Task>, sqlx::Error> {
        let limit = clamp_limit(params.limit);
        let offset = clamp_offset(params.offset);

        let where_clause = Self::where_clause(params);
        let query = format!(
            "SELECT {COLUMNS} FROM tasks \
             {where_clause} \
             ORDER BY id ASC \
             LIMIT ? OFFSET ?"
        );

        let mut q = sqlx::query_as::<_, Task>(&query);
        if let Some(order_id) = params.order_id {
            q = q.bind(order_id);
        }
        if let Some(sid) = params.status_id {
            q = q.bind(sid);
        }
        q.bind(limit).bind(offset).fetch_all(pool).await
    }

    /// Count tasks matching the same filters as [`Self::list`].
    pub async fn count(pool: &DbPool, params: &TaskListQuery) -> Result<i64, sqlx::Error> {
        let where_clause = Self::where_clause(params);
        let query = format!("SELECT COUNT(*) FROM tasks {where_clause}");

        let mut q = sqlx::query_as::<_, (i64,)>(&query);
        if let Some(order_id) = params.order_id {
            q = q.bind(order_id);
        }
        if let Some(sid) = params.status_id {
            q = q.bind(sid);
        }
        let (count,) = q.fetch_one(pool).await?;
        Ok(count)
    }

    /// Move a `new` task onto the queue. Returns `false` if the task
    /// already left `new` (e.g. a concurrent recovery pass got there
    /// first).
    pub async fn mark_queued(pool: &DbPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tasks SET status_id = ?, updated_at = ? WHERE id = ? AND status_id = ?",
        )
        .bind(TaskStatus::Queued.id())
        .bind(Utc::now())
        .bind(id)
        .bind(TaskStatus::New.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Atomically claim the oldest `queued` task for execution.
    ///
    /// Single statement: SQLite serializes writers, so the inner SELECT
    /// and the UPDATE cannot interleave with another claimer. The task
    /// comes back already marked `running` with the leased account and
    /// `started_at` recorded.
    pub async fn claim_next(pool: &DbPool, account: &str) -> Result<Option<Task>, sqlx::Error> {
        let now = Utc::now();
        let query = format!(
            "UPDATE tasks \
             SET status_id = ?, account_used = ?, started_at = ?, updated_at = ? \
             WHERE id = ( \
                 SELECT id FROM tasks \
                 WHERE status_id = ? \
                 ORDER BY id ASC \
                 LIMIT 1 \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(TaskStatus::Running.id())
            .bind(account)
            .bind(now)
            .bind(now)
            .bind(TaskStatus::Queued.id())
            .fetch_optional(pool)
            .await
    }

    /// Mark a `running` task completed and record its artifact paths.
    pub async fn complete(
        pool: &DbPool,
        id: DbId,
        log_path: &str,
        trace_path: &str,
    ) -> Result<bool, sqlx::Error> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE tasks \
             SET status_id = ?, log_path = ?, trace_path = ?, \
                 finished_at = ?, updated_at = ? \
             WHERE id = ? AND status_id = ?",
        )
        .bind(TaskStatus::Completed.id())
        .bind(log_path)
        .bind(trace_path)
        .bind(now)
        .bind(now)
        .bind(id)
        .bind(TaskStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark a `running` task failed with an error message. Artifact
    /// paths are optional because execution may have died before any
    /// output was captured.
    pub async fn fail(
        pool: &DbPool,
        id: DbId,
        error: &str,
        log_path: Option<&str>,
        trace_path: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE tasks \
             SET status_id = ?, error_message = ?, log_path = ?, trace_path = ?, \
                 finished_at = ?, updated_at = ? \
             WHERE id = ? AND status_id = ?",
        )
        .bind(TaskStatus::Failed.id())
        .bind(error)
        .bind(log_path)
        .bind(trace_path)
        .bind(now)
        .bind(now)
        .bind(id)
        .bind(TaskStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Fail every `running` task in one statement, recording `error`.
    ///
    /// Used for the shutdown grace deadline and for the fail recovery
    /// policy. The status guard makes this race-safe against workers
    /// finishing concurrently: whoever transitions first wins, the
    /// loser updates zero rows.
    pub async fn fail_all_running(pool: &DbPool, error: &str) -> Result<u64, sqlx::Error> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE tasks \
             SET status_id = ?, error_message = ?, finished_at = ?, updated_at = ? \
             WHERE status_id = ?",
        )
        .bind(TaskStatus::Failed.id())
        .bind(error)
        .bind(now)
        .bind(now)
        .bind(TaskStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Status of every task belonging to an order, for read-time status
    /// derivation.
    pub async fn statuses_for_order(
        pool: &DbPool,
        order_id: DbId,
    ) -> Result<Vec<StatusId>, sqlx::Error> {
        let rows: Vec<(StatusId,)> =
            sqlx::query_as("SELECT status_id FROM tasks WHERE order_id = ?")
                .bind(order_id)
                .fetch_all(pool)
                .await?;
        Ok(rows.into_iter().map(|(status_id,)| status_id).collect())
    }

    /// Task statuses grouped by order for a batch of orders, so listing
    /// endpoints can derive statuses without one query per row.
    pub async fn statuses_for_orders(
        pool: &DbPool,
        order_ids: &[DbId],
    ) -> Result<std::collections::HashMap<DbId, Vec<StatusId>>, sqlx::Error> {
        if order_ids.is_empty() {
            return Ok(std::collections::HashMap::new());
        }
        let placeholders = vec!["?"; order_ids.len()].join(", ");
        let query =
            format!("SELECT order_id, status_id FROM tasks WHERE order_id IN ({placeholders})");

        let mut q = sqlx::query_as::<_, (DbId, StatusId)>(&query);
        for id in order_ids {
            q = q.bind(id);
        }
        let rows = q.fetch_all(pool).await?;

        let mut by_order: std::collections::HashMap<DbId, Vec<StatusId>> =
            std::collections::HashMap::new();
        for (order_id, status_id) in rows {
            by_order.entry(order_id).or_default().push(status_id);
        }
        Ok(by_order)
    }

    /// Number of tasks currently in a given status (queue gauge input).
    pub async fn count_by_status(pool: &DbPool, status: StatusId) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM tasks WHERE status_id = ?")
                .bind(status)
                .fetch_one(pool)
                .await?;
        Ok(count)
    }

    /// Shared WHERE clause for `list` / `count`. Binds must be applied
    /// in the same order the conditions are pushed here.
    fn where_clause(params: &TaskListQuery) -> String {
        let mut conditions: Vec<&str> = Vec::new();
        if params.order_id.is_some() {
            conditions.push("order_id = ?");
        }
        if params.status_id.is_some() {
            conditions.push("status_id = ?");
        }
        if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        }
    }
}
