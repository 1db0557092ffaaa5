//! Startup recovery over whatever a crash or hard kill left behind.
//!
//! Runs once before the dispatcher starts claiming, so there is exactly
//! one writer and every orphaned row gets a deterministic outcome.

use std::str::FromStr;

use chrono::Utc;
use gaffer_core::status::TaskStatus;

use crate::models::task::TaskListQuery;
use crate::repositories::order_repo::OrderRepo;
use crate::repositories::task_repo::TaskRepo;
use crate::DbPool;

/// Error message recorded on tasks orphaned by a restart under
/// [`RecoveryPolicy::Fail`].
pub const ORPHANED_ON_RESTART: &str = "orphaned-on-restart";

/// What to do with tasks found `running` at startup. A restart cannot
/// resume a half-executed command, so the choice is re-dispatch from
/// scratch or give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecoveryPolicy {
    /// Put orphaned tasks back on the queue. Assumes task payloads are
    /// safe to re-run.
    #[default]
    Requeue,
    /// Mark orphaned tasks failed; their orders close as failed.
    Fail,
}

impl FromStr for RecoveryPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requeue" => Ok(Self::Requeue),
            "fail" => Ok(Self::Fail),
            other => Err(format!(
                "unknown recovery policy {other:?} (expected \"requeue\" or \"fail\")"
            )),
        }
    }
}

/// Outcome of one recovery pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Tasks put (back) on the queue: orphaned `running` tasks under the
    /// requeue policy plus `new` tasks that never got enqueued.
    pub requeued: u64,
    /// Tasks marked failed under the fail policy.
    pub failed: u64,
    /// Orders that reached a terminal status during the pass.
    pub orders_closed: u64,
}

/// Resolve every open order against the crash evidence in the store.
///
/// Three steps, each idempotent:
/// 1. orphaned `running` tasks are requeued or failed per `policy`;
/// 2. `new` tasks that were persisted but never enqueued are queued;
/// 3. open orders with no remaining work are closed, and open orders
///    that never got any tasks at all are aborted.
pub async fn close_open_orders(
    pool: &DbPool,
    policy: RecoveryPolicy,
) -> Result<RecoveryReport, sqlx::Error> {
    let mut report = RecoveryReport::default();

    match policy {
        RecoveryPolicy::Requeue => {
            report.requeued += requeue_running(pool).await?;
        }
        RecoveryPolicy::Fail => {
            report.failed += fail_running(pool).await?;
        }
    }

    report.requeued += queue_stale_new(pool).await?;

    for order_id in OrderRepo::open_order_ids(pool).await? {
        if OrderRepo::close_if_complete(pool, order_id).await?.is_some() {
            report.orders_closed += 1;
            continue;
        }
        let task_query = TaskListQuery {
            order_id: Some(order_id),
            ..Default::default()
        };
        if TaskRepo::count(pool, &task_query).await? == 0
            && OrderRepo::mark_aborted(pool, order_id).await?
        {
            tracing::warn!(order_id, "aborting order with no persisted tasks");
            report.orders_closed += 1;
        }
    }

    tracing::info!(
        requeued = report.requeued,
        failed = report.failed,
        orders_closed = report.orders_closed,
        policy = ?policy,
        "startup recovery pass finished"
    );
    Ok(report)
}

/// `running -> queued`, clearing the stale claim fields.
async fn requeue_running(pool: &DbPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE tasks \
         SET status_id = ?, account_used = NULL, started_at = NULL, updated_at = ? \
         WHERE status_id = ?",
    )
    .bind(TaskStatus::Queued.id())
    .bind(Utc::now())
    .bind(TaskStatus::Running.id())
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// `running -> failed` with [`ORPHANED_ON_RESTART`] recorded.
async fn fail_running(pool: &DbPool) -> Result<u64, sqlx::Error> {
    TaskRepo::fail_all_running(pool, ORPHANED_ON_RESTART).await
}

/// `new -> queued` for tasks persisted by a submission that crashed
/// before enqueueing them.
async fn queue_stale_new(pool: &DbPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE tasks SET status_id = ?, updated_at = ? WHERE status_id = ?",
    )
    .bind(TaskStatus::Queued.id())
    .bind(Utc::now())
    .bind(TaskStatus::New.id())
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
