//! Dispatch queue: claims queued tasks and runs them on worker futures.
//!
//! A single long-lived loop acquires capacity first (worker permit, then
//! account lease) and only then claims, so a task never leaves `queued`
//! unless it can actually start. Claiming uses a single guarded UPDATE
//! via [`TaskRepo::claim_next`] to prevent double-dispatch.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use gaffer_core::artifacts;
use gaffer_core::status::{order_status_name, TaskStatus};
use gaffer_core::types::DbId;
use gaffer_db::models::task::Task;
use gaffer_db::repositories::{OrderRepo, TaskRepo};
use gaffer_db::DbPool;
use serde::Serialize;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::accounts::{AccountLease, AccountPool};
use crate::error::EngineError;
use crate::executor::Executor;

/// Error message recorded on tasks abandoned when the shutdown grace
/// period expires.
pub const DAEMON_SHUTDOWN: &str = "daemon-shutdown";

/// Tunables for the dispatch loop, wired from daemon configuration.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Upper bound on concurrently running workers (the effective bound
    /// is `min(max_concurrency, accounts in the pool)`).
    pub max_concurrency: usize,
    /// Wall-clock budget per task before it is failed and its child
    /// process killed.
    pub task_timeout: Duration,
    /// How long shutdown waits for in-flight workers before abandoning
    /// them.
    pub shutdown_grace: Duration,
    /// Idle wakeup interval; a safety net under the enqueue notify.
    pub poll_interval: Duration,
    /// Directory receiving per-task log/trace artifacts.
    pub log_dir: PathBuf,
}

/// Point-in-time queue snapshot for the status API.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub queued: i64,
    pub running: i64,
    pub max_concurrency: usize,
    pub accounts_total: usize,
    pub accounts_available: usize,
}

/// The dispatcher. One instance per daemon, shared behind `Arc`.
pub struct DispatchQueue {
    pool: DbPool,
    accounts: Arc<AccountPool>,
    executor: Arc<dyn Executor>,
    config: DispatchConfig,
    workers: Arc<Semaphore>,
    notify: Notify,
}

impl DispatchQueue {
    pub fn new(
        pool: DbPool,
        accounts: Arc<AccountPool>,
        executor: Arc<dyn Executor>,
        config: DispatchConfig,
    ) -> Self {
        let workers = Arc::new(Semaphore::new(config.max_concurrency));
        Self {
            pool,
            accounts,
            executor,
            config,
            workers,
            notify: Notify::new(),
        }
    }

    /// Move a `new` task onto the queue and nudge the loop. Returns
    /// `false` if the task was not in `new` anymore.
    pub async fn enqueue(&self, task_id: DbId) -> Result<bool, EngineError> {
        let queued = TaskRepo::mark_queued(&self.pool, task_id).await?;
        if queued {
            self.notify.notify_one();
        }
        Ok(queued)
    }

    /// Wake the loop without enqueueing anything (used after a recovery
    /// pass has put tasks back in `queued` behind the dispatcher's back).
    pub fn wake(&self) {
        self.notify.notify_one();
    }

    /// Queue snapshot for `GET /api/v1/queue`.
    pub async fn stats(&self) -> Result<QueueStats, EngineError> {
        let queued = TaskRepo::count_by_status(&self.pool, TaskStatus::Queued.id()).await?;
        let running = TaskRepo::count_by_status(&self.pool, TaskStatus::Running.id()).await?;
        Ok(QueueStats {
            queued,
            running,
            max_concurrency: self.config.max_concurrency,
            accounts_total: self.accounts.len(),
            accounts_available: self.accounts.available(),
        })
    }

    /// Run the dispatch loop until the cancellation token is triggered,
    /// then wind down in-flight workers within the grace period.
    pub async fn run(&self, cancel: CancellationToken) {
        if let Err(e) = tokio::fs::create_dir_all(&self.config.log_dir).await {
            tracing::error!(
                dir = %self.config.log_dir.display(),
                error = %e,
                "failed to create artifact directory",
            );
        }

        let tracker = TaskTracker::new();
        tracing::info!(
            max_concurrency = self.config.max_concurrency,
            accounts = self.accounts.len(),
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "dispatch queue started",
        );

        loop {
            // Capacity first: a worker slot...
            let permit = tokio::select! {
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&self.workers).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                }
            };

            // ...then an account.
            let lease = tokio::select! {
                _ = cancel.cancelled() => break,
                lease = self.accounts.lease() => match lease {
                    Ok(lease) => lease,
                    Err(e) => {
                        tracing::error!(error = %e, "account pool unavailable");
                        break;
                    }
                }
            };

            match TaskRepo::claim_next(&self.pool, lease.name()).await {
                Ok(Some(task)) => {
                    tracing::info!(
                        task_id = task.id,
                        order_id = task.order_id,
                        account = lease.name(),
                        name = %task.name,
                        "task claimed",
                    );
                    self.spawn_worker(&tracker, task, lease, permit);
                }
                Ok(None) => {
                    // Nothing queued: give the capacity back and park.
                    drop(lease);
                    drop(permit);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = self.notify.notified() => {}
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "task claim failed");
                    drop(lease);
                    drop(permit);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
            }
        }

        self.wind_down(tracker).await;
    }

    /// Wait up to the grace period for in-flight workers; whatever is
    /// still running afterwards is abandoned and its task failed. The
    /// status guard in the repo makes the race against a worker
    /// finishing at the same moment harmless.
    async fn wind_down(&self, tracker: TaskTracker) {
        tracker.close();
        if tracker.is_empty() {
            tracing::info!("dispatch queue stopped");
            return;
        }

        tracing::info!(
            in_flight = tracker.len(),
            grace_secs = self.config.shutdown_grace.as_secs(),
            "dispatch queue draining",
        );
        if tokio::time::timeout(self.config.shutdown_grace, tracker.wait())
            .await
            .is_err()
        {
            match TaskRepo::fail_all_running(&self.pool, DAEMON_SHUTDOWN).await {
                Ok(abandoned) => {
                    tracing::warn!(abandoned, "grace period expired; abandoned in-flight tasks")
                }
                Err(e) => tracing::error!(error = %e, "failed to record abandoned tasks"),
            }
        }
        tracing::info!("dispatch queue stopped");
    }

    fn spawn_worker(
        &self,
        tracker: &TaskTracker,
        task: Task,
        lease: AccountLease,
        permit: OwnedSemaphorePermit,
    ) {
        let pool = self.pool.clone();
        let executor = Arc::clone(&self.executor);
        let log_dir = self.config.log_dir.clone();
        let task_timeout = self.config.task_timeout;

        tracker.spawn(async move {
            let _permit = permit;
            if let Err(e) = run_task(&pool, executor.as_ref(), &log_dir, task_timeout, &lease, &task).await
            {
                tracing::error!(
                    task_id = task.id,
                    order_id = task.order_id,
                    error = %e,
                    "failed to record task outcome",
                );
            }
            // Lease and permit drop here, after the outcome is durable.
        });
    }
}

/// Execute one claimed task end to end: run the executor under the
/// timeout, write artifacts, record the terminal status, and close the
/// order if this was its last open task.
async fn run_task(
    pool: &DbPool,
    executor: &dyn Executor,
    log_dir: &Path,
    task_timeout: Duration,
    lease: &AccountLease,
    task: &Task,
) -> Result<(), EngineError> {
    let started = Instant::now();

    match tokio::time::timeout(task_timeout, executor.execute(lease, task)).await {
        Ok(Ok(report)) => {
            let log_path = artifacts::log_path(log_dir, task.id);
            let trace_path = artifacts::trace_path(log_dir, task.id);
            tokio::fs::write(&log_path, &report.log).await?;
            tokio::fs::write(&trace_path, &report.trace).await?;
            let log_path = log_path.to_string_lossy();
            let trace_path = trace_path.to_string_lossy();

            if report.success {
                TaskRepo::complete(pool, task.id, &log_path, &trace_path).await?;
                tracing::info!(
                    task_id = task.id,
                    order_id = task.order_id,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "task completed",
                );
            } else {
                let reason = report.failure_reason.as_deref().unwrap_or("execution failed");
                TaskRepo::fail(pool, task.id, reason, Some(&log_path), Some(&trace_path)).await?;
                tracing::warn!(
                    task_id = task.id,
                    order_id = task.order_id,
                    reason,
                    "task failed",
                );
            }
        }
        Ok(Err(e)) => {
            TaskRepo::fail(pool, task.id, &e.to_string(), None, None).await?;
            tracing::error!(
                task_id = task.id,
                order_id = task.order_id,
                error = %e,
                "executor error",
            );
        }
        Err(_elapsed) => {
            // Dropping the execute future killed the child (`kill_on_drop`).
            let reason = format!("timed out after {}ms", task_timeout.as_millis());
            TaskRepo::fail(pool, task.id, &reason, None, None).await?;
            tracing::warn!(
                task_id = task.id,
                order_id = task.order_id,
                timeout_ms = task_timeout.as_millis() as u64,
                "task timed out",
            );
        }
    }

    if let Some(final_status) = OrderRepo::close_if_complete(pool, task.order_id).await? {
        tracing::info!(
            order_id = task.order_id,
            status = order_status_name(final_status),
            "order closed",
        );
    }
    Ok(())
}
