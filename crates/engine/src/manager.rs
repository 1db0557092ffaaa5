//! Order manager: the submission path and the read API over the store.
//!
//! `place_order` is the only way work enters the system; it validates,
//! persists, decomposes, and enqueues without waiting for execution.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use gaffer_core::artifacts;
use gaffer_core::status::{derive_order_status, StatusId};
use gaffer_core::types::DbId;
use gaffer_core::validation::{validate_order_payload, validate_service_name};
use gaffer_db::models::order::{Order, OrderListQuery, SubmitOrder};
use gaffer_db::models::task::{Task, TaskListQuery};
use gaffer_db::repositories::recovery::{close_open_orders, RecoveryPolicy, RecoveryReport};
use gaffer_db::repositories::{OrderRepo, TaskRepo};
use gaffer_db::DbPool;

use crate::dispatcher::DispatchQueue;
use crate::error::EngineError;
use crate::service::ServiceRegistry;

pub struct OrderManager {
    pool: DbPool,
    registry: Arc<ServiceRegistry>,
    queue: Arc<DispatchQueue>,
    recovery_policy: RecoveryPolicy,
    log_dir: PathBuf,
}

impl OrderManager {
    pub fn new(
        pool: DbPool,
        registry: Arc<ServiceRegistry>,
        queue: Arc<DispatchQueue>,
        recovery_policy: RecoveryPolicy,
        log_dir: PathBuf,
    ) -> Self {
        Self {
            pool,
            registry,
            queue,
            recovery_policy,
            log_dir,
        }
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    /// Accept an order: validate, persist, decompose into tasks, enqueue.
    ///
    /// Returns the order id as soon as the tasks are queued; execution
    /// happens in the background. Validation failures reject before
    /// anything is persisted; a service that cannot be resolved or that
    /// fails to decompose aborts the already-persisted order.
    pub async fn place_order(&self, input: SubmitOrder) -> Result<DbId, EngineError> {
        validate_service_name(&input.service)?;
        validate_order_payload(&input.payload)?;

        let order = OrderRepo::create(&self.pool, &input).await?;
        tracing::info!(order_id = order.id, service = %order.service, "order accepted");

        let service = match self.registry.resolve(&order.service) {
            Ok(service) => service,
            Err(e) => return self.abort_order(order.id, e).await,
        };

        let specs = match service.decompose(&order).await {
            Ok(specs) if specs.is_empty() => {
                let cause =
                    EngineError::Decomposition("service produced no tasks".to_string());
                return self.abort_order(order.id, cause).await;
            }
            Ok(specs) => specs,
            Err(e) => return self.abort_order(order.id, e).await,
        };

        let tasks = TaskRepo::create_for_order(&self.pool, order.id, &specs).await?;
        for task in &tasks {
            self.queue.enqueue(task.id).await?;
        }
        tracing::info!(
            order_id = order.id,
            tasks = tasks.len(),
            "order decomposed and queued",
        );
        Ok(order.id)
    }

    async fn abort_order(&self, order_id: DbId, cause: EngineError) -> Result<DbId, EngineError> {
        tracing::warn!(order_id, error = %cause, "aborting order");
        if let Err(e) = OrderRepo::mark_aborted(&self.pool, order_id).await {
            tracing::error!(order_id, error = %e, "failed to mark order aborted");
        }
        Err(cause)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// An order plus its effective (task-derived) status.
    pub async fn order_with_status(
        &self,
        id: DbId,
    ) -> Result<Option<(Order, StatusId)>, EngineError> {
        let Some(order) = OrderRepo::find_by_id(&self.pool, id).await? else {
            return Ok(None);
        };
        let statuses = TaskRepo::statuses_for_order(&self.pool, id).await?;
        let derived = derive_order_status(order.status_id, &statuses);
        Ok(Some((order, derived)))
    }

    /// Orders with derived statuses, one status query for the whole page.
    pub async fn list_orders(
        &self,
        params: &OrderListQuery,
    ) -> Result<Vec<(Order, StatusId)>, EngineError> {
        let orders = OrderRepo::list(&self.pool, params).await?;
        let ids: Vec<DbId> = orders.iter().map(|order| order.id).collect();
        let mut statuses = TaskRepo::statuses_for_orders(&self.pool, &ids).await?;

        Ok(orders
            .into_iter()
            .map(|order| {
                let task_statuses = statuses.remove(&order.id).unwrap_or_default();
                let derived = derive_order_status(order.status_id, &task_statuses);
                (order, derived)
            })
            .collect())
    }

    pub async fn count_orders(&self, params: &OrderListQuery) -> Result<i64, EngineError> {
        Ok(OrderRepo::count(&self.pool, params).await?)
    }

    pub async fn get_task(&self, id: DbId) -> Result<Option<Task>, EngineError> {
        Ok(TaskRepo::find_by_id(&self.pool, id).await?)
    }

    pub async fn list_tasks(&self, params: &TaskListQuery) -> Result<Vec<Task>, EngineError> {
        Ok(TaskRepo::list(&self.pool, params).await?)
    }

    pub async fn count_tasks(&self, params: &TaskListQuery) -> Result<i64, EngineError> {
        Ok(TaskRepo::count(&self.pool, params).await?)
    }

    /// Log artifact for a task: file content, or an empty string when
    /// nothing has been written yet. `None` means the task id itself is
    /// unknown.
    pub async fn task_log(&self, task_id: DbId) -> Result<Option<String>, EngineError> {
        let Some(task) = TaskRepo::find_by_id(&self.pool, task_id).await? else {
            return Ok(None);
        };
        let path = match &task.log_path {
            Some(path) => PathBuf::from(path),
            None => artifacts::log_path(&self.log_dir, task.id),
        };
        Ok(Some(read_artifact(&path).await?))
    }

    /// Trace artifact for a task; same semantics as [`Self::task_log`].
    pub async fn task_trace(&self, task_id: DbId) -> Result<Option<String>, EngineError> {
        let Some(task) = TaskRepo::find_by_id(&self.pool, task_id).await? else {
            return Ok(None);
        };
        let path = match &task.trace_path {
            Some(path) => PathBuf::from(path),
            None => artifacts::trace_path(&self.log_dir, task.id),
        };
        Ok(Some(read_artifact(&path).await?))
    }

    // -----------------------------------------------------------------------
    // Recovery
    // -----------------------------------------------------------------------

    /// Resolve crash evidence left from a previous run. Called once at
    /// startup, before the API starts accepting orders.
    pub async fn recover(&self) -> Result<RecoveryReport, EngineError> {
        let report = close_open_orders(&self.pool, self.recovery_policy).await?;
        if report.requeued > 0 {
            self.queue.wake();
        }
        Ok(report)
    }
}

/// Read an artifact file, treating a missing file as empty content: a
/// task that has not produced output yet simply has nothing to show.
async fn read_artifact(path: &Path) -> Result<String, EngineError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(EngineError::Artifact(e)),
    }
}
