//! Startup recovery: every orphaned row gets a deterministic outcome.

use gaffer_core::status::{OrderStatus, TaskStatus};
use gaffer_db::models::order::SubmitOrder;
use gaffer_db::models::task::TaskSpec;
use gaffer_db::repositories::recovery::{
    close_open_orders, RecoveryPolicy, RecoveryReport, ORPHANED_ON_RESTART,
};
use gaffer_db::repositories::{OrderRepo, TaskRepo};
use serde_json::json;
use sqlx::SqlitePool;

/// An order with one task left `running`, as a crash would leave it.
async fn orphaned_running_order(pool: &SqlitePool) -> (i64, i64) {
    let order = OrderRepo::create(
        pool,
        &SubmitOrder {
            service: "hostlist".to_string(),
            payload: json!({}),
        },
    )
    .await
    .unwrap();
    let tasks = TaskRepo::create_for_order(
        pool,
        order.id,
        &[TaskSpec { name: "host-a".into(), payload: json!({}) }],
    )
    .await
    .unwrap();
    TaskRepo::mark_queued(pool, tasks[0].id).await.unwrap();
    TaskRepo::claim_next(pool, "acct-a").await.unwrap().unwrap();
    (order.id, tasks[0].id)
}

#[sqlx::test(migrations = "./migrations")]
async fn requeue_policy_puts_running_tasks_back(pool: SqlitePool) {
    let (order_id, task_id) = orphaned_running_order(&pool).await;

    let report = close_open_orders(&pool, RecoveryPolicy::Requeue).await.unwrap();
    assert_eq!(
        report,
        RecoveryReport { requeued: 1, failed: 0, orders_closed: 0 }
    );

    let task = TaskRepo::find_by_id(&pool, task_id).await.unwrap().unwrap();
    assert_eq!(task.status_id, TaskStatus::Queued.id());
    // Stale claim fields are cleared for the fresh run.
    assert!(task.account_used.is_none());
    assert!(task.started_at.is_none());

    // Order stays open, waiting for the re-dispatch.
    let order = OrderRepo::find_by_id(&pool, order_id).await.unwrap().unwrap();
    assert!(order.closed_at.is_none());
}

#[sqlx::test(migrations = "./migrations")]
async fn fail_policy_fails_running_tasks_and_closes_orders(pool: SqlitePool) {
    let (order_id, task_id) = orphaned_running_order(&pool).await;

    let report = close_open_orders(&pool, RecoveryPolicy::Fail).await.unwrap();
    assert_eq!(
        report,
        RecoveryReport { requeued: 0, failed: 1, orders_closed: 1 }
    );

    let task = TaskRepo::find_by_id(&pool, task_id).await.unwrap().unwrap();
    assert_eq!(task.status_id, TaskStatus::Failed.id());
    assert_eq!(task.error_message.as_deref(), Some(ORPHANED_ON_RESTART));

    let order = OrderRepo::find_by_id(&pool, order_id).await.unwrap().unwrap();
    assert_eq!(order.status_id, OrderStatus::Failed.id());
    assert!(order.closed_at.is_some());
}

#[sqlx::test(migrations = "./migrations")]
async fn stale_new_tasks_are_queued_under_both_policies(pool: SqlitePool) {
    let order = OrderRepo::create(
        &pool,
        &SubmitOrder {
            service: "hostlist".to_string(),
            payload: json!({}),
        },
    )
    .await
    .unwrap();
    // Persisted but the daemon died before enqueueing them.
    let tasks = TaskRepo::create_for_order(
        &pool,
        order.id,
        &[
            TaskSpec { name: "a".into(), payload: json!({}) },
            TaskSpec { name: "b".into(), payload: json!({}) },
        ],
    )
    .await
    .unwrap();

    let report = close_open_orders(&pool, RecoveryPolicy::Fail).await.unwrap();
    assert_eq!(report.requeued, 2);
    assert_eq!(report.failed, 0);

    for task in &tasks {
        let row = TaskRepo::find_by_id(&pool, task.id).await.unwrap().unwrap();
        assert_eq!(row.status_id, TaskStatus::Queued.id());
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn order_without_tasks_is_aborted(pool: SqlitePool) {
    let order = OrderRepo::create(
        &pool,
        &SubmitOrder {
            service: "hostlist".to_string(),
            payload: json!({}),
        },
    )
    .await
    .unwrap();

    let report = close_open_orders(&pool, RecoveryPolicy::Requeue).await.unwrap();
    assert_eq!(report.orders_closed, 1);

    let row = OrderRepo::find_by_id(&pool, order.id).await.unwrap().unwrap();
    assert_eq!(row.status_id, OrderStatus::Aborted.id());
}

#[sqlx::test(migrations = "./migrations")]
async fn finished_work_closes_during_recovery(pool: SqlitePool) {
    // All tasks terminal but the close never ran (crash between the last
    // task finishing and the order closing).
    let order = OrderRepo::create(
        &pool,
        &SubmitOrder {
            service: "hostlist".to_string(),
            payload: json!({}),
        },
    )
    .await
    .unwrap();
    let tasks = TaskRepo::create_for_order(
        &pool,
        order.id,
        &[TaskSpec { name: "a".into(), payload: json!({}) }],
    )
    .await
    .unwrap();
    TaskRepo::mark_queued(&pool, tasks[0].id).await.unwrap();
    TaskRepo::claim_next(&pool, "acct-a").await.unwrap().unwrap();
    TaskRepo::complete(&pool, tasks[0].id, "1.log", "1.trace").await.unwrap();

    let report = close_open_orders(&pool, RecoveryPolicy::Requeue).await.unwrap();
    assert_eq!(report.orders_closed, 1);

    let row = OrderRepo::find_by_id(&pool, order.id).await.unwrap().unwrap();
    assert_eq!(row.status_id, OrderStatus::Completed.id());
}

#[sqlx::test(migrations = "./migrations")]
async fn recovery_is_idempotent(pool: SqlitePool) {
    orphaned_running_order(&pool).await;

    close_open_orders(&pool, RecoveryPolicy::Requeue).await.unwrap();
    let second = close_open_orders(&pool, RecoveryPolicy::Requeue).await.unwrap();

    // Queued tasks are not crash evidence; nothing left to resolve.
    assert_eq!(
        second,
        RecoveryReport { requeued: 0, failed: 0, orders_closed: 0 }
    );
}

#[sqlx::test(migrations = "./migrations")]
async fn recovery_on_empty_store_reports_zeroes(pool: SqlitePool) {
    let report = close_open_orders(&pool, RecoveryPolicy::Requeue).await.unwrap();
    assert_eq!(report, RecoveryReport::default());
}
