//! HTTP-level integration tests for the `/tasks` resource, including the
//! log/trace artifact endpoints.

mod common;

use axum::http::StatusCode;
use common::{body_json, body_text, get_auth, post_json_auth};
use gaffer_core::status::TaskStatus;
use gaffer_db::repositories::TaskRepo;
use serde_json::json;
use sqlx::SqlitePool;

/// Submit a hostlist order through the API and return its id.
async fn submit(pool: &SqlitePool, hosts: &[&str]) -> i64 {
    let app = common::build_test_app(pool.clone());
    let body = json!({ "service": "hostlist", "payload": { "hosts": hosts } });
    let response = post_json_auth(app, "/api/v1/orders", body).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_text(response).await.parse().expect("plain-text order id")
}

// ---------------------------------------------------------------------------
// List / count / get
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn list_scopes_to_order(pool: SqlitePool) {
    let first = submit(&pool, &["h1", "h2"]).await;
    let second = submit(&pool, &["h3"]).await;

    let app = common::build_test_app(pool.clone());
    let response = get_auth(app, &format!("/api/v1/tasks?order_id={first}")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let data = json["data"].as_array().expect("data must be an array");
    assert_eq!(data.len(), 2);
    for task in data {
        assert_eq!(task["order_id"], first);
        assert_eq!(task["status_id"], TaskStatus::Queued.id());
    }

    let app = common::build_test_app(pool.clone());
    let response = get_auth(app, &format!("/api/v1/tasks?order_id={second}")).await;
    let json = body_json(response).await;
    assert_eq!(json["data"].as_array().unwrap().len(), 1);
    assert_eq!(json["data"][0]["name"], "h3");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn count_matches_decomposition(pool: SqlitePool) {
    let order_id = submit(&pool, &["h1", "h2", "h3"]).await;

    let app = common::build_test_app(pool.clone());
    let response = get_auth(app, &format!("/api/v1/tasks/count?order_id={order_id}")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["data"], 3);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn list_filters_by_status(pool: SqlitePool) {
    let order_id = submit(&pool, &["h1", "h2"]).await;

    // Claim one task so the two rows diverge in status.
    let claimed = TaskRepo::claim_next(&pool, "device-0").await.unwrap().unwrap();

    let app = common::build_test_app(pool.clone());
    let path = format!(
        "/api/v1/tasks?order_id={order_id}&status_id={}",
        TaskStatus::Running.id()
    );
    let response = get_auth(app, &path).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let data = json["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["id"], claimed.id);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn unknown_status_filter_is_rejected(pool: SqlitePool) {
    let app = common::build_test_app(pool.clone());
    let response = get_auth(app, "/api/v1/tasks?status_id=99").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn get_task_returns_row(pool: SqlitePool) {
    let order_id = submit(&pool, &["h1"]).await;
    let tasks = TaskRepo::list(
        &pool,
        &gaffer_db::models::task::TaskListQuery {
            order_id: Some(order_id),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let app = common::build_test_app(pool.clone());
    let response = get_auth(app, &format!("/api/v1/tasks/{}", tasks[0].id)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["data"]["name"], "h1");
    assert_eq!(json["data"]["payload"]["host"], "h1");
    assert!(json["data"]["account_used"].is_null());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn get_unknown_task_returns_404(pool: SqlitePool) {
    let app = common::build_test_app(pool.clone());
    let response = get_auth(app, "/api/v1/tasks/424242").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["code"], "NOT_FOUND");
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn artifacts_read_empty_before_the_task_runs(pool: SqlitePool) {
    let order_id = submit(&pool, &["h1"]).await;
    let tasks = TaskRepo::list(
        &pool,
        &gaffer_db::models::task::TaskListQuery {
            order_id: Some(order_id),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let app = common::build_test_app(pool.clone());
    let response = get_auth(app, &format!("/api/v1/tasks/{}/log", tasks[0].id)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "");

    let app = common::build_test_app(pool.clone());
    let response = get_auth(app, &format!("/api/v1/tasks/{}/trace", tasks[0].id)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn artifacts_serve_recorded_files(pool: SqlitePool) {
    submit(&pool, &["h1"]).await;

    // Drive the task to completion by hand, recording artifacts the way
    // a worker would.
    let task = TaskRepo::claim_next(&pool, "device-0").await.unwrap().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join(format!("{}.log", task.id));
    let trace_path = dir.path().join(format!("{}.trace", task.id));
    std::fs::write(&log_path, "configured h1\n").unwrap();
    std::fs::write(&trace_path, "warning: slow link\n").unwrap();

    let completed = TaskRepo::complete(
        &pool,
        task.id,
        &log_path.to_string_lossy(),
        &trace_path.to_string_lossy(),
    )
    .await
    .unwrap();
    assert!(completed);

    let app = common::build_test_app(pool.clone());
    let response = get_auth(app, &format!("/api/v1/tasks/{}/log", task.id)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "configured h1\n");

    let app = common::build_test_app(pool.clone());
    let response = get_auth(app, &format!("/api/v1/tasks/{}/trace", task.id)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "warning: slow link\n");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn artifact_endpoints_404_on_unknown_task(pool: SqlitePool) {
    let app = common::build_test_app(pool.clone());
    let response = get_auth(app, "/api/v1/tasks/424242/log").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let app = common::build_test_app(pool.clone());
    let response = get_auth(app, "/api/v1/tasks/424242/trace").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Queue snapshot
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn queue_endpoint_reports_depth_and_capacity(pool: SqlitePool) {
    submit(&pool, &["h1", "h2", "h3"]).await;

    let app = common::build_test_app(pool.clone());
    let response = get_auth(app, "/api/v1/queue").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["data"]["queued"], 3);
    assert_eq!(json["data"]["running"], 0);
    assert_eq!(json["data"]["max_concurrency"], 4);
    assert_eq!(json["data"]["accounts_total"], 2);
    assert_eq!(json["data"]["accounts_available"], 2);
}
