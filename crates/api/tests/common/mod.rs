use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::Request;
use axum::response::Response;
use axum::Router;
use base64::Engine;
use http_body_util::BodyExt;
use sqlx::SqlitePool;
use tower::ServiceExt;

use gaffer_api::auth::ApiCredentials;
use gaffer_api::config::{AccountEntry, ApiAuthMode, ServerConfig};
use gaffer_api::router::build_app_router;
use gaffer_api::state::AppState;
use gaffer_db::repositories::RecoveryPolicy;
use gaffer_engine::service::HOSTLIST_SERVICE;
use gaffer_engine::{
    Account, AccountPool, CommandExecutor, DispatchConfig, DispatchQueue, HostListService,
    OrderManager, ServiceRegistry,
};

/// Operator credentials baked into the test config.
pub const OPERATOR: (&str, &str) = ("ops", "change-me");
/// First device account in the test pool.
pub const DEVICE: (&str, &str) = ("device-0", "device-secret-0");

fn entry(name: &str, secret: &str) -> AccountEntry {
    AccountEntry {
        name: name.to_string(),
        secret: secret.to_string(),
    }
}

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        database_url: "sqlite://:memory:".to_string(),
        log_dir: std::env::temp_dir().join("gaffer-api-tests"),
        max_concurrency: 4,
        task_timeout_secs: 30,
        shutdown_grace_secs: 5,
        poll_interval_secs: 1,
        device_accounts: vec![
            entry(DEVICE.0, DEVICE.1),
            entry("device-1", "device-secret-1"),
        ],
        api_auth: ApiAuthMode::Operators,
        operator_accounts: vec![entry(OPERATOR.0, OPERATOR.1)],
        executor_cmd: vec!["/bin/true".to_string()],
        recovery_policy: RecoveryPolicy::Requeue,
        request_timeout_secs: 30,
        cors_origins: vec!["http://localhost:5173".to_string()],
    }
}

/// Build the full application router with all middleware layers, using the
/// given database pool and the default test config.
///
/// The dispatch loop is NOT started: submitted tasks stay `queued`, and
/// tests that need later lifecycle states drive them through the
/// repositories directly.
pub fn build_test_app(pool: SqlitePool) -> Router {
    build_test_app_with_config(pool, test_config())
}

/// Same as [`build_test_app`] but with a caller-supplied config (used by
/// the device-pool auth tests).
pub fn build_test_app_with_config(pool: SqlitePool, config: ServerConfig) -> Router {
    let accounts = Arc::new(AccountPool::new(
        config
            .device_accounts
            .iter()
            .map(|a| Account::new(a.name.clone(), a.secret.clone()))
            .collect(),
    ));

    let (program, args) = config
        .executor_cmd
        .split_first()
        .expect("executor command must not be empty");
    let executor = Arc::new(CommandExecutor::new(program.clone(), args.to_vec()));

    let queue = Arc::new(DispatchQueue::new(
        pool.clone(),
        accounts,
        executor,
        DispatchConfig {
            max_concurrency: config.max_concurrency,
            task_timeout: Duration::from_secs(config.task_timeout_secs),
            shutdown_grace: Duration::from_secs(config.shutdown_grace_secs),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            log_dir: config.log_dir.clone(),
        },
    ));

    let mut registry = ServiceRegistry::new();
    registry
        .register(HOSTLIST_SERVICE, Arc::new(HostListService))
        .expect("hostlist registration");

    let manager = Arc::new(OrderManager::new(
        pool.clone(),
        Arc::new(registry),
        Arc::clone(&queue),
        config.recovery_policy,
        config.log_dir.clone(),
    ));

    let credentials = Arc::new(ApiCredentials::from_config(&config));

    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        manager,
        queue,
        credentials,
    };

    build_app_router(state, &config)
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

/// `Authorization` header value for arbitrary Basic credentials.
pub fn basic_auth(name: &str, secret: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{name}:{secret}"));
    format!("Basic {encoded}")
}

/// `Authorization` header value for the default test operator.
pub fn operator_auth() -> String {
    basic_auth(OPERATOR.0, OPERATOR.1)
}

/// GET without credentials.
pub async fn get(app: Router, uri: &str) -> Response {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap()
}

/// GET as the default test operator.
pub async fn get_auth(app: Router, uri: &str) -> Response {
    let request = Request::builder()
        .uri(uri)
        .header(AUTHORIZATION, operator_auth())
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// POST a JSON body as the default test operator.
pub async fn post_json_auth(app: Router, uri: &str, body: serde_json::Value) -> Response {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(AUTHORIZATION, operator_auth())
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Collect a response body as a UTF-8 string.
pub async fn body_text(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}
