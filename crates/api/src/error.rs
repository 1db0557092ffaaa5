use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use gaffer_core::CoreError;
use gaffer_engine::EngineError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps the domain errors from `gaffer_core` and `gaffer_engine` and adds
/// HTTP-specific variants. Implements [`IntoResponse`] to produce
/// consistent `{ "error", "code" }` JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `gaffer_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// An error from the execution engine.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A bad request with a human-readable message.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid API credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// An internal error with a human-readable message.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => core_response(core),
            AppError::Engine(engine) => engine_response(engine),
            AppError::Database(err) => classify_sqlx_error(err),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal_error()
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        let mut response = (status, axum::Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                header::HeaderValue::from_static("Basic realm=\"gaffer\""),
            );
        }
        response
    }
}

fn core_response(core: &CoreError) -> (StatusCode, &'static str, String) {
    match core {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::InvalidTransition { from, to } => (
            StatusCode::CONFLICT,
            "CONFLICT",
            format!("cannot move from {from} to {to}"),
        ),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal core error");
            internal_error()
        }
    }
}

fn engine_response(engine: &EngineError) -> (StatusCode, &'static str, String) {
    match engine {
        EngineError::UnknownService(name) => (
            StatusCode::BAD_REQUEST,
            "UNKNOWN_SERVICE",
            format!("unknown service: {name}"),
        ),
        EngineError::Decomposition(msg) => (
            StatusCode::BAD_REQUEST,
            "DECOMPOSITION_FAILED",
            format!("order decomposition failed: {msg}"),
        ),
        EngineError::PoolExhausted | EngineError::PoolClosed => (
            StatusCode::SERVICE_UNAVAILABLE,
            "NO_CAPACITY",
            "no execution capacity available".to_string(),
        ),
        EngineError::Core(core) => core_response(core),
        EngineError::Store(err) => classify_sqlx_error(err),
        EngineError::Executor(err) => {
            tracing::error!(error = %err, "Executor error surfaced to API");
            internal_error()
        }
        EngineError::Artifact(err) => {
            tracing::error!(error = %err, "Artifact I/O error");
            internal_error()
        }
    }
}

/// Classify a sqlx error into an HTTP status, error code, and message.
///
/// `RowNotFound` maps to 404 and SQLite uniqueness violations (extended
/// result codes 1555 and 2067) map to 409. Everything else maps to 500
/// with a sanitized message; the original error is only logged.
fn classify_sqlx_error(err: &sqlx::Error) -> (StatusCode, &'static str, String) {
    match err {
        sqlx::Error::RowNotFound => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
        ),
        sqlx::Error::Database(db_err) => {
            if matches!(db_err.code().as_deref(), Some("1555") | Some("2067")) {
                return (
                    StatusCode::CONFLICT,
                    "CONFLICT",
                    "Duplicate value violates a unique constraint".to_string(),
                );
            }
            tracing::error!(error = %db_err, "Database error");
            internal_error()
        }
        other => {
            tracing::error!(error = %other, "Database error");
            internal_error()
        }
    }
}

fn internal_error() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}
