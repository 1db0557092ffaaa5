//! Engine error type.

use gaffer_core::CoreError;
use thiserror::Error;

use crate::executor::ExecutorError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no account available in the pool")]
    PoolExhausted,

    #[error("account pool is closed")]
    PoolClosed,

    #[error("unknown service: {0}")]
    UnknownService(String),

    #[error("order decomposition failed: {0}")]
    Decomposition(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("database error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("artifact I/O error: {0}")]
    Artifact(#[from] std::io::Error),

    #[error(transparent)]
    Executor(#[from] ExecutorError),
}
