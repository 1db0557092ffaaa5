//! Error type shared by the domain crates.
//!
//! `CoreError` carries enough structure for the API layer to map each
//! variant onto an HTTP status without string matching.

use thiserror::Error;

use crate::types::DbId;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: DbId },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: &'static str, to: &'static str },

    #[error("{0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: DbId) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
