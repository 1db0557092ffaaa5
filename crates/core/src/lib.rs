//! Core domain types and pure logic shared by every gaffer crate.
//!
//! This crate has no I/O and no internal dependencies. It defines the
//! id/timestamp aliases, the error type, order and task lifecycles, and
//! the small helpers (pagination clamps, artifact paths, input
//! validation) that the db, engine, and api crates build on.

pub mod artifacts;
pub mod error;
pub mod pagination;
pub mod status;
pub mod types;
pub mod validation;

pub use error::CoreError;
pub use types::{DbId, Timestamp};
