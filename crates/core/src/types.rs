//! Shared type aliases used across crate boundaries.

use chrono::{DateTime, Utc};

/// Database row identifier (SQLite INTEGER PRIMARY KEY).
pub type DbId = i64;

/// UTC timestamp as stored in and read from the database.
pub type Timestamp = DateTime<Utc>;
