//! Pagination clamps shared by the repository layer.
//!
//! Handlers pass raw `?limit=&offset=` values straight through; the
//! repositories clamp them here so no query can be talked into an
//! unbounded scan.

/// Default page size when the client sends no `limit`.
pub const DEFAULT_LIMIT: i64 = 50;

/// Hard ceiling on page size regardless of what the client asks for.
pub const MAX_LIMIT: i64 = 100;

/// Clamp a user-provided limit to valid bounds.
pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIMIT).max(1).min(MAX_LIMIT)
}

/// Clamp a user-provided offset to non-negative.
pub fn clamp_offset(offset: Option<i64>) -> i64 {
    offset.unwrap_or(0).max(0)
}
