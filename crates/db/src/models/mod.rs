//! Database entity models and DTOs.

pub mod order;
pub mod task;
