//! Request handlers, grouped by resource.

pub mod orders;
pub mod queue;
pub mod tasks;
