//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&DbPool` as the first argument.

pub mod order_repo;
pub mod recovery;
pub mod task_repo;

pub use order_repo::OrderRepo;
pub use recovery::{close_open_orders, RecoveryPolicy, RecoveryReport};
pub use task_repo::TaskRepo;
