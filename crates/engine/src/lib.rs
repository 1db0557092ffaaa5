//! Execution engine: account pool, service decomposition, dispatch
//! queue, and the order manager that ties them together.
//!
//! The engine owns every write to task state after creation. The API
//! crate only ever calls [`manager::OrderManager`] and
//! [`dispatcher::DispatchQueue::stats`].

pub mod accounts;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod manager;
pub mod service;

pub use accounts::{Account, AccountLease, AccountPool};
pub use dispatcher::{DispatchConfig, DispatchQueue, QueueStats};
pub use error::EngineError;
pub use executor::{CommandExecutor, ExecutionReport, Executor, ExecutorError};
pub use manager::OrderManager;
pub use service::{HostListService, Service, ServiceRegistry};
