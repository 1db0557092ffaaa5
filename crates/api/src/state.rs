use std::sync::Arc;

use gaffer_engine::{DispatchQueue, OrderManager};

use crate::auth::ApiCredentials;
use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool (used directly only by the health probe;
    /// everything else goes through the manager).
    pub pool: gaffer_db::DbPool,
    /// Daemon configuration.
    pub config: Arc<ServerConfig>,
    /// Order lifecycle front door: submission, reads, artifacts.
    pub manager: Arc<OrderManager>,
    /// Dispatch queue, exposed for the stats snapshot.
    pub queue: Arc<DispatchQueue>,
    /// Credential digests the Basic auth extractor verifies against.
    pub credentials: Arc<ApiCredentials>,
}
