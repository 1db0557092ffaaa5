//! Services decompose an accepted order into executable tasks.
//!
//! A service never executes anything itself; it only decides what the
//! units of work are. Registration happens once at startup, so the
//! registry is a plain immutable map behind an `Arc`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use gaffer_core::validation::{validate_service_name, validate_task_name};
use gaffer_db::models::order::Order;
use gaffer_db::models::task::TaskSpec;
use serde_json::{Map, Value};

use crate::error::EngineError;

/// Turns one order into the tasks that will be dispatched for it.
#[async_trait]
pub trait Service: Send + Sync {
    async fn decompose(&self, order: &Order) -> Result<Vec<TaskSpec>, EngineError>;
}

impl fmt::Debug for dyn Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn Service")
    }
}

/// Name -> service lookup, populated statically at startup.
#[derive(Default)]
pub struct ServiceRegistry {
    services: HashMap<String, Arc<dyn Service>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service under `name`. Replaces any previous holder of
    /// the name.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        service: Arc<dyn Service>,
    ) -> Result<(), EngineError> {
        let name = name.into();
        validate_service_name(&name)?;
        self.services.insert(name, service);
        Ok(())
    }

    /// Look up the service owning `name`.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Service>, EngineError> {
        self.services
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownService(name.to_string()))
    }

    /// Registered service names, sorted for stable logging.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.keys().cloned().collect();
        names.sort();
        names
    }
}

// ---------------------------------------------------------------------------
// Built-in services
// ---------------------------------------------------------------------------

/// Name the host-list service registers under.
pub const HOSTLIST_SERVICE: &str = "hostlist";

/// The archetypal service: an order carries a `hosts` array and every
/// host becomes one task. Remaining payload fields are copied into each
/// task payload next to the `host` field.
pub struct HostListService;

#[async_trait]
impl Service for HostListService {
    async fn decompose(&self, order: &Order) -> Result<Vec<TaskSpec>, EngineError> {
        let hosts = match order.payload.get("hosts") {
            Some(Value::Array(hosts)) if !hosts.is_empty() => hosts,
            Some(Value::Array(_)) => {
                return Err(EngineError::Decomposition(
                    "\"hosts\" must not be empty".to_string(),
                ))
            }
            _ => {
                return Err(EngineError::Decomposition(
                    "payload requires a \"hosts\" array".to_string(),
                ))
            }
        };

        // Shared parameters: everything except the host list itself.
        let params: Map<String, Value> = match order.payload.as_object() {
            Some(object) => object
                .iter()
                .filter(|(key, _)| key.as_str() != "hosts")
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
            None => Map::new(),
        };

        let mut specs = Vec::with_capacity(hosts.len());
        for host in hosts {
            let host = host.as_str().ok_or_else(|| {
                EngineError::Decomposition("\"hosts\" entries must be strings".to_string())
            })?;
            validate_task_name(host)?;

            let mut payload = params.clone();
            payload.insert("host".to_string(), Value::String(host.to_string()));
            specs.push(TaskSpec {
                name: host.to_string(),
                payload: Value::Object(payload),
            });
        }
        Ok(specs)
    }
}
