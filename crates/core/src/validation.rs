//! Order submission validation (pure, shared by engine and API).
//!
//! The engine validates before persisting anything so that a rejected
//! order is aborted without ever touching the task table.

use serde_json::Value;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum length of a service name.
const MAX_SERVICE_NAME_LEN: usize = 128;

/// Maximum length of a task name.
const MAX_TASK_NAME_LEN: usize = 255;

/// Maximum size of a serialized order payload in bytes.
pub const MAX_PAYLOAD_BYTES: usize = 256 * 1024;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a service name.
///
/// Rules:
/// - Must not be empty.
/// - Must not exceed `MAX_SERVICE_NAME_LEN` characters.
/// - Must contain only alphanumeric, hyphen, underscore, or dot characters.
pub fn validate_service_name(name: &str) -> Result<(), CoreError> {
    if name.is_empty() {
        return Err(CoreError::Validation(
            "Service name must not be empty".to_string(),
        ));
    }
    if name.len() > MAX_SERVICE_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "Service name must not exceed {MAX_SERVICE_NAME_LEN} characters"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(CoreError::Validation(
            "Service name may only contain alphanumeric, hyphen, underscore, or dot characters"
                .to_string(),
        ));
    }
    Ok(())
}

/// Validate a task name as produced by a service during decomposition.
pub fn validate_task_name(name: &str) -> Result<(), CoreError> {
    if name.is_empty() {
        return Err(CoreError::Validation(
            "Task name must not be empty".to_string(),
        ));
    }
    if name.len() > MAX_TASK_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "Task name must not exceed {MAX_TASK_NAME_LEN} characters"
        )));
    }
    Ok(())
}

/// Validate a raw order payload.
///
/// Rules:
/// - Must be a JSON object (service-specific fields live inside it).
/// - Serialized form must not exceed `MAX_PAYLOAD_BYTES`.
pub fn validate_order_payload(payload: &Value) -> Result<(), CoreError> {
    if !payload.is_object() {
        return Err(CoreError::Validation(
            "Order payload must be a JSON object".to_string(),
        ));
    }
    let serialized_len = payload.to_string().len();
    if serialized_len > MAX_PAYLOAD_BYTES {
        return Err(CoreError::Validation(format!(
            "Order payload exceeds {MAX_PAYLOAD_BYTES} bytes"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
