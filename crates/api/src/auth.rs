//! Basic-auth extractor for the status API.
//!
//! Credentials are compared as SHA-256 digests so secrets never sit in
//! the state longer than startup, and the byte comparison does not short
//! circuit on the first mismatch.

use std::collections::HashMap;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::config::{AccountEntry, ApiAuthMode, ServerConfig};
use crate::error::AppError;
use crate::state::AppState;

/// Digests of the credential set the API authenticates against.
pub struct ApiCredentials {
    digests: HashMap<String, [u8; 32]>,
}

impl ApiCredentials {
    /// Pick the credential set the configuration binds the API to.
    pub fn from_config(config: &ServerConfig) -> Self {
        match config.api_auth {
            ApiAuthMode::Operators => Self::from_entries(&config.operator_accounts),
            ApiAuthMode::DevicePool => Self::from_entries(&config.device_accounts),
        }
    }

    pub fn from_entries(entries: &[AccountEntry]) -> Self {
        let digests = entries
            .iter()
            .map(|e| (e.name.clone(), Sha256::digest(e.secret.as_bytes()).into()))
            .collect();
        Self { digests }
    }

    /// Check a presented `name` / `secret` pair.
    ///
    /// Unknown names still burn a full digest comparison so their timing
    /// is indistinguishable from a wrong secret.
    pub fn verify(&self, name: &str, secret: &str) -> bool {
        let presented: [u8; 32] = Sha256::digest(secret.as_bytes()).into();
        match self.digests.get(name) {
            Some(stored) => digests_match(stored, &presented),
            None => {
                let _ = digests_match(&[0u8; 32], &presented);
                false
            }
        }
    }
}

fn digests_match(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter()
        .zip(b.iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Authenticated operator extracted from a Basic `Authorization` header.
///
/// Use this as an extractor parameter in any handler that requires
/// authentication:
///
/// ```ignore
/// async fn my_handler(operator: AuthOperator) -> AppResult<Json<()>> {
///     tracing::debug!(operator = %operator.name, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthOperator {
    /// The credential name that authenticated.
    pub name: String,
}

impl FromRequestParts<AppState> for AuthOperator {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?;

        let encoded = auth_header.strip_prefix("Basic ").ok_or_else(|| {
            AppError::Unauthorized(
                "Invalid Authorization format. Expected: Basic <credentials>".into(),
            )
        })?;

        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|_| AppError::Unauthorized("Credentials are not valid base64".into()))?;
        let decoded = String::from_utf8(decoded)
            .map_err(|_| AppError::Unauthorized("Credentials are not valid UTF-8".into()))?;

        let (name, secret) = decoded
            .split_once(':')
            .ok_or_else(|| AppError::Unauthorized("Credentials are not name:secret".into()))?;

        if !state.credentials.verify(name, secret) {
            return Err(AppError::Unauthorized("Invalid credentials".into()));
        }

        Ok(AuthOperator {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> ApiCredentials {
        ApiCredentials::from_entries(&[
            AccountEntry {
                name: "ops".into(),
                secret: "change-me".into(),
            },
            AccountEntry {
                name: "ci".into(),
                secret: "pipeline".into(),
            },
        ])
    }

    #[test]
    fn correct_credentials_verify() {
        let creds = credentials();
        assert!(creds.verify("ops", "change-me"));
        assert!(creds.verify("ci", "pipeline"));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        assert!(!credentials().verify("ops", "wrong"));
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert!(!credentials().verify("ghost", "change-me"));
    }

    #[test]
    fn swapped_credentials_are_rejected() {
        assert!(!credentials().verify("ci", "change-me"));
    }

    #[test]
    fn digest_comparison_checks_every_byte() {
        let mut a = [0u8; 32];
        let b = a;
        assert!(digests_match(&a, &b));
        a[31] = 1;
        assert!(!digests_match(&a, &b));
    }
}
