//! Gaffer status API server library.
//!
//! Exposes the building blocks (config, state, error handling, auth,
//! routes) so integration tests and the `gafferd` binary entrypoint can
//! both use them.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
