// Test code patterns:
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! EventHub API Library
//!
//! Session core (credential hashing, one-time codes, token rotation and
//! transport), the session and role gates, and the HTTP routes built on them.

pub mod auth;
pub mod clock;
pub mod config;
pub mod email;
pub mod error;
pub mod rate_limit;
pub mod routes;
pub mod security;
pub mod state;
#[cfg(test)]
pub(crate) mod test_support;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
