// API crate clippy configuration
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Stepping Stones API Library
//!
//! Authentication, session, and token components for the Stepping Stones
//! content API.

pub mod auth;
pub mod config;
pub mod email;
pub mod error;
pub mod human_verification;
pub mod models;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
