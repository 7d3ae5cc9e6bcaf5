// Shared crate clippy configuration
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Stepping Stones Shared Library
//!
//! Infrastructure shared between the API server and any auxiliary binaries:
//! database pool construction, migrations, and request rate limiting.

pub mod db;
pub mod rate_limit;

pub use db::{create_migration_pool, create_pool, run_migrations};
pub use rate_limit::RateLimiter;
