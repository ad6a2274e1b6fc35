#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Shared infrastructure for the billing backend.
//!
//! Database pool construction, migrations, and the plan definitions
//! used by both the billing core and the API server.

pub mod db;
pub mod plans;

pub use db::{create_pool, run_migrations};
pub use plans::SubscriptionPlan;
