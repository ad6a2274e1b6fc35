#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! API server for the billing backend
//!
//! Exposes the Stripe webhook endpoint and read-only billing queries.
//! Library target so integration tests can build the router directly.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::Config;
pub use routes::create_router;
pub use state::AppState;
