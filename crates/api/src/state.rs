//! Application state

use std::sync::Arc;

use bettersaas_billing::{BillingService, StripeConfig};
use sqlx::PgPool;

use crate::config::Config;

/// Shared application state
///
/// All clients are constructed here and injected into handlers; nothing
/// lives in module-level statics, so tests can substitute their own.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub billing: Arc<BillingService>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config, stripe_config: StripeConfig) -> Self {
        let billing = Arc::new(BillingService::new(stripe_config, pool.clone()));
        Self {
            pool,
            config,
            billing,
        }
    }
}
