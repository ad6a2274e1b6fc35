// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Billing reconciliation core
//!
//! Keeps the local subscription/invoice store consistent with Stripe by
//! consuming webhook deliveries:
//!
//! - **Ingress**: HMAC signature verification over the raw payload, then a
//!   single typed decode of the event envelope
//! - **Dispatch**: fixed registry of recognized event types; everything
//!   else is acknowledged and ignored
//! - **Projection**: idempotent upserts keyed on the provider's
//!   subscription/invoice identifiers
//!
//! All clients are explicitly constructed and injected; there are no
//! module-level singletons.

pub mod config;
pub mod error;
pub mod events;
pub mod invariants;
pub mod invoices;
pub mod payment_methods;
pub mod subscriptions;
pub mod webhooks;

// Config
pub use config::{PriceIds, StripeConfig};

// Error
pub use error::{BillingError, BillingResult};

// Events
pub use events::{
    EventPayload, InvoiceObject, SubscriptionObject, SubscriptionStatus, WebhookEvent,
};

// Invariants
pub use invariants::{
    InvariantCheckSummary, InvariantChecker, InvariantViolation, ViolationSeverity,
};

// Invoices
pub use invoices::{InvoiceRecord, InvoiceService};

// Payment methods
pub use payment_methods::{PaymentMethodDetails, PaymentMethodRecord, PaymentMethodService};

// Subscriptions
pub use subscriptions::{SubscriptionRecord, SubscriptionService};

// Webhooks
pub use webhooks::WebhookHandler;

use sqlx::PgPool;

/// Main billing service that combines all billing functionality
pub struct BillingService {
    pub subscriptions: SubscriptionService,
    pub invoices: InvoiceService,
    pub payment_methods: PaymentMethodService,
    pub invariants: InvariantChecker,
    pub webhooks: WebhookHandler,
}

impl BillingService {
    /// Create a new billing service with explicit config
    pub fn new(config: StripeConfig, pool: PgPool) -> Self {
        Self {
            subscriptions: SubscriptionService::new(config.clone(), pool.clone()),
            invoices: InvoiceService::new(pool.clone()),
            payment_methods: PaymentMethodService::new(pool.clone()),
            invariants: InvariantChecker::new(pool.clone()),
            webhooks: WebhookHandler::new(config, pool),
        }
    }

    /// Create a new billing service from environment variables
    pub fn from_env(pool: PgPool) -> BillingResult<Self> {
        let config = StripeConfig::from_env()?;
        Ok(Self::new(config, pool))
    }
}
