//! Route registration

pub mod billing;
pub mod health;
pub mod webhooks;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/webhooks/stripe", post(webhooks::stripe_webhook))
        .route(
            "/api/billing/subscription/{user_id}",
            get(billing::get_subscription),
        )
        .route("/api/billing/invoices/{user_id}", get(billing::list_invoices))
        .route(
            "/api/billing/payment-methods/{user_id}",
            get(billing::list_payment_methods),
        )
        .route(
            "/api/billing/payment-methods/{user_id}/default",
            post(billing::set_default_payment_method),
        )
        .route("/api/billing/invariants", get(billing::run_invariant_checks))
        .with_state(state)
}
