//! Billing query endpoints
//!
//! Read-only views over the reconciled state, plus default payment method
//! selection. The webhook projectors are the only writers of subscription
//! and invoice rows.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// GET /api/billing/subscription/{user_id}
pub async fn get_subscription(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let subscription = state.billing.subscriptions.get_for_user(user_id).await?;
    Ok(Json(json!({ "subscription": subscription })))
}

/// GET /api/billing/invoices/{user_id}
pub async fn list_invoices(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let invoices = state.billing.invoices.list_for_user(user_id).await?;
    Ok(Json(json!({ "invoices": invoices })))
}

/// GET /api/billing/payment-methods/{user_id}
pub async fn list_payment_methods(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let payment_methods = state.billing.payment_methods.list_for_user(user_id).await?;
    Ok(Json(json!({ "payment_methods": payment_methods })))
}

#[derive(Debug, Deserialize)]
pub struct SetDefaultRequest {
    pub payment_method_id: String,
}

/// POST /api/billing/payment-methods/{user_id}/default
pub async fn set_default_payment_method(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<SetDefaultRequest>,
) -> Result<Json<Value>, ApiError> {
    state
        .billing
        .payment_methods
        .set_default(user_id, &request.payment_method_id)
        .await?;
    Ok(Json(json!({ "updated": true })))
}

/// GET /api/billing/invariants
///
/// Read-only consistency sweep over the reconciled state.
pub async fn run_invariant_checks(
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    let summary = state.billing.invariants.run_all_checks().await?;
    Ok(Json(json!(summary)))
}
