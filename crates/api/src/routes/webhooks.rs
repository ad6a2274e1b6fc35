//! Stripe webhook endpoint
//!
//! POST /api/webhooks/stripe — must receive the raw body (not parsed
//! JSON): signature verification runs over the exact delivered bytes.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::state::AppState;

/// Handle an incoming Stripe webhook delivery.
///
/// Responds 200 `{"received": true}` once the event is applied (or
/// intentionally ignored), 400 on signature failure so Stripe stops
/// redelivering, and 500 on projector failure so Stripe retries later.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::MissingSignatureHeader)?;

    let event = state.billing.webhooks.verify_and_decode(&body, signature)?;
    state.billing.webhooks.handle_event(event).await?;

    Ok(Json(json!({ "received": true })))
}
