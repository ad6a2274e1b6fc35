//! API error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bettersaas_billing::BillingError;
use serde_json::json;
use thiserror::Error;

/// Errors surfaced from route handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing stripe-signature header")]
    MissingSignatureHeader,

    #[error(transparent)]
    Billing(#[from] BillingError),
}

impl ApiError {
    /// Map onto the provider-facing status codes: 400 stops redelivery
    /// (the payload/signature pairing itself is invalid), 500 asks the
    /// provider to retry later.
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingSignatureHeader => StatusCode::BAD_REQUEST,
            ApiError::Billing(e) if e.is_terminal() => StatusCode::BAD_REQUEST,
            // Lookup misses on the query endpoints; the webhook path never
            // surfaces these (unknown subscriptions are acknowledged).
            ApiError::Billing(
                BillingError::SubscriptionNotFound(_) | BillingError::PaymentMethodNotFound(_),
            ) => StatusCode::NOT_FOUND,
            ApiError::Billing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::warn!(error = %self, "Request rejected");
        }

        // Internal failure details stay in the logs, not the response body.
        let message = if status.is_server_error() {
            "internal error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_failures_map_to_bad_request() {
        assert_eq!(
            ApiError::from(BillingError::WebhookSignatureInvalid).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::MissingSignatureHeader.status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn handler_failures_map_to_internal_error() {
        assert_eq!(
            ApiError::from(BillingError::MalformedPayload("missing field".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(BillingError::CustomerNotFound("cus_1".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
