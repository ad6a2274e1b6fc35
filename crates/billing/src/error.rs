//! Billing error types

use thiserror::Error;

pub type BillingResult<T> = Result<T, BillingError>;

/// Errors produced by the reconciliation core.
///
/// The HTTP layer maps these onto response codes: signature failures are
/// terminal for the delivery (400, the provider must not retry), everything
/// else is surfaced as 500 so the provider's redelivery mechanism retries.
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Webhook signature verification failed")]
    WebhookSignatureInvalid,

    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),

    #[error("No user found for Stripe customer {0}")]
    CustomerNotFound(String),

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),

    #[error("Payment method not found: {0}")]
    PaymentMethodNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl BillingError {
    /// True when retrying the exact same delivery can never succeed.
    ///
    /// Signature failures get a 400 so the provider stops redelivering;
    /// everything else gets a 500 and is retried by the provider.
    pub fn is_terminal(&self) -> bool {
        matches!(self, BillingError::WebhookSignatureInvalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_signature_failures_are_terminal() {
        assert!(BillingError::WebhookSignatureInvalid.is_terminal());
        assert!(!BillingError::MalformedPayload("missing id".into()).is_terminal());
        assert!(!BillingError::CustomerNotFound("cus_123".into()).is_terminal());
    }
}
