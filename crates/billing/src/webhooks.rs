//! Stripe webhook handling
//!
//! Verifies the `stripe-signature` header over the raw payload, decodes
//! the event into a typed payload, and dispatches to the state projectors.
//! Each delivery is handled as an independent, synchronous, idempotent
//! upsert; there is no local retry or queue. Stripe's own redelivery is
//! the sole recovery path for handler failures.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::StripeConfig;
use crate::error::{BillingError, BillingResult};
use crate::events::{EventPayload, InvoiceObject, SubscriptionObject, WebhookEvent};
use crate::invoices::InvoiceService;
use crate::subscriptions::SubscriptionService;

type HmacSha256 = Hmac<Sha256>;

/// Signature timestamp tolerance, matching Stripe's recommended 5 minutes.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Webhook handler for Stripe events
pub struct WebhookHandler {
    config: StripeConfig,
    pool: PgPool,
    subscriptions: SubscriptionService,
    invoices: InvoiceService,
}

impl WebhookHandler {
    pub fn new(config: StripeConfig, pool: PgPool) -> Self {
        let subscriptions = SubscriptionService::new(config.clone(), pool.clone());
        let invoices = InvoiceService::new(pool.clone());
        Self {
            config,
            pool,
            subscriptions,
            invoices,
        }
    }

    /// Verify the signature over the raw payload and decode the event.
    ///
    /// Verification failure is fully side-effect-free: nothing is parsed
    /// or persisted before the HMAC check passes.
    pub fn verify_and_decode(&self, payload: &[u8], signature: &str) -> BillingResult<WebhookEvent> {
        self.verify_signature(payload, signature)?;
        WebhookEvent::decode(payload)
    }

    /// Verify the `stripe-signature` header: `t=timestamp,v1=signature`.
    ///
    /// Computes HMAC-SHA256 of `"{t}.{payload}"` with the signing secret
    /// and compares against `v1`, rejecting timestamps outside the
    /// tolerance window to limit replay of captured deliveries.
    fn verify_signature(&self, payload: &[u8], signature: &str) -> BillingResult<()> {
        let webhook_secret = &self.config.webhook_secret;

        let mut timestamp: Option<i64> = None;
        let mut v1_signature: Option<String> = None;

        for part in signature.split(',') {
            let kv: Vec<&str> = part.splitn(2, '=').collect();
            if kv.len() == 2 {
                match kv[0].trim() {
                    "t" => timestamp = kv[1].parse().ok(),
                    "v1" => v1_signature = Some(kv[1].to_string()),
                    _ => {}
                }
            }
        }

        let timestamp = timestamp.ok_or_else(|| {
            tracing::warn!("Missing timestamp in signature header");
            BillingError::WebhookSignatureInvalid
        })?;

        let v1_signature = v1_signature.ok_or_else(|| {
            tracing::warn!("Missing v1 signature in signature header");
            BillingError::WebhookSignatureInvalid
        })?;

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|e| {
                tracing::error!("System time error: {}", e);
                BillingError::WebhookSignatureInvalid
            })?
            .as_secs() as i64;

        if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
            tracing::warn!(
                timestamp = timestamp,
                now = now,
                "Webhook timestamp outside tolerance window"
            );
            return Err(BillingError::WebhookSignatureInvalid);
        }

        let mut mac = HmacSha256::new_from_slice(webhook_secret.as_bytes()).map_err(|_| {
            tracing::error!("Invalid webhook secret key");
            BillingError::WebhookSignatureInvalid
        })?;
        mac.update(format!("{}.", timestamp).as_bytes());
        mac.update(payload);
        let computed = hex::encode(mac.finalize().into_bytes());

        if computed != v1_signature {
            tracing::warn!("Webhook signature mismatch");
            return Err(BillingError::WebhookSignatureInvalid);
        }

        Ok(())
    }

    /// Dispatch a verified event to its projector.
    ///
    /// Unrecognized event types are logged and acknowledged so Stripe does
    /// not retry deliveries we intentionally ignore. Projector errors
    /// propagate to the HTTP layer, which answers 500 so Stripe redelivers.
    pub async fn handle_event(&self, event: WebhookEvent) -> BillingResult<()> {
        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type(),
            "Processing Stripe webhook event"
        );

        match &event.payload {
            EventPayload::SubscriptionCreated(subscription)
            | EventPayload::SubscriptionUpdated(subscription) => {
                self.handle_subscription_synced(subscription).await
            }
            EventPayload::SubscriptionDeleted(subscription) => {
                self.handle_subscription_deleted(subscription).await
            }
            EventPayload::InvoicePaymentSucceeded(invoice) => {
                self.handle_invoice_payment_succeeded(invoice).await
            }
            EventPayload::InvoicePaymentFailed(invoice) => {
                self.handle_invoice_payment_failed(invoice).await
            }
            EventPayload::Unrecognized { event_type } => {
                tracing::info!(
                    event_id = %event.id,
                    event_type = %event_type,
                    "Received unhandled Stripe event type - no handler configured"
                );
                Ok(())
            }
        }
    }

    async fn handle_subscription_synced(
        &self,
        subscription: &SubscriptionObject,
    ) -> BillingResult<()> {
        let user_id = self.resolve_subscription_owner(subscription).await?;
        self.subscriptions
            .sync_from_provider(user_id, subscription)
            .await?;

        if subscription.status == crate::events::SubscriptionStatus::PastDue {
            tracing::warn!(
                user_id = %user_id,
                subscription_id = %subscription.id,
                "Subscription is past due"
            );
        }

        Ok(())
    }

    async fn handle_subscription_deleted(
        &self,
        subscription: &SubscriptionObject,
    ) -> BillingResult<()> {
        let updated = self.subscriptions.mark_canceled(&subscription.id).await?;

        if updated {
            tracing::info!(
                subscription_id = %subscription.id,
                "Subscription canceled (row retained for billing history)"
            );
        } else {
            // Deletion for a subscription we never stored; acknowledge so
            // Stripe does not redeliver an event we can never apply.
            tracing::warn!(
                subscription_id = %subscription.id,
                "Deletion event for unknown subscription - acknowledged"
            );
        }

        Ok(())
    }

    async fn handle_invoice_payment_succeeded(&self, invoice: &InvoiceObject) -> BillingResult<()> {
        let user_id = self.get_user_id_from_customer(invoice.customer.as_deref()).await?;

        self.invoices.store_invoice(user_id, invoice, "paid").await?;

        tracing::info!(
            user_id = %user_id,
            stripe_invoice_id = %invoice.id,
            amount_paid = ?invoice.amount_paid,
            "Invoice paid"
        );

        Ok(())
    }

    /// Record the failed invoice and log it. Observational only: there is
    /// no dunning state machine here, Stripe drives payment retries.
    async fn handle_invoice_payment_failed(&self, invoice: &InvoiceObject) -> BillingResult<()> {
        let user_id = self.get_user_id_from_customer(invoice.customer.as_deref()).await?;

        let status = invoice.status.as_deref().unwrap_or("open");
        self.invoices.store_invoice(user_id, invoice, status).await?;

        tracing::warn!(
            user_id = %user_id,
            stripe_invoice_id = %invoice.id,
            amount_due = ?invoice.amount_due,
            "Invoice payment failed"
        );

        Ok(())
    }

    /// Resolve the owning user for a subscription event.
    ///
    /// Checkout stamps `user_id` into the subscription metadata; customer
    /// lookup is the fallback for subscriptions created outside checkout.
    async fn resolve_subscription_owner(
        &self,
        subscription: &SubscriptionObject,
    ) -> BillingResult<Uuid> {
        if let Some(user_id) = subscription
            .metadata
            .get("user_id")
            .and_then(|id| Uuid::parse_str(id).ok())
        {
            return Ok(user_id);
        }

        self.get_user_id_from_customer(Some(&subscription.customer))
            .await
    }

    async fn get_user_id_from_customer(&self, customer: Option<&str>) -> BillingResult<Uuid> {
        let customer_id = customer.ok_or_else(|| {
            BillingError::MalformedPayload("no customer on event object".to_string())
        })?;

        let result: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM users WHERE stripe_customer_id = $1")
                .bind(customer_id)
                .fetch_optional(&self.pool)
                .await?;

        result
            .map(|(id,)| id)
            .ok_or_else(|| BillingError::CustomerNotFound(customer_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    const SECRET: &str = "whsec_test_secret";

    fn handler() -> WebhookHandler {
        // Lazy pool: never connects unless a projector touches the database.
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        WebhookHandler::new(StripeConfig::new(SECRET), pool)
    }

    fn unix_now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }

    fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}.", timestamp).as_bytes());
        mac.update(payload);
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    #[tokio::test]
    async fn valid_signature_verifies() {
        let handler = handler();
        let payload = br#"{"id":"evt_1","type":"ping","data":{"object":{}}}"#;
        let header = sign(payload, SECRET, unix_now());
        assert!(handler.verify_signature(payload, &header).is_ok());
    }

    #[tokio::test]
    async fn tampered_payload_fails() {
        let handler = handler();
        let payload = br#"{"id":"evt_1","type":"ping","data":{"object":{}}}"#;
        let header = sign(payload, SECRET, unix_now());
        let tampered = br#"{"id":"evt_2","type":"ping","data":{"object":{}}}"#;
        assert!(matches!(
            handler.verify_signature(tampered, &header),
            Err(BillingError::WebhookSignatureInvalid)
        ));
    }

    #[tokio::test]
    async fn wrong_secret_fails() {
        let handler = handler();
        let payload = b"{}";
        let header = sign(payload, "whsec_other", unix_now());
        assert!(matches!(
            handler.verify_signature(payload, &header),
            Err(BillingError::WebhookSignatureInvalid)
        ));
    }

    #[tokio::test]
    async fn stale_timestamp_fails() {
        let handler = handler();
        let payload = b"{}";
        let header = sign(payload, SECRET, unix_now() - 3600);
        assert!(matches!(
            handler.verify_signature(payload, &header),
            Err(BillingError::WebhookSignatureInvalid)
        ));
    }

    #[tokio::test]
    async fn malformed_header_fails() {
        let handler = handler();
        for header in ["", "t=abc,v1=def", "v1=deadbeef", "t=123"] {
            assert!(
                matches!(
                    handler.verify_signature(b"{}", header),
                    Err(BillingError::WebhookSignatureInvalid)
                ),
                "header {header:?} should fail"
            );
        }
    }

    #[tokio::test]
    async fn unrecognized_event_is_acknowledged_without_database_access() {
        let handler = handler();
        let payload = serde_json::json!({
            "id": "evt_9",
            "type": "charge.refunded",
            "data": {"object": {"id": "ch_1"}}
        })
        .to_string();
        let header = sign(payload.as_bytes(), SECRET, unix_now());

        let event = handler
            .verify_and_decode(payload.as_bytes(), &header)
            .unwrap();
        // The lazy pool has no live database behind it; this only passes
        // because unrecognized events never touch the store.
        handler.handle_event(event).await.unwrap();
    }
}
