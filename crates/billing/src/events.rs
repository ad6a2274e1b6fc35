//! Typed Stripe webhook events
//!
//! The event envelope is decoded exactly once at the ingress boundary into
//! a tagged union over the event types we reconcile. Everything else lands
//! in the `Unrecognized` variant and is acknowledged without side effects,
//! so Stripe never retries deliveries we intentionally ignore.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::{BillingError, BillingResult};

/// Subscription statuses as delivered by Stripe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
    Incomplete,
    IncompleteExpired,
    Unpaid,
    Paused,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Incomplete => "incomplete",
            SubscriptionStatus::IncompleteExpired => "incomplete_expired",
            SubscriptionStatus::Unpaid => "unpaid",
            SubscriptionStatus::Paused => "paused",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceObject {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItem {
    pub price: Option<PriceObject>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionItemList {
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

/// The `data.object` payload of a `customer.subscription.*` event.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionObject {
    pub id: String,
    pub customer: String,
    pub status: SubscriptionStatus,
    pub current_period_start: i64,
    pub current_period_end: i64,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    #[serde(default)]
    pub canceled_at: Option<i64>,
    #[serde(default)]
    pub items: SubscriptionItemList,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl SubscriptionObject {
    /// The price on the first subscription item, if any.
    pub fn price_id(&self) -> Option<&str> {
        self.items
            .data
            .first()
            .and_then(|item| item.price.as_ref())
            .map(|p| p.id.as_str())
    }
}

/// The `data.object` payload of an `invoice.*` event.
#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceObject {
    pub id: String,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub amount_paid: Option<i64>,
    #[serde(default)]
    pub amount_due: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub hosted_invoice_url: Option<String>,
    #[serde(default)]
    pub invoice_pdf: Option<String>,
}

/// The recognized event payloads, plus a catch-all.
#[derive(Debug, Clone)]
pub enum EventPayload {
    SubscriptionCreated(SubscriptionObject),
    SubscriptionUpdated(SubscriptionObject),
    SubscriptionDeleted(SubscriptionObject),
    InvoicePaymentSucceeded(InvoiceObject),
    InvoicePaymentFailed(InvoiceObject),
    Unrecognized { event_type: String },
}

/// A decoded webhook event.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    /// Stripe event ID (`evt_...`).
    pub id: String,
    /// Unix timestamp at which Stripe created the event.
    pub created: i64,
    pub payload: EventPayload,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    created: i64,
    data: EventData,
}

impl WebhookEvent {
    /// Decode a raw (already signature-verified) payload.
    ///
    /// A payload that is not a valid event envelope, or that carries a
    /// recognized `type` with a malformed `data.object`, is a
    /// handler-class failure: the delivery gets a 500 and Stripe retries.
    pub fn decode(payload: &[u8]) -> BillingResult<Self> {
        let envelope: EventEnvelope = serde_json::from_slice(payload)
            .map_err(|e| BillingError::MalformedPayload(format!("invalid envelope: {e}")))?;

        let payload = match envelope.event_type.as_str() {
            "customer.subscription.created" => {
                EventPayload::SubscriptionCreated(decode_object(&envelope)?)
            }
            "customer.subscription.updated" => {
                EventPayload::SubscriptionUpdated(decode_object(&envelope)?)
            }
            "customer.subscription.deleted" => {
                EventPayload::SubscriptionDeleted(decode_object(&envelope)?)
            }
            "invoice.payment_succeeded" => {
                EventPayload::InvoicePaymentSucceeded(decode_object(&envelope)?)
            }
            "invoice.payment_failed" => {
                EventPayload::InvoicePaymentFailed(decode_object(&envelope)?)
            }
            _ => EventPayload::Unrecognized {
                event_type: envelope.event_type.clone(),
            },
        };

        Ok(WebhookEvent {
            id: envelope.id,
            created: envelope.created,
            payload,
        })
    }

    /// The event type string, for logging.
    pub fn event_type(&self) -> &str {
        match &self.payload {
            EventPayload::SubscriptionCreated(_) => "customer.subscription.created",
            EventPayload::SubscriptionUpdated(_) => "customer.subscription.updated",
            EventPayload::SubscriptionDeleted(_) => "customer.subscription.deleted",
            EventPayload::InvoicePaymentSucceeded(_) => "invoice.payment_succeeded",
            EventPayload::InvoicePaymentFailed(_) => "invoice.payment_failed",
            EventPayload::Unrecognized { event_type } => event_type,
        }
    }
}

fn decode_object<T: serde::de::DeserializeOwned>(envelope: &EventEnvelope) -> BillingResult<T> {
    serde_json::from_value(envelope.data.object.clone()).map_err(|e| {
        BillingError::MalformedPayload(format!(
            "invalid {} object: {e}",
            envelope.event_type
        ))
    })
}
