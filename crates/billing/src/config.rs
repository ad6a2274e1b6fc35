//! Stripe configuration
//!
//! The reconciliation core consumes Stripe exclusively through webhook
//! deliveries, so the only required setting is the webhook signing secret.
//! Price IDs are optional and used to derive the plan column from the
//! price attached to a subscription.

use bettersaas_shared::SubscriptionPlan;

use crate::error::{BillingError, BillingResult};

/// Stripe price IDs for the paid plans.
#[derive(Debug, Clone, Default)]
pub struct PriceIds {
    pub pro_monthly: Option<String>,
    pub pro_annual: Option<String>,
}

/// Configuration for the Stripe webhook integration.
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Webhook signing secret (`whsec_...`).
    pub webhook_secret: String,
    pub price_ids: PriceIds,
}

impl StripeConfig {
    pub fn new(webhook_secret: impl Into<String>) -> Self {
        Self {
            webhook_secret: webhook_secret.into(),
            price_ids: PriceIds::default(),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> BillingResult<Self> {
        let webhook_secret = std::env::var("STRIPE_WEBHOOK_SECRET")
            .map_err(|_| BillingError::Config("STRIPE_WEBHOOK_SECRET not set".to_string()))?;

        Ok(Self {
            webhook_secret,
            price_ids: PriceIds {
                pro_monthly: std::env::var("STRIPE_PRICE_PRO_MONTHLY").ok(),
                pro_annual: std::env::var("STRIPE_PRICE_PRO_ANNUAL").ok(),
            },
        })
    }

    /// Derive the plan for a Stripe price ID.
    ///
    /// Unknown prices map to `Enterprise`: enterprise customers get
    /// custom-priced subscriptions that are not in the configured set.
    pub fn plan_for_price(&self, price_id: &str) -> SubscriptionPlan {
        let matches_pro = self
            .price_ids
            .pro_monthly
            .as_deref()
            .is_some_and(|p| p == price_id)
            || self
                .price_ids
                .pro_annual
                .as_deref()
                .is_some_and(|p| p == price_id);

        if matches_pro {
            SubscriptionPlan::Pro
        } else {
            SubscriptionPlan::Enterprise
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_price_maps_to_pro() {
        let mut config = StripeConfig::new("whsec_test");
        config.price_ids.pro_monthly = Some("price_pro_m".to_string());
        assert_eq!(
            config.plan_for_price("price_pro_m"),
            SubscriptionPlan::Pro
        );
    }

    #[test]
    fn unknown_price_maps_to_enterprise() {
        let config = StripeConfig::new("whsec_test");
        assert_eq!(
            config.plan_for_price("price_custom_123"),
            SubscriptionPlan::Enterprise
        );
    }
}
