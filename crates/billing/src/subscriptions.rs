//! Subscription state projection
//!
//! Re-derives the local subscription row from a Stripe subscription
//! payload. All writes are upserts keyed on `stripe_subscription_id`, so
//! replaying a delivery (or two concurrent deliveries for the same
//! subscription) serializes at the database's unique constraint instead of
//! producing duplicate rows.

use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::config::StripeConfig;
use crate::error::BillingResult;
use crate::events::SubscriptionObject;

/// A local subscription row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SubscriptionRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub stripe_subscription_id: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub stripe_price_id: Option<String>,
    pub status: String,
    pub plan: String,
    pub current_period_start: Option<OffsetDateTime>,
    pub current_period_end: Option<OffsetDateTime>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Projects Stripe subscription state into the local store.
#[derive(Clone)]
pub struct SubscriptionService {
    config: StripeConfig,
    pool: PgPool,
}

impl SubscriptionService {
    pub fn new(config: StripeConfig, pool: PgPool) -> Self {
        Self { config, pool }
    }

    /// Upsert the subscription row from a webhook payload.
    ///
    /// Idempotent: replaying the same event yields the same final row
    /// state (modulo `updated_at`, which is last-write-wins).
    pub async fn sync_from_provider(
        &self,
        user_id: Uuid,
        subscription: &SubscriptionObject,
    ) -> BillingResult<()> {
        let status = subscription.status.as_str();
        let price_id = subscription.price_id().map(str::to_string);

        // Plan from metadata when the checkout flow stamped one, otherwise
        // derived from the price on the subscription.
        let plan = subscription
            .metadata
            .get("plan")
            .cloned()
            .or_else(|| {
                price_id
                    .as_deref()
                    .map(|p| self.config.plan_for_price(p).as_str().to_string())
            })
            .unwrap_or_else(|| "free".to_string());

        let current_period_start =
            OffsetDateTime::from_unix_timestamp(subscription.current_period_start)
                .unwrap_or_else(|_| OffsetDateTime::now_utc());
        let current_period_end =
            OffsetDateTime::from_unix_timestamp(subscription.current_period_end)
                .unwrap_or_else(|_| OffsetDateTime::now_utc());
        let canceled_at = subscription.canceled_at.map(|t| {
            OffsetDateTime::from_unix_timestamp(t).unwrap_or_else(|_| OffsetDateTime::now_utc())
        });

        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                user_id, stripe_subscription_id, stripe_customer_id, stripe_price_id,
                status, plan, current_period_start, current_period_end,
                cancel_at_period_end, canceled_at, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), NOW()
            )
            ON CONFLICT (stripe_subscription_id) DO UPDATE SET
                stripe_customer_id = EXCLUDED.stripe_customer_id,
                stripe_price_id = EXCLUDED.stripe_price_id,
                status = EXCLUDED.status,
                plan = EXCLUDED.plan,
                current_period_start = EXCLUDED.current_period_start,
                current_period_end = EXCLUDED.current_period_end,
                cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                canceled_at = EXCLUDED.canceled_at,
                updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(&subscription.id)
        .bind(&subscription.customer)
        .bind(&price_id)
        .bind(status)
        .bind(&plan)
        .bind(current_period_start)
        .bind(current_period_end)
        .bind(subscription.cancel_at_period_end)
        .bind(canceled_at)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            user_id = %user_id,
            subscription_id = %subscription.id,
            status = %status,
            plan = %plan,
            "Synced subscription from Stripe"
        );

        Ok(())
    }

    /// Mark a subscription canceled without deleting the row.
    ///
    /// The row is retained for billing history. Returns whether a row was
    /// updated; a deletion event for an unknown subscription is logged and
    /// acknowledged by the caller rather than failed.
    pub async fn mark_canceled(&self, stripe_subscription_id: &str) -> BillingResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = 'canceled',
                canceled_at = COALESCE(canceled_at, NOW()),
                updated_at = NOW()
            WHERE stripe_subscription_id = $1
            "#,
        )
        .bind(stripe_subscription_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// The user's current subscription, preferring non-canceled rows.
    pub async fn get_for_user(&self, user_id: Uuid) -> BillingResult<Option<SubscriptionRecord>> {
        let record = sqlx::query_as::<_, SubscriptionRecord>(
            r#"
            SELECT * FROM subscriptions
            WHERE user_id = $1
            ORDER BY (status IN ('active', 'trialing', 'past_due')) DESC, updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }
}
