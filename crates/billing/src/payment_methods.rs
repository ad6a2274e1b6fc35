//! Payment method storage

use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};

/// A stored payment method.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PaymentMethodRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub stripe_payment_method_id: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub method_type: String,
    pub brand: Option<String>,
    pub last4: Option<String>,
    pub exp_month: Option<i32>,
    pub exp_year: Option<i32>,
    pub is_default: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Card details to persist for a payment method.
#[derive(Debug, Clone, Default)]
pub struct PaymentMethodDetails {
    pub method_type: String,
    pub brand: Option<String>,
    pub last4: Option<String>,
    pub exp_month: Option<i32>,
    pub exp_year: Option<i32>,
}

/// Stores and queries the user's saved payment methods.
#[derive(Clone)]
pub struct PaymentMethodService {
    pool: PgPool,
}

impl PaymentMethodService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upsert a payment method keyed on the Stripe payment method ID.
    pub async fn upsert(
        &self,
        user_id: Uuid,
        stripe_payment_method_id: &str,
        details: &PaymentMethodDetails,
    ) -> BillingResult<Uuid> {
        let method_type = if details.method_type.is_empty() {
            "card"
        } else {
            details.method_type.as_str()
        };

        let (id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO payment_methods (
                user_id, stripe_payment_method_id, type, brand, last4,
                exp_month, exp_year, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, NOW(), NOW()
            )
            ON CONFLICT (stripe_payment_method_id) DO UPDATE SET
                type = EXCLUDED.type,
                brand = EXCLUDED.brand,
                last4 = EXCLUDED.last4,
                exp_month = EXCLUDED.exp_month,
                exp_year = EXCLUDED.exp_year,
                updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(stripe_payment_method_id)
        .bind(method_type)
        .bind(details.brand.as_ref())
        .bind(details.last4.as_ref())
        .bind(details.exp_month)
        .bind(details.exp_year)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    /// Saved payment methods for a user, default first.
    pub async fn list_for_user(&self, user_id: Uuid) -> BillingResult<Vec<PaymentMethodRecord>> {
        let records = sqlx::query_as::<_, PaymentMethodRecord>(
            r#"
            SELECT * FROM payment_methods
            WHERE user_id = $1
            ORDER BY is_default DESC, created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Make one payment method the default for a user.
    ///
    /// Clear-then-set inside a transaction so at most one row is flagged.
    pub async fn set_default(
        &self,
        user_id: Uuid,
        stripe_payment_method_id: &str,
    ) -> BillingResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE payment_methods SET is_default = FALSE, updated_at = NOW() WHERE user_id = $1",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            r#"
            UPDATE payment_methods
            SET is_default = TRUE, updated_at = NOW()
            WHERE user_id = $1 AND stripe_payment_method_id = $2
            "#,
        )
        .bind(user_id)
        .bind(stripe_payment_method_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(BillingError::PaymentMethodNotFound(
                stripe_payment_method_id.to_string(),
            ));
        }

        tx.commit().await?;

        tracing::info!(
            user_id = %user_id,
            payment_method_id = %stripe_payment_method_id,
            "Default payment method updated"
        );

        Ok(())
    }
}
