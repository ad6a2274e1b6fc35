//! Invoice state projection

use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::BillingResult;
use crate::events::InvoiceObject;

/// A local invoice row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct InvoiceRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub stripe_invoice_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub hosted_invoice_url: Option<String>,
    pub invoice_pdf_url: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Projects Stripe invoice state into the local store.
#[derive(Clone)]
pub struct InvoiceService {
    pool: PgPool,
}

impl InvoiceService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upsert an invoice row from a webhook payload.
    ///
    /// Keyed on `stripe_invoice_id`, so replayed deliveries update the
    /// existing row instead of inserting a duplicate.
    pub async fn store_invoice(
        &self,
        user_id: Uuid,
        invoice: &InvoiceObject,
        status: &str,
    ) -> BillingResult<Uuid> {
        // Link to the local subscription row when the invoice carries one.
        let subscription_id: Option<Uuid> = match invoice.subscription.as_deref() {
            Some(stripe_sub_id) => {
                let row: Option<(Uuid,)> = sqlx::query_as(
                    "SELECT id FROM subscriptions WHERE stripe_subscription_id = $1",
                )
                .bind(stripe_sub_id)
                .fetch_optional(&self.pool)
                .await?;
                row.map(|(id,)| id)
            }
            None => None,
        };

        let amount_cents = invoice.amount_paid.or(invoice.amount_due).unwrap_or(0);
        let currency = invoice.currency.as_deref().unwrap_or("usd");

        let (id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO invoices (
                user_id, subscription_id, stripe_invoice_id, amount_cents,
                currency, status, hosted_invoice_url, invoice_pdf_url,
                created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW()
            )
            ON CONFLICT (stripe_invoice_id) DO UPDATE SET
                subscription_id = COALESCE(EXCLUDED.subscription_id, invoices.subscription_id),
                amount_cents = EXCLUDED.amount_cents,
                status = EXCLUDED.status,
                hosted_invoice_url = EXCLUDED.hosted_invoice_url,
                invoice_pdf_url = EXCLUDED.invoice_pdf_url,
                updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(subscription_id)
        .bind(&invoice.id)
        .bind(amount_cents)
        .bind(currency)
        .bind(status)
        .bind(invoice.hosted_invoice_url.as_ref())
        .bind(invoice.invoice_pdf.as_ref())
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            user_id = %user_id,
            invoice_id = %id,
            stripe_invoice_id = %invoice.id,
            amount_cents = amount_cents,
            status = %status,
            "Stored invoice"
        );

        Ok(id)
    }

    /// Invoice history for a user, newest first.
    pub async fn list_for_user(&self, user_id: Uuid) -> BillingResult<Vec<InvoiceRecord>> {
        let records = sqlx::query_as::<_, InvoiceRecord>(
            "SELECT * FROM invoices WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
