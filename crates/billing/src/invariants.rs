//! Billing consistency invariants
//!
//! Runnable read-only checks over the reconciled state. Useful after a
//! webhook replay or a support incident to confirm the store is in a
//! valid shape. Checks only read, never write.

use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::BillingResult;

/// A single invariant violation with enough context to debug it.
#[derive(Debug, Clone, Serialize)]
pub struct InvariantViolation {
    /// Which invariant was violated
    pub invariant: String,
    /// User(s) affected
    pub user_ids: Vec<Uuid>,
    /// Human-readable description
    pub description: String,
    /// Additional context for debugging
    pub context: serde_json::Value,
    pub severity: ViolationSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ViolationSeverity {
    /// System may be billing incorrectly
    Critical,
    /// Data inconsistency that needs attention
    High,
    /// Minor inconsistency, informational
    Low,
}

/// Summary of a full invariant sweep.
#[derive(Debug, Clone, Serialize)]
pub struct InvariantCheckSummary {
    pub checked_at: OffsetDateTime,
    pub checks_run: usize,
    pub violations: Vec<InvariantViolation>,
    pub healthy: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct MultipleActiveSubsRow {
    user_id: Uuid,
    sub_count: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct CanceledWithoutTimestampRow {
    user_id: Uuid,
    stripe_subscription_id: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct NonPositivePaidInvoiceRow {
    user_id: Uuid,
    stripe_invoice_id: String,
    amount_cents: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct ActiveWithoutPeriodEndRow {
    user_id: Uuid,
    stripe_subscription_id: Option<String>,
    status: String,
}

/// Service for running billing invariant checks
pub struct InvariantChecker {
    pool: PgPool,
}

impl InvariantChecker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run all checks and return a summary.
    pub async fn run_all_checks(&self) -> BillingResult<InvariantCheckSummary> {
        let now = OffsetDateTime::now_utc();
        let mut violations = Vec::new();

        violations.extend(self.check_single_active_subscription().await?);
        violations.extend(self.check_canceled_has_timestamp().await?);
        violations.extend(self.check_paid_invoices_positive().await?);
        violations.extend(self.check_active_has_period_end().await?);

        Ok(InvariantCheckSummary {
            checked_at: now,
            checks_run: 4,
            healthy: violations.is_empty(),
            violations,
        })
    }

    /// At most one active subscription per user. More than one means the
    /// user may be double-billed.
    async fn check_single_active_subscription(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<MultipleActiveSubsRow> = sqlx::query_as(
            r#"
            SELECT user_id, COUNT(*) as sub_count
            FROM subscriptions
            WHERE status IN ('active', 'trialing', 'past_due')
            GROUP BY user_id
            HAVING COUNT(*) > 1
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "single_active_subscription".to_string(),
                user_ids: vec![row.user_id],
                description: format!(
                    "User has {} active subscriptions (expected 1)",
                    row.sub_count
                ),
                context: serde_json::json!({ "subscription_count": row.sub_count }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Canceled subscriptions keep their row and must carry `canceled_at`.
    async fn check_canceled_has_timestamp(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<CanceledWithoutTimestampRow> = sqlx::query_as(
            r#"
            SELECT user_id, stripe_subscription_id
            FROM subscriptions
            WHERE status = 'canceled' AND canceled_at IS NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "canceled_has_timestamp".to_string(),
                user_ids: vec![row.user_id],
                description: "Canceled subscription has no canceled_at timestamp".to_string(),
                context: serde_json::json!({
                    "stripe_subscription_id": row.stripe_subscription_id,
                }),
                severity: ViolationSeverity::Low,
            })
            .collect())
    }

    /// Paid invoices should carry a positive amount.
    async fn check_paid_invoices_positive(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<NonPositivePaidInvoiceRow> = sqlx::query_as(
            r#"
            SELECT user_id, stripe_invoice_id, amount_cents
            FROM invoices
            WHERE status = 'paid' AND amount_cents < 0
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "paid_invoices_positive".to_string(),
                user_ids: vec![row.user_id],
                description: format!(
                    "Paid invoice {} has negative amount {}",
                    row.stripe_invoice_id, row.amount_cents
                ),
                context: serde_json::json!({
                    "stripe_invoice_id": row.stripe_invoice_id,
                    "amount_cents": row.amount_cents,
                }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Active subscriptions must have a current period end; without one,
    /// renewal reconciliation has nothing to compare against.
    async fn check_active_has_period_end(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<ActiveWithoutPeriodEndRow> = sqlx::query_as(
            r#"
            SELECT user_id, stripe_subscription_id, status
            FROM subscriptions
            WHERE status IN ('active', 'trialing') AND current_period_end IS NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "active_has_period_end".to_string(),
                user_ids: vec![row.user_id],
                description: format!(
                    "Subscription with status '{}' has no current_period_end",
                    row.status
                ),
                context: serde_json::json!({
                    "stripe_subscription_id": row.stripe_subscription_id,
                }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }
}
