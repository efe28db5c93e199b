//! Operations Core Invariant Sweep
//!
//! Runnable, read-only consistency checks over the booking/payment/outbox
//! state, intended to run periodically from `opscore-worker` and report a
//! structured summary rather than mutate anything. Grounded on the teacher's
//! own invariant-checker shape (`InvariantViolation`/`ViolationSeverity`/
//! `InvariantCheckSummary`/`InvariantChecker`), repointed at the quantified
//! properties of §8 instead of subscription-tier/spend-cap consistency.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::OpsResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantViolation {
    pub invariant: String,
    pub org_ids: Vec<Uuid>,
    pub description: String,
    pub context: serde_json::Value,
    pub severity: ViolationSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationSeverity {
    Critical,
    High,
    Medium,
    Low,
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationSeverity::Critical => write!(f, "CRITICAL"),
            ViolationSeverity::High => write!(f, "HIGH"),
            ViolationSeverity::Medium => write!(f, "MEDIUM"),
            ViolationSeverity::Low => write!(f, "LOW"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantCheckSummary {
    pub checked_at: OffsetDateTime,
    pub checks_run: usize,
    pub checks_passed: usize,
    pub checks_failed: usize,
    pub violations: Vec<InvariantViolation>,
    pub healthy: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct UnconfirmedDepositRow {
    booking_id: Uuid,
    org_id: Uuid,
    status: String,
    deposit_status: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct OverlapRow {
    booking_id: Uuid,
    org_id: Uuid,
    other_booking_id: Uuid,
    team_id: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct DuplicateProviderRefRow {
    provider: String,
    provider_ref: String,
    payment_count: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct InvoiceTotalsMismatchRow {
    invoice_id: Uuid,
    org_id: Uuid,
    status: String,
    paid_cents: i64,
    total_cents: i64,
    succeeded_sum_cents: Option<i64>,
}

#[derive(Debug, sqlx::FromRow)]
struct DuplicateDedupeKeyRow {
    org_id: Uuid,
    dedupe_key: String,
    event_count: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct StuckProcessingEventRow {
    event_id: String,
    org_id: Option<Uuid>,
    processing_started_at: OffsetDateTime,
}

/// Runs the Operations Core invariant sweep against a pool. Every check is a
/// single read-only query; none acquires a row lock, since the sweep must
/// never contend with live admin/webhook traffic.
pub struct InvariantChecker {
    pool: PgPool,
}

impl InvariantChecker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_all_checks(&self) -> OpsResult<InvariantCheckSummary> {
        let now = OffsetDateTime::now_utc();
        let mut violations = Vec::new();

        violations.extend(self.check_unconfirmed_without_paid_deposit().await?);
        violations.extend(self.check_buffered_overlaps().await?);
        violations.extend(self.check_unique_provider_ref().await?);
        violations.extend(self.check_invoice_totals_consistent().await?);
        violations.extend(self.check_outbox_dedupe_unique().await?);
        violations.extend(self.check_stuck_processing_events().await?);

        let checks_run = Self::available_checks().len();
        let checks_failed = violations
            .iter()
            .map(|v| &v.invariant)
            .collect::<std::collections::HashSet<_>>()
            .len();
        let checks_passed = checks_run - checks_failed;

        Ok(InvariantCheckSummary {
            checked_at: now,
            checks_run,
            checks_passed,
            checks_failed,
            healthy: violations.is_empty(),
            violations,
        })
    }

    /// Invariant 2 (§8): `deposit_required=true AND deposit_status != paid`
    /// implies `status != CONFIRMED`.
    async fn check_unconfirmed_without_paid_deposit(&self) -> OpsResult<Vec<InvariantViolation>> {
        let rows: Vec<UnconfirmedDepositRow> = sqlx::query_as(
            r#"
            SELECT booking_id, org_id, status, deposit_status
            FROM bookings
            WHERE status = 'CONFIRMED'
              AND deposit_required = true
              AND (deposit_status IS NULL OR deposit_status != 'paid')
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "unconfirmed_without_paid_deposit".to_string(),
                org_ids: vec![row.org_id],
                description: format!(
                    "Booking {} is CONFIRMED with deposit_status={:?}, but deposit is required",
                    row.booking_id, row.deposit_status
                ),
                context: serde_json::json!({
                    "booking_id": row.booking_id,
                    "status": row.status,
                    "deposit_status": row.deposit_status,
                }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Invariant 3 (§8): no two blocking bookings on the same team overlap
    /// once the buffer is applied. The boundary is inclusive at the start
    /// and exclusive at the end of the buffered window, matching
    /// `conflicts::bookings_conflict`.
    async fn check_buffered_overlaps(&self) -> OpsResult<Vec<InvariantViolation>> {
        let rows: Vec<OverlapRow> = sqlx::query_as(
            r#"
            SELECT a.booking_id, a.org_id, b.booking_id AS other_booking_id, a.team_id
            FROM bookings a
            JOIN bookings b ON a.team_id = b.team_id AND a.booking_id < b.booking_id
            WHERE a.status IN ('PENDING', 'CONFIRMED')
              AND b.status IN ('PENDING', 'CONFIRMED')
              AND a.starts_at < (b.starts_at + (b.duration_minutes || ' minutes')::interval + interval '30 minutes')
              AND (a.starts_at + (a.duration_minutes || ' minutes')::interval + interval '30 minutes') > b.starts_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "buffered_overlaps".to_string(),
                org_ids: vec![row.org_id],
                description: format!(
                    "Bookings {} and {} on team {} overlap once the buffer is applied",
                    row.booking_id, row.other_booking_id, row.team_id
                ),
                context: serde_json::json!({
                    "booking_id": row.booking_id,
                    "other_booking_id": row.other_booking_id,
                    "team_id": row.team_id,
                }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Invariant 5 (§8): `(provider, provider_ref)` is unique among Payments.
    async fn check_unique_provider_ref(&self) -> OpsResult<Vec<InvariantViolation>> {
        let rows: Vec<DuplicateProviderRefRow> = sqlx::query_as(
            r#"
            SELECT provider, provider_ref, COUNT(*) AS payment_count
            FROM payments
            WHERE provider_ref IS NOT NULL
            GROUP BY provider, provider_ref
            HAVING COUNT(*) > 1
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "unique_provider_ref".to_string(),
                org_ids: vec![],
                description: format!(
                    "{} payments share provider_ref '{}' for provider '{}'",
                    row.payment_count, row.provider_ref, row.provider
                ),
                context: serde_json::json!({
                    "provider": row.provider,
                    "provider_ref": row.provider_ref,
                    "payment_count": row.payment_count,
                }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Invariant 6 (§8): `paid_cents` equals the sum of succeeded payments,
    /// and `status` reflects that sum correctly.
    async fn check_invoice_totals_consistent(&self) -> OpsResult<Vec<InvariantViolation>> {
        let rows: Vec<InvoiceTotalsMismatchRow> = sqlx::query_as(
            r#"
            SELECT i.invoice_id, i.org_id, i.status, i.paid_cents, i.total_cents,
                   (SELECT SUM(p.amount_cents) FROM payments p
                    WHERE p.invoice_id = i.invoice_id AND p.status = 'SUCCEEDED') AS succeeded_sum_cents
            FROM invoices i
            WHERE i.paid_cents != COALESCE(
                (SELECT SUM(p.amount_cents) FROM payments p
                 WHERE p.invoice_id = i.invoice_id AND p.status = 'SUCCEEDED'), 0)
               OR (i.status = 'PAID' AND i.paid_cents < i.total_cents)
               OR (i.status = 'PARTIAL' AND (i.paid_cents <= 0 OR i.paid_cents >= i.total_cents))
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "invoice_totals_consistent".to_string(),
                org_ids: vec![row.org_id],
                description: format!(
                    "Invoice {} has paid_cents={} total_cents={} status={} but succeeded payments sum to {:?}",
                    row.invoice_id, row.paid_cents, row.total_cents, row.status, row.succeeded_sum_cents
                ),
                context: serde_json::json!({
                    "invoice_id": row.invoice_id,
                    "paid_cents": row.paid_cents,
                    "total_cents": row.total_cents,
                    "status": row.status,
                    "succeeded_sum_cents": row.succeeded_sum_cents,
                }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Invariant 7 (§8): `(org_id, dedupe_key)` is unique among OutboxEvents.
    async fn check_outbox_dedupe_unique(&self) -> OpsResult<Vec<InvariantViolation>> {
        let rows: Vec<DuplicateDedupeKeyRow> = sqlx::query_as(
            r#"
            SELECT org_id, dedupe_key, COUNT(*) AS event_count
            FROM outbox_events
            GROUP BY org_id, dedupe_key
            HAVING COUNT(*) > 1
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "outbox_dedupe_unique".to_string(),
                org_ids: vec![row.org_id],
                description: format!(
                    "{} outbox events share dedupe_key '{}' for org {}",
                    row.event_count, row.dedupe_key, row.org_id
                ),
                context: serde_json::json!({
                    "dedupe_key": row.dedupe_key,
                    "event_count": row.event_count,
                }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Flags StripeEvents left `processing` well past the stuck-processing
    /// timeout, which a crashed worker can leave behind; these block
    /// `claim_event`'s recovery window from opening until the sweep surfaces
    /// them for manual attention. Informational, not a correctness violation
    /// (the claim logic self-heals), hence `Medium` rather than `Critical`.
    async fn check_stuck_processing_events(&self) -> OpsResult<Vec<InvariantViolation>> {
        let rows: Vec<StuckProcessingEventRow> = sqlx::query_as(
            r#"
            SELECT event_id, org_id, processing_started_at
            FROM stripe_events
            WHERE status = 'processing'
              AND processing_started_at < now() - interval '30 minutes'
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "stuck_processing_events".to_string(),
                org_ids: row.org_id.into_iter().collect(),
                description: format!(
                    "StripeEvent {} has been 'processing' since {}",
                    row.event_id, row.processing_started_at
                ),
                context: serde_json::json!({
                    "event_id": row.event_id,
                    "processing_started_at": row.processing_started_at,
                }),
                severity: ViolationSeverity::Medium,
            })
            .collect())
    }

    pub async fn run_check(&self, name: &str) -> OpsResult<Vec<InvariantViolation>> {
        match name {
            "unconfirmed_without_paid_deposit" => self.check_unconfirmed_without_paid_deposit().await,
            "buffered_overlaps" => self.check_buffered_overlaps().await,
            "unique_provider_ref" => self.check_unique_provider_ref().await,
            "invoice_totals_consistent" => self.check_invoice_totals_consistent().await,
            "outbox_dedupe_unique" => self.check_outbox_dedupe_unique().await,
            "stuck_processing_events" => self.check_stuck_processing_events().await,
            _ => Ok(vec![]),
        }
    }

    pub fn available_checks() -> Vec<&'static str> {
        vec![
            "unconfirmed_without_paid_deposit",
            "buffered_overlaps",
            "unique_provider_ref",
            "invoice_totals_consistent",
            "outbox_dedupe_unique",
            "stuck_processing_events",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn violation_severity_display() {
        assert_eq!(ViolationSeverity::Critical.to_string(), "CRITICAL");
        assert_eq!(ViolationSeverity::Medium.to_string(), "MEDIUM");
    }

    #[test]
    fn available_checks_lists_all_six() {
        let checks = InvariantChecker::available_checks();
        assert_eq!(checks.len(), 6);
        assert!(checks.contains(&"buffered_overlaps"));
        assert!(checks.contains(&"outbox_dedupe_unique"));
    }
}
