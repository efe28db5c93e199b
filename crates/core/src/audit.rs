//! Append-only audit trail for operator actions whose effect on the system
//! isn't fully captured by the row they touched — policy overrides today,
//! any future manual intervention tomorrow. Grounded on `refund.rs`'s
//! audit-before-external-call convention, generalized to a standalone table
//! rather than one scoped to refunds specifically.

use serde::Serialize;
use sqlx::{FromRow, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::OpsResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum AuditKind {
    DowngradeDeposit,
    RiskBandOverride,
    CancellationException,
}

/// `(audit_id, org_id, booking_id?, kind, actor, reason, before_snapshot,
/// after_snapshot, created_at)`. Rows are never updated or deleted.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AuditRecord {
    pub audit_id: Uuid,
    pub org_id: Uuid,
    pub booking_id: Option<Uuid>,
    pub kind: AuditKind,
    pub actor: String,
    pub reason: String,
    pub before_snapshot: serde_json::Value,
    pub after_snapshot: serde_json::Value,
    pub created_at: OffsetDateTime,
}

#[allow(clippy::too_many_arguments)]
pub async fn record_audit(
    tx: &mut Transaction<'_, Postgres>,
    org_id: Uuid,
    booking_id: Option<Uuid>,
    kind: AuditKind,
    actor: &str,
    reason: &str,
    before_snapshot: serde_json::Value,
    after_snapshot: serde_json::Value,
) -> OpsResult<AuditRecord> {
    let record = sqlx::query_as::<_, AuditRecord>(
        r#"INSERT INTO audit_records
               (audit_id, org_id, booking_id, kind, actor, reason, before_snapshot, after_snapshot, created_at)
           VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7, now())
           RETURNING *"#,
    )
    .bind(org_id)
    .bind(booking_id)
    .bind(kind)
    .bind(actor)
    .bind(reason)
    .bind(before_snapshot)
    .bind(after_snapshot)
    .fetch_one(&mut **tx)
    .await?;
    Ok(record)
}
