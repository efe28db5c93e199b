//! Read-side list queries for the admin dead-letter and email-failure
//! endpoints. Kept separate from `delivery`/`enqueue` since nothing here
//! touches delivery state, only reports it.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::OpsResult;

use super::types::{EmailFailure, EmailFailureStatus, OutboxEvent, OutboxKind, OutboxStatus};

/// Dead-lettered outbox events for an org, optionally narrowed to one kind,
/// newest first. `GET /v1/admin/outbox/dead-letter` passes `kind = None` to
/// see both email and export dead letters in one list.
pub async fn list_dead_letter_events(
    pool: &PgPool,
    org_id: Uuid,
    kind: Option<OutboxKind>,
    limit: i64,
) -> OpsResult<Vec<OutboxEvent>> {
    let rows = sqlx::query_as::<_, OutboxEvent>(
        r#"SELECT * FROM outbox_events
           WHERE org_id = $1 AND status = $2 AND ($3::text IS NULL OR kind = $3)
           ORDER BY created_at DESC
           LIMIT $4"#,
    )
    .bind(org_id)
    .bind(OutboxStatus::Dead)
    .bind(kind.map(|k| k.as_str()))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// `GET /v1/admin/export-dead-letter` — dead-lettered export events only, with
/// offset pagination (the export DLQ is expected to be inspected page by page
/// rather than tailed like the generic outbox view).
pub async fn list_export_dead_letter(
    pool: &PgPool,
    org_id: Uuid,
    limit: i64,
    offset: i64,
) -> OpsResult<Vec<OutboxEvent>> {
    let rows = sqlx::query_as::<_, OutboxEvent>(
        r#"SELECT * FROM outbox_events
           WHERE org_id = $1 AND kind = 'export' AND status = 'dead'
           ORDER BY created_at DESC
           LIMIT $2 OFFSET $3"#,
    )
    .bind(org_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// `GET /v1/admin/email-failures` — the email-specific DLQ, optionally
/// narrowed by status.
pub async fn list_email_failures(
    pool: &PgPool,
    org_id: Uuid,
    status: Option<EmailFailureStatus>,
    limit: i64,
    offset: i64,
) -> OpsResult<Vec<EmailFailure>> {
    let rows = sqlx::query_as::<_, EmailFailure>(
        r#"SELECT * FROM email_failures
           WHERE org_id = $1 AND ($2::text IS NULL OR status = $2)
           ORDER BY next_retry_at ASC
           LIMIT $3 OFFSET $4"#,
    )
    .bind(org_id)
    .bind(status.map(|s| match s {
        EmailFailureStatus::Pending => "pending",
        EmailFailureStatus::Sent => "sent",
        EmailFailureStatus::Dead => "dead",
    }))
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dead_letter_kind_filter_uses_as_str() {
        assert_eq!(OutboxKind::Email.as_str(), "email");
        assert_eq!(OutboxKind::Export.as_str(), "export");
    }
}
