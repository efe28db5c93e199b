//! Enqueue contract: any DB transaction that must produce a side-effect inserts
//! an `OutboxEvent` in the same transaction as the business change. Uniqueness
//! on `(org_id, dedupe_key)` makes this idempotent — a matching row already
//! present is a no-op, not an error, so callers can enqueue unconditionally on
//! every retry of the triggering transaction.

use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::error::OpsResult;

use super::types::{EmailEvent, OutboxEvent, OutboxKind};

/// Enqueues a generic outbox event. Returns the row whether it was just
/// inserted or already existed — callers that need "did I just create this"
/// can compare `attempts == 0 && status == Pending`, but the common case is to
/// not care, since enqueue is meant to be fire-and-forget-idempotent.
pub async fn enqueue_event(
    tx: &mut Transaction<'_, Postgres>,
    org_id: Uuid,
    kind: OutboxKind,
    payload: serde_json::Value,
    dedupe_key: &str,
) -> OpsResult<OutboxEvent> {
    let inserted = sqlx::query_as::<_, OutboxEvent>(
        r#"INSERT INTO outbox_events (event_id, org_id, kind, status, attempts, next_attempt_at, payload, dedupe_key, created_at)
           VALUES (gen_random_uuid(), $1, $2, 'pending', 0, now(), $3, $4, now())
           ON CONFLICT (org_id, dedupe_key) DO NOTHING
           RETURNING *"#,
    )
    .bind(org_id)
    .bind(kind)
    .bind(&payload)
    .bind(dedupe_key)
    .fetch_optional(&mut **tx)
    .await?;

    if let Some(event) = inserted {
        return Ok(event);
    }

    let existing = sqlx::query_as::<_, OutboxEvent>(
        "SELECT * FROM outbox_events WHERE org_id = $1 AND dedupe_key = $2",
    )
    .bind(org_id)
    .bind(dedupe_key)
    .fetch_one(&mut **tx)
    .await?;
    Ok(existing)
}

/// Composes an email: inserts the `EmailEvent` record (so observers can see
/// the message before delivery) and an `email`-kind `OutboxEvent` sharing the
/// same `dedupe_key`. Both inserts are idempotent no-ops on replay.
#[allow(clippy::too_many_arguments)]
pub async fn enqueue_email(
    tx: &mut Transaction<'_, Postgres>,
    org_id: Uuid,
    recipient: &str,
    subject: &str,
    body: &str,
    booking_id: Option<Uuid>,
    invoice_id: Option<Uuid>,
    email_type: &str,
    dedupe_key: &str,
) -> OpsResult<OutboxEvent> {
    sqlx::query_as::<_, EmailEvent>(
        r#"INSERT INTO email_events
               (event_id, org_id, dedupe_key, recipient, subject, body, booking_id, invoice_id, email_type, created_at)
           VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7, $8, now())
           ON CONFLICT (org_id, dedupe_key) DO NOTHING
           RETURNING *"#,
    )
    .bind(org_id)
    .bind(dedupe_key)
    .bind(recipient)
    .bind(subject)
    .bind(body)
    .bind(booking_id)
    .bind(invoice_id)
    .bind(email_type)
    .fetch_optional(&mut **tx)
    .await?;

    let payload = serde_json::json!({
        "recipient": recipient,
        "subject": subject,
        "body": body,
        "booking_id": booking_id,
        "invoice_id": invoice_id,
        "email_type": email_type,
    });

    enqueue_event(tx, org_id, OutboxKind::Email, payload, dedupe_key).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupe_key_format_for_dunning_email_matches_spec() {
        let invoice_id = Uuid::from_u128(1);
        let key = format!("invoice:{invoice_id}:dunning:payment_failed");
        assert!(key.starts_with("invoice:"));
        assert!(key.ends_with(":dunning:payment_failed"));
    }
}
