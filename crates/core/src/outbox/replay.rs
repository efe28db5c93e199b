//! Operator-triggered replay for dead-lettered work, covering the three
//! `/v1/admin/*/replay` endpoints: generic outbox dead-letter, the email
//! failure DLQ, and the export dead-letter (synchronous push-and-report).

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{OpsError, OpsResult};

use super::delivery::{deliver_export_event, DeliveryOutcome, DeliveryPolicy, ExportAdapter};
use super::types::{EmailFailure, EmailFailureStatus, OutboxEvent, OutboxKind, OutboxStatus};
use crate::payments::CircuitBreaker;

/// Resets a dead generic outbox event back to `pending` with `attempts` reset
/// to 0 and `next_attempt_at = now`, so the next delivery sweep picks it up
/// fresh. The payload is untouched — replay does not re-derive content.
pub async fn replay_outbox_event(pool: &PgPool, event_id: Uuid) -> OpsResult<OutboxEvent> {
    let event = sqlx::query_as::<_, OutboxEvent>("SELECT * FROM outbox_events WHERE event_id = $1")
        .bind(event_id)
        .fetch_optional(pool)
        .await?
        .ok_or(OpsError::NotFound { entity: "outbox_event" })?;

    if event.status != OutboxStatus::Dead {
        return Err(OpsError::Precondition {
            reason: "only dead-lettered events can be replayed",
        });
    }

    let replayed = sqlx::query_as::<_, OutboxEvent>(
        r#"UPDATE outbox_events
           SET status = 'pending', attempts = 0, next_attempt_at = now(), last_error = NULL
           WHERE event_id = $1
           RETURNING *"#,
    )
    .bind(event_id)
    .fetch_one(pool)
    .await?;
    Ok(replayed)
}

/// Replays a dead `EmailFailure` by composing a *new* outbox event rather than
/// resurrecting the original, so the original `(org_id, dedupe_key)` pair
/// stays untouched for future idempotent sends; the replay's own dedupe key
/// embeds the failure id so a second replay click is itself idempotent.
pub async fn replay_email_failure(pool: &PgPool, failure_id: Uuid) -> OpsResult<OutboxEvent> {
    let mut tx = pool.begin().await?;
    let failure = sqlx::query_as::<_, EmailFailure>(
        "SELECT * FROM email_failures WHERE failure_id = $1 FOR UPDATE",
    )
    .bind(failure_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(OpsError::NotFound { entity: "email_failure" })?;

    if failure.status != EmailFailureStatus::Dead {
        return Err(OpsError::Precondition {
            reason: "only dead-lettered email failures can be replayed",
        });
    }

    let dedupe_key = format!("manual_resend:{failure_id}");
    let payload = serde_json::json!({
        "recipient": failure.recipient,
        "subject": failure.subject,
        "body": failure.body,
        "email_type": "manual_resend",
    });

    let event = super::enqueue::enqueue_event(
        &mut tx,
        failure.org_id,
        OutboxKind::Email,
        payload,
        &dedupe_key,
    )
    .await?;

    sqlx::query(
        "UPDATE email_failures SET status = 'sent' WHERE failure_id = $1",
    )
    .bind(failure_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(event)
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ExportReplayResult {
    pub success: bool,
    pub attempts: i32,
    pub last_error_code: Option<String>,
}

/// Synchronous immediate retry for a dead export event, per the
/// `/v1/admin/export-dead-letter/{event_id}/replay` contract: the call blocks
/// on the adapter and reports the outcome directly rather than re-queuing for
/// the next sweep, since operators replaying an export want to know now.
pub async fn replay_export_event(
    pool: &PgPool,
    event_id: Uuid,
    adapter: &dyn ExportAdapter,
    breaker: &CircuitBreaker,
    policy: &DeliveryPolicy,
) -> OpsResult<ExportReplayResult> {
    let event = sqlx::query_as::<_, OutboxEvent>("SELECT * FROM outbox_events WHERE event_id = $1")
        .bind(event_id)
        .fetch_optional(pool)
        .await?
        .ok_or(OpsError::NotFound { entity: "outbox_event" })?;

    if event.kind != OutboxKind::Export {
        return Err(OpsError::Precondition {
            reason: "event is not an export event",
        });
    }
    if event.status != OutboxStatus::Dead {
        return Err(OpsError::Precondition {
            reason: "only dead-lettered export events can be replayed",
        });
    }

    let outcome = deliver_export_event(pool, &event, adapter, breaker, policy).await?;
    let refreshed = sqlx::query_as::<_, OutboxEvent>(
        "SELECT * FROM outbox_events WHERE event_id = $1",
    )
    .bind(event_id)
    .fetch_one(pool)
    .await?;

    Ok(ExportReplayResult {
        success: matches!(outcome, DeliveryOutcome::Sent),
        attempts: refreshed.attempts,
        last_error_code: refreshed.last_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_replay_dedupe_key_embeds_failure_id() {
        let failure_id = Uuid::from_u128(42);
        let key = format!("manual_resend:{failure_id}");
        assert!(key.starts_with("manual_resend:"));
    }
}
