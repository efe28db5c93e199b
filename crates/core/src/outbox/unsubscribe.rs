//! Per-recipient, per-scope unsubscribe set. Consulted by `delivery` before
//! sending a scoped email (`marketing`/`nps`); transactional email types carry
//! no scope and bypass this check entirely.

use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::error::OpsResult;

use super::types::UnsubscribeScope;

pub async fn is_unsubscribed<'e, E>(
    executor: E,
    org_id: Uuid,
    recipient: &str,
    scope: UnsubscribeScope,
) -> OpsResult<bool>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: Option<(Uuid,)> = sqlx::query_as(
        "SELECT org_id FROM unsubscribes WHERE org_id = $1 AND recipient = $2 AND scope = $3",
    )
    .bind(org_id)
    .bind(recipient)
    .bind(scope)
    .fetch_optional(executor)
    .await?;
    Ok(row.is_some())
}

/// Idempotent: unsubscribing twice for the same `(org_id, recipient, scope)`
/// is a no-op, matching the outbox enqueue convention elsewhere in this module.
pub async fn set_unsubscribed<'e, E>(
    executor: E,
    org_id: Uuid,
    recipient: &str,
    scope: UnsubscribeScope,
) -> OpsResult<()>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"INSERT INTO unsubscribes (org_id, recipient, scope, created_at)
           VALUES ($1, $2, $3, now())
           ON CONFLICT (org_id, recipient, scope) DO NOTHING"#,
    )
    .bind(org_id)
    .bind(recipient)
    .bind(scope)
    .execute(executor)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_roundtrips_through_email_type() {
        assert_eq!(
            UnsubscribeScope::for_email_type("marketing"),
            Some(UnsubscribeScope::Marketing)
        );
        assert_eq!(
            UnsubscribeScope::for_email_type("booking_confirmation"),
            None
        );
    }
}
