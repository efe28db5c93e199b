//! `Idempotency-Key` replay cache: `(org_id, action, key)` -> the first
//! response this combination produced, replayed verbatim on a re-seen key
//! within the configured TTL. Backed by the `idempotency_records` table
//! rather than an in-process map so replays are correct across multiple
//! `opscore-api` instances behind a load balancer.

use axum::http::StatusCode;
use sqlx::PgPool;
use uuid::Uuid;

use opscore_shared::tenancy::OrgId;

use crate::error::ApiResult;

pub const HEADER: &str = "idempotency-key";

#[derive(Debug, sqlx::FromRow)]
struct IdempotencyRow {
    response_body: serde_json::Value,
    status_code: i32,
}

/// Looks up a previously recorded response for `(org_id, action, key)`. Rows
/// older than `ttl_seconds` are treated as absent (and naturally get replaced
/// by the next `store` call, since the insert is `ON CONFLICT DO UPDATE`).
pub async fn lookup(
    pool: &PgPool,
    org_id: OrgId,
    action: &str,
    key: &str,
    ttl_seconds: u64,
) -> ApiResult<Option<(StatusCode, serde_json::Value)>> {
    let row = sqlx::query_as::<_, IdempotencyRow>(
        r#"SELECT response_body, status_code FROM idempotency_records
           WHERE org_id = $1 AND action = $2 AND key = $3
             AND created_at > now() - ($4 || ' seconds')::interval"#,
    )
    .bind(org_id.0)
    .bind(action)
    .bind(key)
    .bind(ttl_seconds as i64)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| {
        let status = StatusCode::from_u16(r.status_code as u16).unwrap_or(StatusCode::OK);
        (status, r.response_body)
    }))
}

/// Records the response for `(org_id, action, key)` so a retried request with
/// the same key replays this body instead of re-running the mutation. Safe to
/// call unconditionally after a successful handler body: `ON CONFLICT DO
/// UPDATE` means a key reused past its TTL just refreshes the recorded
/// response rather than erroring.
pub async fn store(
    pool: &PgPool,
    org_id: OrgId,
    action: &str,
    key: &str,
    status: StatusCode,
    body: &serde_json::Value,
) -> ApiResult<()> {
    sqlx::query(
        r#"INSERT INTO idempotency_records (record_id, org_id, action, key, response_body, status_code, created_at)
           VALUES ($1, $2, $3, $4, $5, $6, now())
           ON CONFLICT (org_id, action, key) DO UPDATE SET
               response_body = EXCLUDED.response_body,
               status_code = EXCLUDED.status_code,
               created_at = now()"#,
    )
    .bind(Uuid::new_v4())
    .bind(org_id.0)
    .bind(action)
    .bind(key)
    .bind(body)
    .bind(status.as_u16() as i32)
    .execute(pool)
    .await?;

    Ok(())
}
