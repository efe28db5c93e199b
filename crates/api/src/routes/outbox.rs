//! Outbox & Delivery Pipeline admin surface: dead-letter inspection and
//! operator-triggered replay.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use opscore_core::outbox::{
    list_dead_letter_events, list_email_failures, list_export_dead_letter, replay_email_failure,
    replay_export_event, replay_outbox_event, EmailFailure, EmailFailureStatus, NoopExportAdapter,
    OutboxEvent, OutboxKind,
};
use opscore_core::payments::CircuitBreaker;
use opscore_core::OpsError;
use opscore_shared::rate_limit::RateLimitOutcome;

use crate::error::{ApiError, ApiResult};
use crate::idempotency;
use crate::identity::RequestIdentity;
use crate::state::AppState;

/// Replays are rate-limited per `(org, action)` the same way manual resends
/// are (§5): an operator mashing "replay" shouldn't be able to hammer the
/// adapter (or Stripe, or the export webhook) behind it.
fn check_rate_limit(state: &AppState, ident: &RequestIdentity, action: &'static str) -> ApiResult<()> {
    match state.rate_limiter.check(ident.org_id, action) {
        RateLimitOutcome::Allowed => Ok(()),
        RateLimitOutcome::Limited { retry_after } => Err(ApiError::RateLimited {
            retry_after_secs: retry_after.as_secs().max(1),
        }),
    }
}

/// Extracts the required `Idempotency-Key` header, or rejects the request.
/// Required on replays and manual resends per §6.
fn require_idempotency_key(headers: &axum::http::HeaderMap) -> ApiResult<String> {
    headers
        .get(idempotency::HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| ApiError::BadRequest("Idempotency-Key header required".to_string()))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/admin/outbox/dead-letter", get(dead_letter))
        .route("/v1/admin/outbox/{event_id}/replay", post(replay_outbox))
        .route("/v1/admin/export-dead-letter", get(export_dead_letter))
        .route(
            "/v1/admin/export-dead-letter/{event_id}/replay",
            post(replay_export),
        )
        .route("/v1/admin/email-failures", get(email_failures))
        .route(
            "/v1/admin/email-failures/{failure_id}/replay",
            post(replay_email),
        )
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Deserialize)]
pub struct DeadLetterQuery {
    pub kind: Option<OutboxKind>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

async fn dead_letter(
    State(state): State<AppState>,
    ident: RequestIdentity,
    Query(query): Query<DeadLetterQuery>,
) -> ApiResult<Json<Vec<OutboxEvent>>> {
    let events =
        list_dead_letter_events(&state.pool, ident.org_id.0, query.kind, query.limit).await?;
    Ok(Json(events))
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

async fn export_dead_letter(
    State(state): State<AppState>,
    ident: RequestIdentity,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Vec<OutboxEvent>>> {
    let events =
        list_export_dead_letter(&state.pool, ident.org_id.0, query.limit, query.offset).await?;
    Ok(Json(events))
}

#[derive(Debug, Deserialize)]
pub struct EmailFailureQuery {
    pub status: Option<EmailFailureStatus>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

async fn email_failures(
    State(state): State<AppState>,
    ident: RequestIdentity,
    Query(query): Query<EmailFailureQuery>,
) -> ApiResult<Json<Vec<EmailFailure>>> {
    let failures = list_email_failures(
        &state.pool,
        ident.org_id.0,
        query.status,
        query.limit,
        query.offset,
    )
    .await?;
    Ok(Json(failures))
}

/// `replay_outbox_event`/`replay_export_event`/`replay_email_failure` operate
/// on a bare event id with no org filter built in, so every replay route here
/// first confirms the event is owned by the caller's org before delegating.
async fn assert_outbox_event_owned(
    state: &AppState,
    org_id: Uuid,
    event_id: Uuid,
) -> ApiResult<()> {
    let owner: Option<Uuid> = sqlx::query_scalar("SELECT org_id FROM outbox_events WHERE event_id = $1")
        .bind(event_id)
        .fetch_optional(&state.pool)
        .await?;
    match owner {
        Some(owner_org) if owner_org == org_id => Ok(()),
        Some(_) => Err(ApiError::Ops(OpsError::Forbidden {
            reason: "cross_org_forbidden",
        })),
        None => Err(ApiError::Ops(OpsError::NotFound {
            entity: "outbox_event",
        })),
    }
}

async fn assert_email_failure_owned(
    state: &AppState,
    org_id: Uuid,
    failure_id: Uuid,
) -> ApiResult<()> {
    let owner: Option<Uuid> =
        sqlx::query_scalar("SELECT org_id FROM email_failures WHERE failure_id = $1")
            .bind(failure_id)
            .fetch_optional(&state.pool)
            .await?;
    match owner {
        Some(owner_org) if owner_org == org_id => Ok(()),
        Some(_) => Err(ApiError::Ops(OpsError::Forbidden {
            reason: "cross_org_forbidden",
        })),
        None => Err(ApiError::Ops(OpsError::NotFound {
            entity: "email_failure",
        })),
    }
}

async fn replay_outbox(
    State(state): State<AppState>,
    ident: RequestIdentity,
    headers: axum::http::HeaderMap,
    Path(event_id): Path<Uuid>,
) -> ApiResult<Json<OutboxEvent>> {
    let key = require_idempotency_key(&headers)?;
    check_rate_limit(&state, &ident, "replay_outbox")?;
    assert_outbox_event_owned(&state, ident.org_id.0, event_id).await?;

    if let Some((_, cached)) = idempotency::lookup(
        &state.pool,
        ident.org_id,
        "replay_outbox",
        &key,
        state.config.idempotency_key_ttl_seconds,
    )
    .await?
    {
        let event: OutboxEvent = serde_json::from_value(cached)
            .map_err(|e| ApiError::BadRequest(format!("corrupt idempotency record: {e}")))?;
        return Ok(Json(event));
    }

    let event = replay_outbox_event(&state.pool, event_id).await?;
    let body_json = serde_json::to_value(&event)
        .map_err(|e| ApiError::BadRequest(format!("response serialization: {e}")))?;
    idempotency::store(
        &state.pool,
        ident.org_id,
        "replay_outbox",
        &key,
        axum::http::StatusCode::OK,
        &body_json,
    )
    .await?;
    Ok(Json(event))
}

async fn replay_email(
    State(state): State<AppState>,
    ident: RequestIdentity,
    headers: axum::http::HeaderMap,
    Path(failure_id): Path<Uuid>,
) -> ApiResult<Json<OutboxEvent>> {
    let key = require_idempotency_key(&headers)?;
    check_rate_limit(&state, &ident, "resend_email")?;
    assert_email_failure_owned(&state, ident.org_id.0, failure_id).await?;

    if let Some((_, cached)) = idempotency::lookup(
        &state.pool,
        ident.org_id,
        "replay_email",
        &key,
        state.config.idempotency_key_ttl_seconds,
    )
    .await?
    {
        let event: OutboxEvent = serde_json::from_value(cached)
            .map_err(|e| ApiError::BadRequest(format!("corrupt idempotency record: {e}")))?;
        return Ok(Json(event));
    }

    let event = replay_email_failure(&state.pool, failure_id).await?;
    let body_json = serde_json::to_value(&event)
        .map_err(|e| ApiError::BadRequest(format!("response serialization: {e}")))?;
    idempotency::store(
        &state.pool,
        ident.org_id,
        "replay_email",
        &key,
        axum::http::StatusCode::OK,
        &body_json,
    )
    .await?;
    Ok(Json(event))
}

async fn replay_export(
    State(state): State<AppState>,
    ident: RequestIdentity,
    headers: axum::http::HeaderMap,
    Path(event_id): Path<Uuid>,
) -> ApiResult<Json<opscore_core::outbox::ExportReplayResult>> {
    let key = require_idempotency_key(&headers)?;
    check_rate_limit(&state, &ident, "replay_export")?;
    assert_outbox_event_owned(&state, ident.org_id.0, event_id).await?;

    if let Some((_, cached)) = idempotency::lookup(
        &state.pool,
        ident.org_id,
        "replay_export",
        &key,
        state.config.idempotency_key_ttl_seconds,
    )
    .await?
    {
        let result: opscore_core::outbox::ExportReplayResult = serde_json::from_value(cached)
            .map_err(|e| ApiError::BadRequest(format!("corrupt idempotency record: {e}")))?;
        return Ok(Json(result));
    }

    let adapter = NoopExportAdapter;
    let breaker = CircuitBreaker::new(
        state.config.circuit_breaker_failure_threshold,
        std::time::Duration::from_secs(state.config.circuit_breaker_reset_seconds),
        state.config.circuit_breaker_half_open_probes,
    );
    let policy = opscore_core::outbox::DeliveryPolicy::default();

    let result = replay_export_event(&state.pool, event_id, &adapter, &breaker, &policy).await?;
    let body_json = serde_json::to_value(&result)
        .map_err(|e| ApiError::BadRequest(format!("response serialization: {e}")))?;
    idempotency::store(
        &state.pool,
        ident.org_id,
        "replay_export",
        &key,
        axum::http::StatusCode::OK,
        &body_json,
    )
    .await?;
    Ok(Json(result))
}
