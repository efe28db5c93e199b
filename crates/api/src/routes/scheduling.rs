//! Admin scheduling surface: day view, resource/slot suggestions, conflict
//! probe, booking creation/move/lifecycle, team blackouts, and bulk updates.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use opscore_core::policy::{evaluate, PolicyInputs, RiskBand, DEFAULT_HIGH_RISK_POSTAL_PREFIXES};
use opscore_core::scheduling::{
    apply_booking_override, block_team_slot, bulk_update_bookings, cancel_booking,
    check_conflicts, confirm_booking, create_booking, default_day_window, list_schedule,
    mark_booking_completed, move_booking, reschedule_booking, suggest_schedule_resources,
    suggest_slots, Booking, BookingOverride, BookingStatus, CreateBookingInput,
};

use crate::error::{ApiError, ApiResult};
use crate::idempotency;
use crate::identity::RequestIdentity;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/admin/schedule", get(get_schedule))
        .route("/v1/admin/schedule/slots", get(get_slot_suggestions))
        .route("/v1/admin/schedule/suggestions", get(get_resource_suggestions))
        .route("/v1/admin/schedule/conflicts", get(get_conflicts))
        .route("/v1/admin/schedule/{booking_id}/move", post(move_booking_handler))
        .route("/v1/admin/schedule/block", post(block_slot))
        .route("/v1/admin/bookings", post(create_booking_handler))
        .route("/v1/admin/bookings/bulk", post(bulk_update_handler))
        .route("/v1/admin/bookings/{id}/confirm", post(confirm_handler))
        .route("/v1/admin/bookings/{id}/cancel", post(cancel_handler))
        .route("/v1/admin/bookings/{id}/reschedule", post(reschedule_handler))
        .route("/v1/admin/bookings/{id}/complete", post(complete_handler))
        .route("/v1/admin/bookings/{id}/override", post(override_handler))
}

#[derive(Debug, Deserialize)]
pub struct ScheduleQuery {
    pub day: String,
    pub team_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ScheduleResponse {
    pub team_id: i64,
    pub day: String,
    pub bookings: Vec<Booking>,
    pub blackouts: Vec<opscore_core::scheduling::TeamBlackout>,
    pub available_slots: Vec<OffsetDateTime>,
}

fn parse_day(raw: &str) -> ApiResult<Date> {
    time::Date::parse(
        raw,
        &time::format_description::well_known::Iso8601::DATE,
    )
    .map_err(|_| ApiError::BadRequest(format!("invalid day '{raw}', expected YYYY-MM-DD")))
}

async fn get_schedule(
    State(state): State<AppState>,
    ident: RequestIdentity,
    Query(query): Query<ScheduleQuery>,
) -> ApiResult<Json<ScheduleResponse>> {
    let day = parse_day(&query.day)?;
    let local_midnight = state.business_timezone.local_midnight_to_utc(day);
    let mut tx = state.pool.begin().await?;
    let view = list_schedule(
        &mut tx,
        ident.org_id.0,
        local_midnight,
        local_midnight + time::Duration::days(1),
        query.team_id,
    )
    .await?;
    tx.commit().await?;

    Ok(Json(ScheduleResponse {
        team_id: view.team_id,
        day: query.day,
        bookings: view.bookings,
        blackouts: view.blackouts,
        available_slots: view.available_slots,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SlotSuggestionQuery {
    pub day: String,
    pub team_id: Option<i64>,
    pub window_start_local_hour: Option<u8>,
    pub window_end_local_hour: Option<u8>,
}

#[derive(Debug, Serialize)]
pub struct SlotSuggestionResponse {
    pub slots: Vec<OffsetDateTime>,
    pub clarifier: Option<String>,
}

async fn get_slot_suggestions(
    State(state): State<AppState>,
    ident: RequestIdentity,
    Query(query): Query<SlotSuggestionQuery>,
) -> ApiResult<Json<SlotSuggestionResponse>> {
    let day = parse_day(&query.day)?;
    let local_midnight = state.business_timezone.local_midnight_to_utc(day);
    let (day_start, day_end) = default_day_window(local_midnight);

    let mut tx = state.pool.begin().await?;
    let view = list_schedule(&mut tx, ident.org_id.0, day_start, day_end, query.team_id).await?;
    tx.commit().await?;

    let window = match (query.window_start_local_hour, query.window_end_local_hour) {
        (Some(start_hour), Some(end_hour)) => {
            let start = day_start + time::Duration::hours(start_hour as i64);
            let end = day_start + time::Duration::hours(end_hour as i64);
            Some((start, end))
        }
        _ => None,
    };

    let suggestions = suggest_slots(&view.available_slots, window);
    Ok(Json(SlotSuggestionResponse {
        slots: suggestions.slots,
        clarifier: suggestions.clarifier.message().map(str::to_string),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ResourceSuggestionQuery {
    pub starts_at: OffsetDateTime,
    pub ends_at: OffsetDateTime,
    pub skill_tags: Option<String>,
    pub booking_id: Option<Uuid>,
}

async fn get_resource_suggestions(
    State(state): State<AppState>,
    ident: RequestIdentity,
    Query(query): Query<ResourceSuggestionQuery>,
) -> ApiResult<Json<opscore_core::scheduling::ResourceSuggestions>> {
    let skill_tags: Vec<String> = query
        .skill_tags
        .map(|raw| raw.split(',').map(|s| s.trim().to_string()).collect())
        .unwrap_or_default();

    let mut tx = state.pool.begin().await?;
    let suggestions = suggest_schedule_resources(
        &mut tx,
        ident.org_id.0,
        query.starts_at,
        query.ends_at,
        &skill_tags,
        query.booking_id,
    )
    .await?;
    tx.commit().await?;
    Ok(Json(suggestions))
}

#[derive(Debug, Deserialize)]
pub struct ConflictQuery {
    pub starts_at: OffsetDateTime,
    pub ends_at: OffsetDateTime,
    pub team_id: Option<i64>,
    pub worker_id: Option<i64>,
    pub booking_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ConflictResponse {
    pub has_conflict: bool,
    pub conflicts: Vec<opscore_core::scheduling::Conflict>,
}

async fn get_conflicts(
    State(state): State<AppState>,
    ident: RequestIdentity,
    Query(query): Query<ConflictQuery>,
) -> ApiResult<Json<ConflictResponse>> {
    let mut tx = state.pool.begin().await?;
    let conflicts = check_conflicts(
        &mut tx,
        ident.org_id.0,
        query.starts_at,
        query.ends_at,
        query.team_id,
        query.worker_id,
        query.booking_id,
    )
    .await?;
    tx.commit().await?;
    Ok(Json(ConflictResponse {
        has_conflict: !conflicts.is_empty(),
        conflicts,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub team_id: Option<i64>,
    pub lead_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub starts_at: OffsetDateTime,
    pub duration_minutes: i32,
    pub service_type: String,
    pub is_first_time_client: bool,
    pub estimated_total_cents: Option<i64>,
    pub postal_prefix: Option<String>,
    pub prior_cancellations: Option<u32>,
}

async fn create_booking_handler(
    State(state): State<AppState>,
    ident: RequestIdentity,
    Json(body): Json<CreateBookingRequest>,
) -> ApiResult<Json<Booking>> {
    let now = state.clock.now();
    let decision = evaluate(PolicyInputs {
        configured_deposit_percent: state.config.deposit_percent,
        is_first_time_client: body.is_first_time_client,
        service_type: &body.service_type,
        now,
        starts_at: body.starts_at,
        estimated_total_cents: body.estimated_total_cents,
        postal_prefix: body.postal_prefix.as_deref(),
        prior_cancellations: body.prior_cancellations.unwrap_or(0),
        high_risk_postal_prefixes: DEFAULT_HIGH_RISK_POSTAL_PREFIXES,
        extra_deposit_reasons: &[],
    });

    let mut tx = state.pool.begin().await?;
    let booking = create_booking(
        &mut tx,
        CreateBookingInput {
            org_id: ident.org_id.0,
            team_id: body.team_id,
            lead_id: body.lead_id,
            client_id: body.client_id,
            starts_at: body.starts_at,
            duration_minutes: body.duration_minutes,
            decision: &decision,
        },
    )
    .await?;
    tx.commit().await?;
    Ok(Json(booking))
}

#[derive(Debug, Deserialize)]
pub struct MoveBookingRequest {
    pub starts_at: OffsetDateTime,
    pub duration_minutes: Option<i32>,
    pub team_id: Option<i64>,
}

async fn move_booking_handler(
    State(state): State<AppState>,
    ident: RequestIdentity,
    Path(booking_id): Path<Uuid>,
    Json(body): Json<MoveBookingRequest>,
) -> ApiResult<Json<Booking>> {
    let mut tx = state.pool.begin().await?;
    let booking = move_booking(
        &mut tx,
        ident.org_id.0,
        booking_id,
        body.starts_at,
        body.duration_minutes,
        body.team_id,
    )
    .await?;
    tx.commit().await?;
    Ok(Json(booking))
}

#[derive(Debug, Deserialize)]
pub struct BlockSlotRequest {
    pub team_id: Option<i64>,
    pub starts_at: OffsetDateTime,
    pub ends_at: OffsetDateTime,
    pub reason: Option<String>,
}

async fn block_slot(
    State(state): State<AppState>,
    ident: RequestIdentity,
    Json(body): Json<BlockSlotRequest>,
) -> ApiResult<Json<opscore_core::scheduling::TeamBlackout>> {
    let mut tx = state.pool.begin().await?;
    let blackout = block_team_slot(
        &mut tx,
        ident.org_id.0,
        body.team_id,
        body.starts_at,
        body.ends_at,
        body.reason,
    )
    .await?;
    tx.commit().await?;
    Ok(Json(blackout))
}

#[derive(Debug, Deserialize)]
pub struct BulkUpdateRequest {
    pub booking_ids: Vec<Uuid>,
    pub team_id: Option<i64>,
    pub status: Option<BookingStatus>,
    #[serde(default)]
    pub send_reminder: bool,
}

/// `POST /v1/admin/bookings/bulk`. Requires `Idempotency-Key`: a retried
/// request with the same key replays the first response verbatim rather than
/// re-applying the update (and, per §8's boundary scenario, rather than
/// double-counting `reminders_sent`).
async fn bulk_update_handler(
    State(state): State<AppState>,
    ident: RequestIdentity,
    headers: axum::http::HeaderMap,
    Json(body): Json<BulkUpdateRequest>,
) -> ApiResult<Json<opscore_core::scheduling::BulkUpdateResult>> {
    let key = headers
        .get(idempotency::HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("Idempotency-Key header required".to_string()))?;

    if let Some((_, cached)) = idempotency::lookup(
        &state.pool,
        ident.org_id,
        "bulk_update_bookings",
        key,
        state.config.idempotency_key_ttl_seconds,
    )
    .await?
    {
        let result: opscore_core::scheduling::BulkUpdateResult = serde_json::from_value(cached)
            .map_err(|e| ApiError::BadRequest(format!("corrupt idempotency record: {e}")))?;
        return Ok(Json(result));
    }

    let mut tx = state.pool.begin().await?;
    let (updated, reminders_sent) = bulk_update_bookings(
        &mut tx,
        ident.org_id.0,
        &body.booking_ids,
        body.team_id,
        body.status,
        body.send_reminder,
    )
    .await?;
    tx.commit().await?;

    let result = opscore_core::scheduling::BulkUpdateResult {
        updated: updated.len() as u32,
        reminders_sent,
    };

    let body_json = serde_json::to_value(&result)
        .map_err(|e| ApiError::BadRequest(format!("response serialization: {e}")))?;
    idempotency::store(
        &state.pool,
        ident.org_id,
        "bulk_update_bookings",
        key,
        axum::http::StatusCode::OK,
        &body_json,
    )
    .await?;

    Ok(Json(result))
}

async fn confirm_handler(
    State(state): State<AppState>,
    ident: RequestIdentity,
    Path(booking_id): Path<Uuid>,
) -> ApiResult<Json<Booking>> {
    let mut tx = state.pool.begin().await?;
    let booking = confirm_booking(&mut tx, ident.org_id.0, booking_id).await?;
    tx.commit().await?;
    Ok(Json(booking))
}

async fn cancel_handler(
    State(state): State<AppState>,
    ident: RequestIdentity,
    Path(booking_id): Path<Uuid>,
) -> ApiResult<Json<Booking>> {
    let mut tx = state.pool.begin().await?;
    let booking = cancel_booking(&mut tx, ident.org_id.0, booking_id).await?;
    tx.commit().await?;
    Ok(Json(booking))
}

#[derive(Debug, Deserialize)]
pub struct RescheduleRequest {
    pub starts_at: OffsetDateTime,
    pub duration_minutes: Option<i32>,
}

async fn reschedule_handler(
    State(state): State<AppState>,
    ident: RequestIdentity,
    Path(booking_id): Path<Uuid>,
    Json(body): Json<RescheduleRequest>,
) -> ApiResult<Json<Booking>> {
    let mut tx = state.pool.begin().await?;
    let booking = reschedule_booking(
        &mut tx,
        ident.org_id.0,
        booking_id,
        body.starts_at,
        body.duration_minutes,
    )
    .await?;
    tx.commit().await?;
    Ok(Json(booking))
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub actual_minutes: i32,
}

async fn complete_handler(
    State(state): State<AppState>,
    ident: RequestIdentity,
    Path(booking_id): Path<Uuid>,
    Json(body): Json<CompleteRequest>,
) -> ApiResult<Json<Booking>> {
    let mut tx = state.pool.begin().await?;
    let booking =
        mark_booking_completed(&mut tx, ident.org_id.0, booking_id, body.actual_minutes).await?;
    tx.commit().await?;
    Ok(Json(booking))
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OverrideRequest {
    DowngradeDeposit { reason: String },
    RiskBand { reason: String, band: RiskBand },
    CancellationException { reason: String },
}

#[derive(Debug, Serialize)]
pub struct OverrideResponse {
    pub booking: Booking,
    pub audit_id: Uuid,
}

async fn override_handler(
    State(state): State<AppState>,
    ident: RequestIdentity,
    Path(booking_id): Path<Uuid>,
    Json(body): Json<OverrideRequest>,
) -> ApiResult<Json<OverrideResponse>> {
    let (action, reason) = match body {
        OverrideRequest::DowngradeDeposit { reason } => (BookingOverride::DowngradeDeposit, reason),
        OverrideRequest::RiskBand { reason, band } => (BookingOverride::RiskBand(band), reason),
        OverrideRequest::CancellationException { reason } => {
            (BookingOverride::CancellationException, reason)
        }
    };

    let mut tx = state.pool.begin().await?;
    let (booking, audit) = apply_booking_override(
        &mut tx,
        ident.org_id.0,
        booking_id,
        action,
        &ident.identity.subject,
        &reason,
    )
    .await?;
    tx.commit().await?;

    Ok(Json(OverrideResponse {
        booking,
        audit_id: audit.audit_id,
    }))
}
