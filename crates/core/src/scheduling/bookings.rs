//! Booking lifecycle: creation, move/reschedule, cancel, completion, bulk update,
//! and the read-side schedule/conflict/suggestion queries. Grounded on
//! `bookings/service.py` (creation, state machine) and `ops/service.py` (conflict
//! queries, move/block/bulk-update) in the original implementation.

use serde::Serialize;
use sqlx::{Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::audit::{record_audit, AuditKind, AuditRecord};
use crate::error::{OpsError, OpsResult};
use crate::outbox::enqueue_email;
use crate::policy::{downgrade_deposit_requirement, DepositDecision, RiskBand};

use super::conflicts::{bookings_conflict, overlaps_blackout};
use super::slots::{generate_slots, BlockingBooking};
use super::teams::{resolve_team_for_creation, team_for_org};
use super::types::{
    Booking, BookingStatus, Conflict, ConflictKind, PolicySnapshot, TeamBlackout, Worker,
    DEFAULT_SLOT_DURATION_MINUTES,
};

/// Loads every booking on `team_id` whose buffered window could overlap
/// `[window_start, window_end)`. Grounded on `_blocking_bookings()`: the SQL
/// filter is deliberately wider than the buffer-exact check (`starts_at <
/// window_end + buffer AND ends_at > window_start - buffer`) so the buffer
/// arithmetic itself stays in Rust, testable without a database.
async fn blocking_bookings(
    tx: &mut Transaction<'_, Postgres>,
    team_id: i64,
    window_start: OffsetDateTime,
    window_end: OffsetDateTime,
    exclude_booking_id: Option<Uuid>,
) -> OpsResult<Vec<Booking>> {
    let buffer = time::Duration::minutes(super::types::BUFFER_MINUTES);
    let rows = sqlx::query_as::<_, Booking>(
        r#"SELECT * FROM bookings
           WHERE team_id = $1
             AND starts_at < $2
             AND (starts_at + make_interval(mins => duration_minutes)) > $3
             AND status IN ('PENDING', 'CONFIRMED')
             AND ($4::uuid IS NULL OR booking_id <> $4)"#,
    )
    .bind(team_id)
    .bind(window_end + buffer)
    .bind(window_start - buffer)
    .bind(exclude_booking_id)
    .fetch_all(&mut **tx)
    .await?;
    Ok(rows)
}

async fn team_blackouts_overlapping(
    tx: &mut Transaction<'_, Postgres>,
    team_id: i64,
    window_start: OffsetDateTime,
    window_end: OffsetDateTime,
) -> OpsResult<Vec<TeamBlackout>> {
    let rows = sqlx::query_as::<_, TeamBlackout>(
        "SELECT * FROM team_blackouts WHERE team_id = $1 AND starts_at < $2 AND ends_at > $3",
    )
    .bind(team_id)
    .bind(window_end)
    .bind(window_start)
    .fetch_all(&mut **tx)
    .await?;
    Ok(rows)
}

async fn team_conflicts(
    tx: &mut Transaction<'_, Postgres>,
    team_id: i64,
    window_start: OffsetDateTime,
    window_end: OffsetDateTime,
    exclude_booking_id: Option<Uuid>,
) -> OpsResult<Vec<Conflict>> {
    let duration_minutes = ((window_end - window_start).whole_minutes()) as i32;
    let mut conflicts = Vec::new();

    for booking in blocking_bookings(tx, team_id, window_start, window_end, exclude_booking_id)
        .await?
    {
        if bookings_conflict(
            booking.starts_at,
            booking.duration_minutes,
            window_start,
            duration_minutes,
        ) {
            conflicts.push(Conflict {
                kind: ConflictKind::Booking,
                reference: booking.booking_id.to_string(),
                starts_at: booking.starts_at,
                ends_at: booking.ends_at(),
                note: "existing booking".to_string(),
            });
        }
    }

    for blackout in team_blackouts_overlapping(tx, team_id, window_start, window_end).await? {
        conflicts.push(Conflict {
            kind: ConflictKind::Blackout,
            reference: blackout.id.to_string(),
            starts_at: blackout.starts_at,
            ends_at: blackout.ends_at,
            note: blackout.reason.unwrap_or_else(|| "blackout".to_string()),
        });
    }

    Ok(conflicts)
}

async fn worker_conflicts(
    tx: &mut Transaction<'_, Postgres>,
    worker: &Worker,
    window_start: OffsetDateTime,
    window_end: OffsetDateTime,
    exclude_booking_id: Option<Uuid>,
) -> OpsResult<Vec<Conflict>> {
    let buffer = time::Duration::minutes(super::types::BUFFER_MINUTES);
    let duration_minutes = ((window_end - window_start).whole_minutes()) as i32;

    let rows = sqlx::query_as::<_, Booking>(
        r#"SELECT * FROM bookings
           WHERE org_id = $1
             AND assigned_worker_id = $2
             AND starts_at < $3
             AND (starts_at + make_interval(mins => duration_minutes)) > $4
             AND status IN ('PENDING', 'CONFIRMED')
             AND ($5::uuid IS NULL OR booking_id <> $5)"#,
    )
    .bind(worker.org_id)
    .bind(worker.worker_id)
    .bind(window_end + buffer)
    .bind(window_start - buffer)
    .bind(exclude_booking_id)
    .fetch_all(&mut **tx)
    .await?;

    Ok(rows
        .into_iter()
        .filter(|b| bookings_conflict(b.starts_at, b.duration_minutes, window_start, duration_minutes))
        .map(|b| Conflict {
            kind: ConflictKind::WorkerBooking,
            reference: b.booking_id.to_string(),
            starts_at: b.starts_at,
            ends_at: b.ends_at(),
            note: "worker has a conflicting booking".to_string(),
        })
        .collect())
}

/// `check_conflicts(org, starts, ends, team?, worker?, exclude_booking?)`.
pub async fn check_conflicts(
    tx: &mut Transaction<'_, Postgres>,
    org_id: Uuid,
    starts_at: OffsetDateTime,
    ends_at: OffsetDateTime,
    team_id: Option<i64>,
    worker_id: Option<i64>,
    exclude_booking_id: Option<Uuid>,
) -> OpsResult<Vec<Conflict>> {
    if ends_at <= starts_at {
        return Err(OpsError::InvalidWindow);
    }

    let team = team_for_org(tx, org_id, team_id).await?;
    let mut conflicts =
        team_conflicts(tx, team.team_id, starts_at, ends_at, exclude_booking_id).await?;

    if let Some(worker_id) = worker_id {
        let worker = sqlx::query_as::<_, Worker>("SELECT * FROM workers WHERE worker_id = $1")
            .bind(worker_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or(OpsError::NotFound { entity: "worker" })?;
        if worker.org_id != org_id {
            return Err(OpsError::Forbidden {
                reason: "cross-org worker access blocked",
            });
        }
        conflicts.extend(worker_conflicts(tx, &worker, starts_at, ends_at, exclude_booking_id).await?);
    }

    Ok(conflicts)
}

#[derive(Debug, Serialize)]
pub struct ScheduleView {
    pub team_id: i64,
    pub bookings: Vec<Booking>,
    pub blackouts: Vec<TeamBlackout>,
    pub available_slots: Vec<OffsetDateTime>,
}

/// `list_schedule(org, day, team?)`. `day_start`/`day_end` are the UTC instants
/// bounding the local calendar day, already converted by the caller via the
/// configured business timezone (Clock & Calendar, §4.6).
pub async fn list_schedule(
    tx: &mut Transaction<'_, Postgres>,
    org_id: Uuid,
    day_start: OffsetDateTime,
    day_end: OffsetDateTime,
    team_id: Option<i64>,
) -> OpsResult<ScheduleView> {
    let team = team_for_org(tx, org_id, team_id).await?;

    let bookings = sqlx::query_as::<_, Booking>(
        r#"SELECT * FROM bookings
           WHERE org_id = $1 AND team_id = $2 AND status IN ('PENDING','CONFIRMED')
             AND starts_at >= $3 AND starts_at < $4
           ORDER BY starts_at ASC"#,
    )
    .bind(org_id)
    .bind(team.team_id)
    .bind(day_start)
    .bind(day_end)
    .fetch_all(&mut **tx)
    .await?;

    let blackouts = team_blackouts_overlapping(tx, team.team_id, day_start, day_end).await?;

    let blocking: Vec<BlockingBooking> = bookings
        .iter()
        .map(|b| BlockingBooking {
            starts_at: b.starts_at,
            duration_minutes: b.duration_minutes,
        })
        .collect();
    let slot_blackouts: Vec<super::slots::Blackout> = blackouts
        .iter()
        .map(|b| super::slots::Blackout {
            starts_at: b.starts_at,
            ends_at: b.ends_at,
        })
        .collect();

    let available_slots = generate_slots(
        day_start,
        day_end,
        DEFAULT_SLOT_DURATION_MINUTES,
        &blocking,
        &slot_blackouts,
    );

    Ok(ScheduleView {
        team_id: team.team_id,
        bookings,
        blackouts,
        available_slots,
    })
}

#[derive(Debug, Serialize)]
pub struct ResourceSuggestions {
    pub teams: Vec<Team>,
    pub workers: Vec<Worker>,
}

use super::types::Team;

/// `suggest_schedule_resources`, grounded on `suggest_schedule_resources()`.
pub async fn suggest_schedule_resources(
    tx: &mut Transaction<'_, Postgres>,
    org_id: Uuid,
    starts_at: OffsetDateTime,
    ends_at: OffsetDateTime,
    skill_tags: &[String],
    exclude_booking_id: Option<Uuid>,
) -> OpsResult<ResourceSuggestions> {
    if ends_at <= starts_at {
        return Err(OpsError::InvalidWindow);
    }

    let mut teams =
        sqlx::query_as::<_, Team>("SELECT * FROM teams WHERE org_id = $1 ORDER BY team_id")
            .bind(org_id)
            .fetch_all(&mut **tx)
            .await?;
    if teams.is_empty() {
        teams.push(team_for_org(tx, org_id, None).await?);
    }

    let skill_terms: Vec<String> = skill_tags
        .iter()
        .map(|t| t.to_lowercase().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    let mut available_teams = Vec::new();
    let mut conflict_free_team_ids = std::collections::HashSet::new();
    for team in &teams {
        let conflicts =
            team_conflicts(tx, team.team_id, starts_at, ends_at, exclude_booking_id).await?;
        if conflicts.is_empty() {
            available_teams.push(team.clone());
            conflict_free_team_ids.insert(team.team_id);
        }
    }

    let workers = sqlx::query_as::<_, Worker>(
        r#"SELECT w.* FROM workers w JOIN teams t ON t.team_id = w.team_id
           WHERE t.org_id = $1 AND w.is_active = true ORDER BY w.worker_id"#,
    )
    .bind(org_id)
    .fetch_all(&mut **tx)
    .await?;

    let mut available_workers = Vec::new();
    for worker in workers {
        let role_text = worker.role.to_lowercase();
        if !skill_terms.is_empty() && !skill_terms.iter().all(|term| role_text.contains(term)) {
            continue;
        }
        if !conflict_free_team_ids.contains(&worker.team_id) {
            continue;
        }
        let conflicts =
            worker_conflicts(tx, &worker, starts_at, ends_at, exclude_booking_id).await?;
        if conflicts.is_empty() {
            available_workers.push(worker);
        }
    }

    Ok(ResourceSuggestions {
        teams: available_teams,
        workers: available_workers,
    })
}

/// Inputs needed to create a booking, after the Policy Engine has already been
/// consulted by the caller (keeping this module free of policy knowledge beyond
/// persisting its output).
pub struct CreateBookingInput<'a> {
    pub org_id: Uuid,
    pub team_id: Option<i64>,
    pub lead_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub starts_at: OffsetDateTime,
    pub duration_minutes: i32,
    pub decision: &'a DepositDecision,
}

/// `create_booking(...)`. Serialized per team via the `SELECT ... FOR UPDATE`
/// implicit in `resolve_team_for_creation`'s row lock; slot availability is
/// re-validated inside the same transaction immediately before insert.
pub async fn create_booking(
    tx: &mut Transaction<'_, Postgres>,
    input: CreateBookingInput<'_>,
) -> OpsResult<Booking> {
    if input.duration_minutes < super::types::SLOT_STEP_MINUTES as i32 {
        return Err(OpsError::InvalidTransition {
            reason: "duration_minutes below the minimum slot step",
        });
    }

    let team = resolve_team_for_creation(tx, input.org_id, input.team_id).await?;
    let ends_at = input.starts_at + time::Duration::minutes(input.duration_minutes as i64);

    let conflicts = team_conflicts(tx, team.team_id, input.starts_at, ends_at, None).await?;
    if !conflicts.is_empty() {
        return Err(OpsError::Conflict {
            reason: "slot_unavailable".to_string(),
        });
    }

    let snapshot = PolicySnapshot::new(
        input.decision.deposit.clone(),
        input.decision.cancellation.clone(),
    );
    let snapshot_json = serde_json::to_value(&snapshot)
        .map_err(|e| OpsError::Internal(format!("policy snapshot serialization: {e}")))?;

    let booking = sqlx::query_as::<_, Booking>(
        r#"INSERT INTO bookings (
               booking_id, org_id, team_id, lead_id, client_id,
               starts_at, duration_minutes, status,
               deposit_required, deposit_cents, deposit_status,
               policy_snapshot, risk_score, risk_band, risk_reasons,
               cancellation_exception
           ) VALUES (
               gen_random_uuid(), $1, $2, $3, $4,
               $5, $6, 'PENDING',
               $7, $8, NULL,
               $9, $10, $11, $12,
               false
           )
           RETURNING *"#,
    )
    .bind(input.org_id)
    .bind(team.team_id)
    .bind(input.lead_id)
    .bind(input.client_id)
    .bind(input.starts_at)
    .bind(input.duration_minutes)
    .bind(input.decision.deposit.required)
    .bind(input.decision.deposit.amount_cents)
    .bind(snapshot_json)
    .bind(input.decision.risk.score)
    .bind(input.decision.risk.band)
    .bind(&input.decision.risk.reasons)
    .fetch_one(&mut **tx)
    .await?;

    Ok(booking)
}

async fn load_booking_for_update(
    tx: &mut Transaction<'_, Postgres>,
    org_id: Uuid,
    booking_id: Uuid,
) -> OpsResult<Booking> {
    let booking =
        sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE booking_id = $1 FOR UPDATE")
            .bind(booking_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or(OpsError::NotFound { entity: "booking" })?;
    if booking.org_id != org_id {
        return Err(OpsError::Forbidden {
            reason: "cross_org_forbidden",
        });
    }
    Ok(booking)
}

/// `move_booking(booking_id, starts, duration?, team?)`.
pub async fn move_booking(
    tx: &mut Transaction<'_, Postgres>,
    org_id: Uuid,
    booking_id: Uuid,
    starts_at: OffsetDateTime,
    duration_minutes: Option<i32>,
    team_id: Option<i64>,
) -> OpsResult<Booking> {
    let booking = load_booking_for_update(tx, org_id, booking_id).await?;
    let target_team = team_for_org(tx, org_id, team_id.or(Some(booking.team_id))).await?;
    let duration = duration_minutes
        .or(Some(booking.duration_minutes))
        .unwrap_or(DEFAULT_SLOT_DURATION_MINUTES);
    let ends_at = starts_at + time::Duration::minutes(duration as i64);

    for other in blocking_bookings(tx, target_team.team_id, starts_at, ends_at, Some(booking_id))
        .await?
    {
        if bookings_conflict(other.starts_at, other.duration_minutes, starts_at, duration) {
            return Err(OpsError::Conflict {
                reason: "conflict_with_existing_booking".to_string(),
            });
        }
    }

    for blackout in team_blackouts_overlapping(tx, target_team.team_id, starts_at, ends_at).await? {
        if overlaps_blackout(blackout.starts_at, blackout.ends_at, starts_at, duration) {
            return Err(OpsError::Conflict {
                reason: "conflict_with_blackout".to_string(),
            });
        }
    }

    let updated = sqlx::query_as::<_, Booking>(
        r#"UPDATE bookings SET starts_at = $1, duration_minutes = $2, team_id = $3
           WHERE booking_id = $4 RETURNING *"#,
    )
    .bind(starts_at)
    .bind(duration)
    .bind(target_team.team_id)
    .bind(booking_id)
    .fetch_one(&mut **tx)
    .await?;

    Ok(updated)
}

/// `reschedule_booking(booking, starts, duration)` — like `move_booking` but
/// rejects terminal bookings up front, since a reschedule (unlike an operator
/// move correcting a mistake) is a customer-facing action on a live booking.
pub async fn reschedule_booking(
    tx: &mut Transaction<'_, Postgres>,
    org_id: Uuid,
    booking_id: Uuid,
    starts_at: OffsetDateTime,
    duration_minutes: Option<i32>,
) -> OpsResult<Booking> {
    let booking = load_booking_for_update(tx, org_id, booking_id).await?;
    if booking.status.is_terminal() {
        return Err(OpsError::InvalidTransition {
            reason: "cannot reschedule a terminal booking",
        });
    }
    move_booking(tx, org_id, booking_id, starts_at, duration_minutes, None).await
}

fn assert_transition(from: BookingStatus, to: BookingStatus) -> OpsResult<()> {
    let allowed = matches!(
        (from, to),
        (BookingStatus::Pending, BookingStatus::Confirmed)
            | (BookingStatus::Pending, BookingStatus::Cancelled)
            | (BookingStatus::Confirmed, BookingStatus::Done)
            | (BookingStatus::Confirmed, BookingStatus::Cancelled)
    );
    if allowed {
        Ok(())
    } else {
        Err(OpsError::InvalidTransition {
            reason: "booking status transition not permitted",
        })
    }
}

/// `cancel_booking(booking)`.
pub async fn cancel_booking(
    tx: &mut Transaction<'_, Postgres>,
    org_id: Uuid,
    booking_id: Uuid,
) -> OpsResult<Booking> {
    let booking = load_booking_for_update(tx, org_id, booking_id).await?;
    assert_transition(booking.status, BookingStatus::Cancelled)?;

    let updated = sqlx::query_as::<_, Booking>(
        "UPDATE bookings SET status = 'CANCELLED' WHERE booking_id = $1 RETURNING *",
    )
    .bind(booking_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(updated)
}

/// Explicit operator confirm. `deposit_required` with `deposit_status != paid`
/// is rejected regardless of risk band; a HIGH-risk booking additionally needs
/// an explicit confirm even once the deposit is paid (enforced by the reconciler
/// never auto-confirming HIGH-risk bookings, not by this function).
pub async fn confirm_booking(
    tx: &mut Transaction<'_, Postgres>,
    org_id: Uuid,
    booking_id: Uuid,
) -> OpsResult<Booking> {
    let booking = load_booking_for_update(tx, org_id, booking_id).await?;
    assert_transition(booking.status, BookingStatus::Confirmed)?;

    if booking.deposit_required
        && booking.deposit_status != Some(super::types::DepositStatus::Paid)
    {
        return Err(OpsError::Precondition {
            reason: "deposit required before confirm",
        });
    }

    let updated = sqlx::query_as::<_, Booking>(
        "UPDATE bookings SET status = 'CONFIRMED' WHERE booking_id = $1 RETURNING *",
    )
    .bind(booking_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(updated)
}

/// `mark_booking_completed(id, actual_minutes)`.
pub async fn mark_booking_completed(
    tx: &mut Transaction<'_, Postgres>,
    org_id: Uuid,
    booking_id: Uuid,
    actual_minutes: i32,
) -> OpsResult<Booking> {
    if actual_minutes <= 0 {
        return Err(OpsError::InvalidTransition {
            reason: "actual duration must be positive",
        });
    }
    let booking = load_booking_for_update(tx, org_id, booking_id).await?;
    assert_transition(booking.status, BookingStatus::Done)?;

    let updated = sqlx::query_as::<_, Booking>(
        r#"UPDATE bookings SET status = 'DONE', actual_duration_minutes = $1
           WHERE booking_id = $2 RETURNING *"#,
    )
    .bind(actual_minutes)
    .bind(booking_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(updated)
}

/// `block_team_slot(team, starts, ends, reason?)`.
pub async fn block_team_slot(
    tx: &mut Transaction<'_, Postgres>,
    org_id: Uuid,
    team_id: Option<i64>,
    starts_at: OffsetDateTime,
    ends_at: OffsetDateTime,
    reason: Option<String>,
) -> OpsResult<TeamBlackout> {
    if ends_at <= starts_at {
        return Err(OpsError::InvalidWindow);
    }
    let team = team_for_org(tx, org_id, team_id).await?;
    let duration_minutes = ((ends_at - starts_at).whole_minutes()) as i32;

    for booking in blocking_bookings(tx, team.team_id, starts_at, ends_at, None).await? {
        if bookings_conflict(booking.starts_at, booking.duration_minutes, starts_at, duration_minutes)
        {
            return Err(OpsError::Conflict {
                reason: "conflict_with_existing_booking".to_string(),
            });
        }
    }

    if !team_blackouts_overlapping(tx, team.team_id, starts_at, ends_at)
        .await?
        .is_empty()
    {
        return Err(OpsError::Conflict {
            reason: "conflict_with_blackout".to_string(),
        });
    }

    let blackout = sqlx::query_as::<_, TeamBlackout>(
        r#"INSERT INTO team_blackouts (team_id, starts_at, ends_at, reason)
           VALUES ($1, $2, $3, $4) RETURNING *"#,
    )
    .bind(team.team_id)
    .bind(starts_at)
    .bind(ends_at)
    .bind(reason)
    .fetch_one(&mut **tx)
    .await?;

    Ok(blackout)
}

#[derive(Debug, Serialize, Default)]
pub struct BulkUpdateResult {
    pub updated: u32,
    pub reminders_sent: u32,
}

/// `bulk_update(ids, team?, status?, send_reminder?)`. When `send_reminder` is
/// set, a reminder email is enqueued per updated booking with a dedupe key
/// stable across retries (`booking:<id>:reminder`), so the second delivery of
/// an idempotent bulk-update replay never double-enqueues — the API
/// boundary's `Idempotency-Key` cache already short-circuits full replays, but
/// this dedupe key is the belt-and-suspenders guarantee the scenario in §8
/// asks for even if that cache were bypassed.
pub async fn bulk_update_bookings(
    tx: &mut Transaction<'_, Postgres>,
    org_id: Uuid,
    booking_ids: &[Uuid],
    team_id: Option<i64>,
    status: Option<BookingStatus>,
    send_reminder: bool,
) -> OpsResult<(Vec<Booking>, u32)> {
    if booking_ids.is_empty() {
        return Ok((Vec::new(), 0));
    }

    let mut updated = Vec::with_capacity(booking_ids.len());
    let mut reminders_sent = 0u32;
    for booking_id in booking_ids {
        let mut booking = load_booking_for_update(tx, org_id, *booking_id).await?;
        if let Some(new_status) = status {
            assert_transition(booking.status, new_status)?;
            booking.status = new_status;
        }
        if let Some(team_id) = team_id {
            booking.team_id = team_id;
        }

        let row = sqlx::query_as::<_, Booking>(
            "UPDATE bookings SET team_id = $1, status = $2 WHERE booking_id = $3 RETURNING *",
        )
        .bind(booking.team_id)
        .bind(booking.status)
        .bind(booking_id)
        .fetch_one(&mut **tx)
        .await?;

        if send_reminder && try_enqueue_reminder(tx, &row).await? {
            reminders_sent += 1;
        }

        updated.push(row);
    }

    Ok((updated, reminders_sent))
}

/// Enqueues an upcoming-appointment reminder for `booking`. Skipped when the
/// booking has no linked client to notify. Returns whether an email was
/// actually composed (vs. skipped for lack of a recipient), so the caller's
/// `reminders_sent` counter reflects emails sent, not bookings attempted.
async fn try_enqueue_reminder(
    tx: &mut Transaction<'_, Postgres>,
    booking: &Booking,
) -> OpsResult<bool> {
    let Some(client_id) = booking.client_id else {
        return Ok(false);
    };
    let recipient: Option<(String,)> =
        sqlx::query_as("SELECT email FROM clients WHERE client_id = $1")
            .bind(client_id)
            .fetch_optional(&mut **tx)
            .await?;
    let Some((recipient,)) = recipient else {
        return Ok(false);
    };

    let dedupe_key = format!("booking:{}:reminder", booking.booking_id);
    enqueue_email(
        tx,
        booking.org_id,
        &recipient,
        "Upcoming appointment reminder",
        "This is a reminder of your upcoming appointment.",
        Some(booking.booking_id),
        None,
        "booking_reminder",
        &dedupe_key,
    )
    .await?;
    Ok(true)
}

/// Operator override action: one of downgrading the deposit requirement,
/// changing the risk band, or granting a cancellation exception. Grounded in
/// §4.1 "Policy overrides" — every branch writes an `AuditRecord` in the same
/// transaction as the booking update.
#[derive(Debug, Clone)]
pub enum BookingOverride {
    DowngradeDeposit,
    RiskBand(RiskBand),
    CancellationException,
}

/// `apply_booking_override(booking_id, override, actor, reason)`. The live
/// `deposit_required`/`deposit_cents`/`risk_band`/`cancellation_exception`
/// fields on the booking reflect the override immediately; the embedded
/// `policy_snapshot` document is updated in place for the deposit case (the
/// downgrade tag is appended to its reasons, not erased) and left untouched
/// for the other two, since they don't touch the deposit snapshot at all.
pub async fn apply_booking_override(
    tx: &mut Transaction<'_, Postgres>,
    org_id: Uuid,
    booking_id: Uuid,
    action: BookingOverride,
    actor: &str,
    reason: &str,
) -> OpsResult<(Booking, AuditRecord)> {
    let booking = load_booking_for_update(tx, org_id, booking_id).await?;
    let before_snapshot = serde_json::to_value(&booking.policy_snapshot).unwrap_or_default();

    let (updated, audit_kind, after_snapshot) = match action {
        BookingOverride::DowngradeDeposit => {
            let mut snapshot: PolicySnapshot =
                serde_json::from_value(booking.policy_snapshot.clone()).map_err(|e| {
                    OpsError::Internal(format!("malformed policy_snapshot: {e}"))
                })?;
            snapshot.deposit = downgrade_deposit_requirement(&snapshot.deposit, reason);
            let snapshot_json = serde_json::to_value(&snapshot).unwrap_or_default();

            let updated = sqlx::query_as::<_, Booking>(
                r#"UPDATE bookings SET deposit_required = $1, policy_snapshot = $2
                   WHERE booking_id = $3 RETURNING *"#,
            )
            .bind(snapshot.deposit.required)
            .bind(&snapshot_json)
            .bind(booking_id)
            .fetch_one(&mut **tx)
            .await?;
            (updated, AuditKind::DowngradeDeposit, snapshot_json)
        }
        BookingOverride::RiskBand(new_band) => {
            let mut reasons = booking.risk_reasons.clone();
            reasons.push(format!("override:{reason}"));
            let updated = sqlx::query_as::<_, Booking>(
                r#"UPDATE bookings SET risk_band = $1, risk_reasons = $2
                   WHERE booking_id = $3 RETURNING *"#,
            )
            .bind(new_band)
            .bind(&reasons)
            .bind(booking_id)
            .fetch_one(&mut **tx)
            .await?;
            let after = serde_json::json!({ "risk_band": new_band, "risk_reasons": reasons });
            (updated, AuditKind::RiskBandOverride, after)
        }
        BookingOverride::CancellationException => {
            let updated = sqlx::query_as::<_, Booking>(
                r#"UPDATE bookings SET cancellation_exception = true, cancellation_exception_note = $1
                   WHERE booking_id = $2 RETURNING *"#,
            )
            .bind(reason)
            .bind(booking_id)
            .fetch_one(&mut **tx)
            .await?;
            let after = serde_json::json!({
                "cancellation_exception": true,
                "cancellation_exception_note": reason,
            });
            (updated, AuditKind::CancellationException, after)
        }
    };

    let audit = record_audit(
        tx,
        org_id,
        Some(booking_id),
        audit_kind,
        actor,
        reason,
        before_snapshot,
        after_snapshot,
    )
    .await?;

    Ok((updated, audit))
}
