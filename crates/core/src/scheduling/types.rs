//! Scheduling Engine data types. Mirrors the relational model directly: each
//! struct here is a `sqlx::FromRow` projection of its table, not a separate DTO
//! layer — the wire-level DTOs in `opscore-api` translate these at the boundary.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::policy::{CancellationSnapshot, DepositSnapshot, RiskBand};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Done,
    Cancelled,
}

impl BookingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Done | BookingStatus::Cancelled)
    }

    /// Statuses that block a team's calendar for conflict purposes. Grounded on
    /// `BLOCKING_STATUSES = {PENDING, CONFIRMED}` in the original scheduler.
    pub fn is_blocking(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum DepositStatus {
    Pending,
    Paid,
    Expired,
    Failed,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Team {
    pub team_id: i64,
    pub org_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Worker {
    pub worker_id: i64,
    pub org_id: Uuid,
    pub team_id: i64,
    pub name: String,
    pub role: String,
    pub is_active: bool,
    pub hourly_rate_cents: Option<i64>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TeamBlackout {
    pub id: i64,
    pub team_id: i64,
    pub starts_at: OffsetDateTime,
    pub ends_at: OffsetDateTime,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Booking {
    pub booking_id: Uuid,
    pub org_id: Uuid,
    pub team_id: i64,
    pub assigned_worker_id: Option<i64>,
    pub lead_id: Option<Uuid>,
    pub client_id: Option<Uuid>,

    pub starts_at: OffsetDateTime,
    pub duration_minutes: i32,
    pub planned_minutes: Option<i32>,
    pub actual_duration_minutes: Option<i32>,

    pub status: BookingStatus,

    pub deposit_required: bool,
    pub deposit_cents: Option<i64>,
    pub deposit_status: Option<DepositStatus>,

    /// Opaque, schema-versioned JSON document written at create/reschedule time.
    /// Never mutated after status leaves PENDING without a recorded override.
    pub policy_snapshot: serde_json::Value,

    pub risk_score: i32,
    pub risk_band: RiskBand,
    pub risk_reasons: Vec<String>,

    pub stripe_checkout_session_id: Option<String>,
    pub stripe_payment_intent_id: Option<String>,

    pub cancellation_exception: bool,
    pub cancellation_exception_note: Option<String>,
}

impl Booking {
    pub fn ends_at(&self) -> OffsetDateTime {
        self.starts_at + time::Duration::minutes(self.duration_minutes as i64)
    }
}

/// Schema-versioned embedded document persisted as `Booking.policy_snapshot`.
/// Grounded in the Design Notes' "free-form JSON snapshots" guidance: keep the
/// document opaque on the wire, validate on read with a strict schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySnapshot {
    pub version: u32,
    pub deposit: DepositSnapshot,
    pub cancellation: CancellationSnapshot,
}

impl PolicySnapshot {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new(deposit: DepositSnapshot, cancellation: CancellationSnapshot) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            deposit,
            cancellation,
        }
    }
}

/// A candidate or occupied interval used by conflict detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConflictKind {
    Booking,
    WorkerBooking,
    Blackout,
}

#[derive(Debug, Clone, Serialize)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub reference: String,
    pub starts_at: OffsetDateTime,
    pub ends_at: OffsetDateTime,
    pub note: String,
}

/// Default working hours when a team has no configured per-weekday rule.
pub const DEFAULT_WORK_START_HOUR: u8 = 9;
pub const DEFAULT_WORK_END_HOUR: u8 = 18;
pub const SLOT_STEP_MINUTES: i64 = 30;
pub const BUFFER_MINUTES: i64 = 30;
pub const DEFAULT_SLOT_DURATION_MINUTES: i32 = 120;
