//! Outbox & Delivery Pipeline data types: the durable work queue, the composed
//! email ledger, the email dead-letter queue, and the per-scope unsubscribe set.
//! `sqlx::FromRow` projections of their tables, mirroring the convention in
//! `scheduling::types` and `payments::types`.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum OutboxKind {
    Email,
    Export,
}

impl OutboxKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OutboxKind::Email => "email",
            OutboxKind::Export => "export",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum OutboxStatus {
    Pending,
    Sent,
    Dead,
}

/// The durable work queue row. `(org_id, dedupe_key)` is unique, which is what
/// makes `enqueue` an idempotent no-op for a repeated key.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub event_id: Uuid,
    pub org_id: Uuid,
    pub kind: OutboxKind,
    pub status: OutboxStatus,
    pub attempts: i32,
    pub next_attempt_at: OffsetDateTime,
    pub last_error: Option<String>,
    pub payload: serde_json::Value,
    pub dedupe_key: String,
    pub created_at: OffsetDateTime,
}

/// Record of a composed outbound email, visible to observers even before
/// delivery. `dedupe_key` matches the sibling `OutboxEvent` so the two can be
/// correlated without a foreign key (the outbox is kind-polymorphic).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct EmailEvent {
    pub event_id: Uuid,
    pub org_id: Uuid,
    pub dedupe_key: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub booking_id: Option<Uuid>,
    pub invoice_id: Option<Uuid>,
    pub email_type: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum EmailFailureStatus {
    Pending,
    Sent,
    Dead,
}

/// DLQ row per failed email, keyed by `(org_id, dedupe_key)`, with its own
/// retry schedule independent of the generic outbox row it was spawned from —
/// operators inspect and replay this queue specifically for email.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct EmailFailure {
    pub failure_id: Uuid,
    pub org_id: Uuid,
    pub dedupe_key: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub status: EmailFailureStatus,
    pub attempt_count: i32,
    pub max_retries: i32,
    pub next_retry_at: OffsetDateTime,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum UnsubscribeScope {
    Marketing,
    Nps,
}

impl UnsubscribeScope {
    /// Email types that carry an unsubscribe scope. Transactional emails
    /// (booking confirmations, dunning) have no scope and are never suppressed.
    pub fn for_email_type(email_type: &str) -> Option<Self> {
        match email_type {
            "marketing" => Some(UnsubscribeScope::Marketing),
            "nps" => Some(UnsubscribeScope::Nps),
            _ => None,
        }
    }
}
