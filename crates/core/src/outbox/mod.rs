//! Outbox & Delivery Pipeline: transactional enqueue, worker-pool delivery
//! with per-kind circuit breakers and exponential backoff, dead-lettering,
//! and operator replay — the mechanism every other module uses to produce a
//! side effect (an email, an export push) without coupling its own
//! transaction to that side effect's latency or availability.

pub mod delivery;
pub mod enqueue;
pub mod queries;
pub mod replay;
pub mod types;
pub mod unsubscribe;

pub use delivery::{
    backoff_duration, claim_batch, deliver_email_event, deliver_export_event, pending_lag_seconds,
    DeliveryOutcome, DeliveryPolicy, EmailAdapter, ExportAdapter, LoggingEmailAdapter,
    NoopEmailAdapter, NoopExportAdapter, SweepCounters,
};
pub use enqueue::{enqueue_email, enqueue_event};
pub use queries::{list_dead_letter_events, list_email_failures, list_export_dead_letter};
pub use replay::{replay_email_failure, replay_export_event, replay_outbox_event, ExportReplayResult};
pub use types::{
    EmailEvent, EmailFailure, EmailFailureStatus, OutboxEvent, OutboxKind, OutboxStatus,
    UnsubscribeScope,
};
pub use unsubscribe::{is_unsubscribed, set_unsubscribed};
