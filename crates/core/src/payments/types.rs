//! Payment Reconciler data types: Invoice, Payment, StripeEvent. `sqlx::FromRow`
//! projections of their tables, mirroring the convention in `scheduling::types`.

use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Partial,
    Paid,
    Overdue,
    Void,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub org_id: Uuid,
    pub invoice_number: String,
    pub booking_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub status: InvoiceStatus,
    pub total_cents: i64,
    pub paid_cents: i64,
    pub currency: String,
}

impl Invoice {
    pub fn balance_cents(&self) -> i64 {
        (self.total_cents - self.paid_cents).max(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Payment {
    pub payment_id: Uuid,
    pub org_id: Uuid,
    pub invoice_id: Option<Uuid>,
    pub booking_id: Option<Uuid>,
    pub provider: String,
    pub provider_ref: Option<String>,
    pub checkout_session_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub method: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum StripeEventStatus {
    Processing,
    Succeeded,
    Ignored,
    Error,
}

#[derive(Debug, Clone, FromRow)]
pub struct StripeEventRecord {
    pub id: i64,
    pub event_id: String,
    pub payload_hash: String,
    pub status: StripeEventStatus,
    pub org_id: Option<Uuid>,
    pub event_type: String,
    pub event_created_at: OffsetDateTime,
    pub invoice_id: Option<Uuid>,
    pub booking_id: Option<Uuid>,
    pub last_error: Option<String>,
    pub processing_started_at: OffsetDateTime,
}
