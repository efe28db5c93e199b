//! Stripe webhook signature verification and idempotent dispatch. Grounded on
//! `webhooks.rs::verify_event`'s manual HMAC fallback and `_resolve_org_for_event`
//! / `_handle_webhook_event` in the original payments routes.

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use sqlx::{PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{OpsError, OpsResult};
use crate::outbox::enqueue_email;
use crate::scheduling::{Booking, BookingStatus, DepositStatus};

use super::types::{Invoice, InvoiceStatus, PaymentStatus, StripeEventRecord, StripeEventStatus};

type HmacSha256 = Hmac<Sha256>;

/// Verifies a `Stripe-Signature` header of the form `t=<unix>,v1=<hex hmac>`
/// against `sha256("{t}.{payload}")` keyed by the webhook secret, rejecting
/// timestamps older than `tolerance_seconds`. Grounded verbatim on the manual
/// fallback path in `webhooks.rs::verify_event`.
pub fn verify_signature(
    payload: &[u8],
    signature_header: &str,
    webhook_secret: &str,
    now: OffsetDateTime,
    tolerance_seconds: i64,
) -> OpsResult<()> {
    let mut timestamp: Option<i64> = None;
    let mut v1_signature: Option<&str> = None;

    for part in signature_header.split(',') {
        let mut kv = part.splitn(2, '=');
        match (kv.next(), kv.next()) {
            (Some("t"), Some(v)) => timestamp = v.parse().ok(),
            (Some("v1"), Some(v)) => v1_signature = Some(v),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(OpsError::Precondition {
        reason: "missing timestamp in signature header",
    })?;
    let v1_signature = v1_signature.ok_or(OpsError::Precondition {
        reason: "missing v1 signature in signature header",
    })?;

    if (now.unix_timestamp() - timestamp).abs() > tolerance_seconds {
        return Err(OpsError::Precondition {
            reason: "webhook timestamp outside tolerance",
        });
    }

    let secret_key = webhook_secret.strip_prefix("whsec_").unwrap_or(webhook_secret);
    let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes())
        .map_err(|_| OpsError::Precondition { reason: "invalid webhook secret" })?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    let computed = hex::encode(mac.finalize().into_bytes());

    if computed != v1_signature {
        return Err(OpsError::Precondition {
            reason: "webhook signature mismatch",
        });
    }

    Ok(())
}

/// Minimal projection of the Stripe event payload this reconciler needs.
/// Deliberately narrower than the full Stripe API surface: unknown fields are
/// ignored by `serde`, which keeps this resilient to API version drift the
/// way `webhooks.rs`'s own manual-parse fallback is.
#[derive(Debug, Deserialize)]
pub struct RawStripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub created: i64,
    pub data: RawStripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct RawStripeEventData {
    pub object: RawStripeObject,
}

#[derive(Debug, Deserialize, Default)]
pub struct RawStripeObject {
    pub id: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub customer: Option<String>,
    pub amount_total: Option<i64>,
    pub amount_received: Option<i64>,
    pub currency: Option<String>,
    pub payment_intent: Option<String>,
    pub status: Option<String>,
    pub payment_status: Option<String>,
}

pub fn parse_event(payload: &[u8]) -> OpsResult<RawStripeEvent> {
    serde_json::from_slice(payload)
        .map_err(|e| OpsError::Conflict { reason: format!("malformed event json: {e}") })
}

/// Opaque sink for subscription/billing-platform events this reconciler shares
/// the webhook endpoint with but does not itself interpret. Operations Core
/// only guarantees these are not lost or misfiled; the sink owns their meaning.
#[async_trait::async_trait]
pub trait BillingEventSink: Send + Sync {
    async fn handle(&self, event: &RawStripeEvent) -> anyhow::Result<()>;
}

pub struct NoopBillingEventSink;

#[async_trait::async_trait]
impl BillingEventSink for NoopBillingEventSink {
    async fn handle(&self, _event: &RawStripeEvent) -> anyhow::Result<()> {
        Ok(())
    }
}

fn is_subscription_event(kind: &str) -> bool {
    kind.starts_with("customer.subscription.") || kind.starts_with("invoiceitem.")
}

fn is_checkout_or_intent_event(kind: &str) -> bool {
    kind.starts_with("checkout.session.") || kind.starts_with("payment_intent.")
}

/// Resolved tenant context for a single webhook event, plus the precedence
/// branch used so the caller can attribute a `missing_org`/`org_not_found`
/// outcome to the right metric bucket.
struct OrgContext {
    org_id: Uuid,
    invoice_id: Option<Uuid>,
    booking_id: Option<Uuid>,
}

enum OrgResolution {
    Resolved(OrgContext),
    /// Resolvable-but-nothing-to-do: treated as 200 ignored.
    Unresolvable,
}

/// Implements `_resolve_org_for_event`'s precedence exactly, including the
/// `ambiguous_metadata` rejection this implementation adds for the case the
/// original source leaves unhandled.
async fn resolve_org_for_event(
    tx: &mut Transaction<'_, Postgres>,
    object: &RawStripeObject,
) -> OpsResult<OrgResolution> {
    let invoice_meta = object.metadata.get("invoice_id");
    let booking_meta = object.metadata.get("booking_id");

    if invoice_meta.is_some() && booking_meta.is_some() {
        return Err(OpsError::Conflict {
            reason: "ambiguous_metadata".to_string(),
        });
    }

    if let Some(invoice_id) = invoice_meta {
        let invoice_id = Uuid::parse_str(invoice_id)
            .map_err(|_| OpsError::Conflict { reason: "invoice_not_found".to_string() })?;
        let invoice = sqlx::query_as::<_, Invoice>(
            "SELECT * FROM invoices WHERE invoice_id = $1 FOR UPDATE",
        )
        .bind(invoice_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(OpsError::Conflict { reason: "invoice_not_found".to_string() })?;

        return Ok(OrgResolution::Resolved(OrgContext {
            org_id: invoice.org_id,
            invoice_id: Some(invoice_id),
            booking_id: invoice.booking_id,
        }));
    }

    if let Some(booking_id) = booking_meta {
        let booking_id = Uuid::parse_str(booking_id)
            .map_err(|_| OpsError::Conflict { reason: "booking_not_found".to_string() })?;
        let booking = sqlx::query_as::<_, Booking>(
            "SELECT * FROM bookings WHERE booking_id = $1 FOR UPDATE",
        )
        .bind(booking_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(OpsError::Conflict { reason: "booking_not_found".to_string() })?;

        return Ok(OrgResolution::Resolved(OrgContext {
            org_id: booking.org_id,
            invoice_id: None,
            booking_id: Some(booking_id),
        }));
    }

    // Correlate by checkout_session_id / payment_intent_id on an existing booking.
    let correlated = sqlx::query_as::<_, Booking>(
        r#"SELECT * FROM bookings
           WHERE stripe_checkout_session_id = $1 OR stripe_payment_intent_id = $2
           FOR UPDATE"#,
    )
    .bind(&object.id)
    .bind(object.payment_intent.as_deref().unwrap_or(""))
    .fetch_optional(&mut **tx)
    .await?;

    if let Some(booking) = correlated {
        return Ok(OrgResolution::Resolved(OrgContext {
            org_id: booking.org_id,
            invoice_id: None,
            booking_id: Some(booking.booking_id),
        }));
    }

    // Stripe customer_id -> org billing record.
    if let Some(customer_id) = &object.customer {
        let billing_org: Option<(Uuid,)> = sqlx::query_as(
            "SELECT org_id FROM org_billing_accounts WHERE stripe_customer_id = $1",
        )
        .bind(customer_id)
        .fetch_optional(&mut **tx)
        .await?;

        if let Some((org_id,)) = billing_org {
            if let Some(meta_org_raw) = object.metadata.get("org_id") {
                let meta_org = Uuid::parse_str(meta_org_raw).ok();
                if meta_org != Some(org_id) {
                    return Err(OpsError::Conflict {
                        reason: "org_customer_mismatch".to_string(),
                    });
                }
            }
            return Ok(OrgResolution::Resolved(OrgContext {
                org_id,
                invoice_id: None,
                booking_id: None,
            }));
        }
    }

    // Bare org_id metadata, verified to exist.
    if let Some(org_id_raw) = object.metadata.get("org_id") {
        let org_id = Uuid::parse_str(org_id_raw)
            .map_err(|_| OpsError::Conflict { reason: "org_not_found".to_string() })?;
        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT org_id FROM organizations WHERE org_id = $1")
            .bind(org_id)
            .fetch_optional(&mut **tx)
            .await?;
        if exists.is_some() {
            return Ok(OrgResolution::Resolved(OrgContext {
                org_id,
                invoice_id: None,
                booking_id: None,
            }));
        }
        return Err(OpsError::Conflict {
            reason: "org_not_found".to_string(),
        });
    }

    Ok(OrgResolution::Unresolvable)
}

const STUCK_PROCESSING_MESSAGE_PREFIX: &str = "recovered from stuck processing at";

/// Atomically claims exclusive processing rights for `event_id`, or recovers a
/// row stuck in `processing` past `stuck_timeout_minutes`, or reclaims a row
/// left in `error` by a prior dispatch exception (terminal, not a race, so no
/// timeout gate applies — per §7, `error` exists precisely so the next
/// delivery attempt can retry it). Mirrors `webhooks.rs::handle_event`'s
/// `INSERT ... ON CONFLICT ... DO UPDATE ... WHERE ... RETURNING` claim,
/// generalized from subscription billing to the full event ledger.
async fn claim_event(
    tx: &mut Transaction<'_, Postgres>,
    event_id: &str,
    event_type: &str,
    event_created_at: OffsetDateTime,
    payload_hash: &str,
    org_id: Uuid,
    invoice_id: Option<Uuid>,
    booking_id: Option<Uuid>,
    stuck_timeout_minutes: i64,
) -> OpsResult<Option<StripeEventRecord>> {
    let claimed = sqlx::query_as::<_, StripeEventRecord>(
        r#"INSERT INTO stripe_events
               (event_id, payload_hash, status, org_id, event_type, event_created_at,
                invoice_id, booking_id, processing_started_at)
           VALUES ($1, $2, 'processing', $3, $4, $5, $6, $7, now())
           ON CONFLICT (event_id) DO UPDATE SET
               status = 'processing',
               processing_started_at = now(),
               last_error = $8
           WHERE stripe_events.status = 'error'
             OR (stripe_events.status = 'processing'
                 AND stripe_events.processing_started_at < now() - ($9 || ' minutes')::interval)
           RETURNING *"#,
    )
    .bind(event_id)
    .bind(payload_hash)
    .bind(org_id)
    .bind(event_type)
    .bind(event_created_at)
    .bind(invoice_id)
    .bind(booking_id)
    .bind(format!("{STUCK_PROCESSING_MESSAGE_PREFIX} {}", OffsetDateTime::now_utc()))
    .bind(stuck_timeout_minutes)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(claimed)
}

async fn load_existing_event(
    tx: &mut Transaction<'_, Postgres>,
    event_id: &str,
) -> OpsResult<Option<StripeEventRecord>> {
    let row = sqlx::query_as::<_, StripeEventRecord>(
        "SELECT * FROM stripe_events WHERE event_id = $1 FOR UPDATE",
    )
    .bind(event_id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row)
}

async fn finalize_event(
    tx: &mut Transaction<'_, Postgres>,
    event_id: &str,
    status: StripeEventStatus,
    last_error: Option<&str>,
) -> OpsResult<()> {
    sqlx::query("UPDATE stripe_events SET status = $1, last_error = $2 WHERE event_id = $3")
        .bind(status)
        .bind(last_error)
        .bind(event_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub enum WebhookOutcome {
    Processed,
    Ignored,
    Duplicate,
}

/// Full webhook pipeline: verify (by the caller, before this is invoked),
/// resolve org, claim the event, dispatch, finalize. One DB transaction for
/// the whole pipeline, matching §5's "no transaction held across an external
/// call" rule — this path makes no outbound HTTP calls of its own.
pub async fn process_webhook(
    pool: &PgPool,
    payload: &[u8],
    billing_sink: &dyn BillingEventSink,
    stuck_timeout_minutes: i64,
) -> OpsResult<WebhookOutcome> {
    let event = parse_event(payload)?;
    if event.id.is_empty() {
        return Err(OpsError::Precondition { reason: "missing event id" });
    }
    let payload_hash = sha256_hex(payload);
    let event_created_at = OffsetDateTime::from_unix_timestamp(event.created)
        .unwrap_or_else(|_| OffsetDateTime::now_utc());

    let mut tx = pool.begin().await?;

    let resolution = resolve_org_for_event(&mut tx, &event.data.object).await?;
    let ctx = match resolution {
        OrgResolution::Unresolvable => {
            tx.commit().await?;
            return Ok(WebhookOutcome::Ignored);
        }
        OrgResolution::Resolved(ctx) => ctx,
    };

    if let Some(existing) = load_existing_event(&mut tx, &event.id).await? {
        if existing.org_id != Some(ctx.org_id) {
            return Err(OpsError::Conflict {
                reason: "event_org_mismatch".to_string(),
            });
        }
        if existing.payload_hash != payload_hash {
            return Err(OpsError::Conflict {
                reason: "payload_mismatch".to_string(),
            });
        }
        let still_processing = existing.status == StripeEventStatus::Processing
            && existing.processing_started_at
                > OffsetDateTime::now_utc() - time::Duration::minutes(stuck_timeout_minutes);
        if matches!(existing.status, StripeEventStatus::Succeeded | StripeEventStatus::Ignored)
            || still_processing
        {
            tx.commit().await?;
            return Ok(WebhookOutcome::Duplicate);
        }
    }

    let claimed = claim_event(
        &mut tx,
        &event.id,
        &event.kind,
        event_created_at,
        &payload_hash,
        ctx.org_id,
        ctx.invoice_id,
        ctx.booking_id,
        stuck_timeout_minutes,
    )
    .await?;

    if claimed.is_none() {
        tx.commit().await?;
        return Ok(WebhookOutcome::Duplicate);
    }

    let dispatch_result = dispatch_event(&mut tx, &event, &ctx, billing_sink).await;

    match &dispatch_result {
        Ok(applied) => {
            let status = if *applied {
                StripeEventStatus::Succeeded
            } else {
                StripeEventStatus::Ignored
            };
            finalize_event(&mut tx, &event.id, status, None).await?;
        }
        Err(err) => {
            finalize_event(&mut tx, &event.id, StripeEventStatus::Error, Some(&err.to_string()))
                .await?;
        }
    }

    tx.commit().await?;

    match dispatch_result? {
        true => Ok(WebhookOutcome::Processed),
        false => Ok(WebhookOutcome::Ignored),
    }
}

/// Returns `Ok(true)` when a business effect was applied, `Ok(false)` for a
/// recognized no-op branch (e.g. a subscription event with nothing to do).
async fn dispatch_event(
    tx: &mut Transaction<'_, Postgres>,
    event: &RawStripeEvent,
    ctx: &OrgContext,
    billing_sink: &dyn BillingEventSink,
) -> OpsResult<bool> {
    if is_subscription_event(&event.kind) {
        billing_sink
            .handle(event)
            .await
            .map_err(|e| OpsError::Internal(format!("billing event sink failed: {e}")))?;
        return Ok(true);
    }

    if !is_checkout_or_intent_event(&event.kind) {
        return Ok(false);
    }

    if let Some(invoice_id) = ctx.invoice_id {
        return handle_invoice_event(tx, event, invoice_id).await;
    }
    if let Some(booking_id) = ctx.booking_id {
        return handle_deposit_event(tx, event, booking_id).await;
    }

    Ok(false)
}

fn event_succeeded(event: &RawStripeEvent) -> bool {
    matches!(event.kind.as_str(), "checkout.session.completed")
        || event.kind == "payment_intent.succeeded"
        || event.data.object.payment_status.as_deref() == Some("paid")
        || event.data.object.status.as_deref() == Some("succeeded")
}

fn event_failed_or_expired(event: &RawStripeEvent) -> bool {
    event.kind == "payment_intent.payment_failed"
        || event.kind == "checkout.session.expired"
        || event.data.object.status.as_deref() == Some("failed")
}

/// Grounded on `_handle_invoice_event` in `routes_payments.py`.
async fn handle_invoice_event(
    tx: &mut Transaction<'_, Postgres>,
    event: &RawStripeEvent,
    invoice_id: Uuid,
) -> OpsResult<bool> {
    let amount = event
        .data
        .object
        .amount_total
        .or(event.data.object.amount_received)
        .unwrap_or(0);

    if event_failed_or_expired(event) {
        upsert_payment(
            tx,
            event,
            Some(invoice_id),
            None,
            amount,
            event.data.object.currency.as_deref().unwrap_or("usd"),
            PaymentStatus::Failed,
        )
        .await?;
        enqueue_dunning_email(tx, invoice_id).await?;
        return Ok(true);
    }
    if !event_succeeded(event) {
        return Ok(false);
    }

    upsert_payment(
        tx,
        event,
        Some(invoice_id),
        None,
        amount,
        event.data.object.currency.as_deref().unwrap_or("usd"),
        PaymentStatus::Succeeded,
    )
    .await?;

    let invoice = sqlx::query_as::<_, Invoice>(
        "SELECT * FROM invoices WHERE invoice_id = $1 FOR UPDATE",
    )
    .bind(invoice_id)
    .fetch_one(&mut **tx)
    .await?;

    let paid_total = invoice.paid_cents + amount;
    let status = if paid_total >= invoice.total_cents {
        InvoiceStatus::Paid
    } else if paid_total > 0 {
        InvoiceStatus::Partial
    } else {
        invoice.status
    };

    sqlx::query("UPDATE invoices SET paid_cents = $1, status = $2 WHERE invoice_id = $3")
        .bind(paid_total)
        .bind(status)
        .bind(invoice_id)
        .execute(&mut **tx)
        .await?;

    Ok(true)
}

/// Grounded on `_handle_deposit_event` in `routes_payments.py`.
async fn handle_deposit_event(
    tx: &mut Transaction<'_, Postgres>,
    event: &RawStripeEvent,
    booking_id: Uuid,
) -> OpsResult<bool> {
    let booking =
        sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE booking_id = $1 FOR UPDATE")
            .bind(booking_id)
            .fetch_one(&mut **tx)
            .await?;

    sqlx::query(
        "UPDATE bookings SET stripe_payment_intent_id = $1 WHERE booking_id = $2 AND stripe_payment_intent_id IS NULL",
    )
    .bind(&event.data.object.payment_intent)
    .bind(booking_id)
    .execute(&mut **tx)
    .await?;

    let amount = event
        .data
        .object
        .amount_total
        .or(event.data.object.amount_received)
        .unwrap_or(booking.deposit_cents.unwrap_or(0));

    if event_succeeded(event) {
        upsert_payment(
            tx,
            event,
            None,
            Some(booking_id),
            amount,
            event.data.object.currency.as_deref().unwrap_or("usd"),
            PaymentStatus::Succeeded,
        )
        .await?;
        mark_deposit_paid(tx, &booking).await?;
        return Ok(true);
    }

    if event_failed_or_expired(event) {
        upsert_payment(
            tx,
            event,
            None,
            Some(booking_id),
            amount,
            event.data.object.currency.as_deref().unwrap_or("usd"),
            PaymentStatus::Failed,
        )
        .await?;
        let new_status = if event.kind.contains("expired") {
            DepositStatus::Expired
        } else {
            DepositStatus::Failed
        };
        mark_deposit_failed(tx, &booking, new_status).await?;
        return Ok(true);
    }

    Ok(false)
}

/// `mark_deposit_paid`: HIGH risk never auto-confirms (§4.1).
async fn mark_deposit_paid(tx: &mut Transaction<'_, Postgres>, booking: &Booking) -> OpsResult<()> {
    use crate::policy::RiskBand;

    let new_status = if booking.risk_band == RiskBand::High {
        booking.status
    } else if booking.status == BookingStatus::Pending {
        BookingStatus::Confirmed
    } else {
        booking.status
    };

    sqlx::query("UPDATE bookings SET deposit_status = 'paid', status = $1 WHERE booking_id = $2")
        .bind(new_status)
        .bind(booking.booking_id)
        .execute(&mut **tx)
        .await?;

    if new_status == BookingStatus::Confirmed && booking.status != BookingStatus::Confirmed {
        enqueue_confirmation_email(tx, booking).await?;
    }
    Ok(())
}

/// Resolves the email address an outbox message for this booking should go
/// to, via the client record. Bookings with no linked client (walk-ins,
/// imported data) have nothing to send to, so callers skip the enqueue.
async fn resolve_client_email(
    tx: &mut Transaction<'_, Postgres>,
    client_id: Option<Uuid>,
) -> OpsResult<Option<String>> {
    let Some(client_id) = client_id else { return Ok(None) };
    let row: Option<(String,)> =
        sqlx::query_as("SELECT email FROM clients WHERE client_id = $1")
            .bind(client_id)
            .fetch_optional(&mut **tx)
            .await?;
    Ok(row.map(|(email,)| email))
}

async fn enqueue_confirmation_email(
    tx: &mut Transaction<'_, Postgres>,
    booking: &Booking,
) -> OpsResult<()> {
    let Some(recipient) = resolve_client_email(tx, booking.client_id).await? else {
        return Ok(());
    };
    let dedupe_key = format!("booking:{}:confirmation", booking.booking_id);
    enqueue_email(
        tx,
        booking.org_id,
        &recipient,
        "Your booking is confirmed",
        "Your deposit has been received and your booking is confirmed.",
        Some(booking.booking_id),
        None,
        "booking_confirmation",
        &dedupe_key,
    )
    .await?;
    Ok(())
}

async fn enqueue_dunning_email(
    tx: &mut Transaction<'_, Postgres>,
    invoice_id: Uuid,
) -> OpsResult<()> {
    let invoice = sqlx::query_as::<_, Invoice>(
        "SELECT * FROM invoices WHERE invoice_id = $1",
    )
    .bind(invoice_id)
    .fetch_one(&mut **tx)
    .await?;

    let Some(recipient) = resolve_client_email(tx, invoice.customer_id).await? else {
        return Ok(());
    };
    let dedupe_key = format!("invoice:{invoice_id}:dunning:payment_failed");
    enqueue_email(
        tx,
        invoice.org_id,
        &recipient,
        "Payment failed for your invoice",
        "We were unable to process payment for your invoice. Please try again.",
        invoice.booking_id,
        Some(invoice_id),
        "dunning",
        &dedupe_key,
    )
    .await?;
    Ok(())
}

async fn mark_deposit_failed(
    tx: &mut Transaction<'_, Postgres>,
    booking: &Booking,
    new_deposit_status: DepositStatus,
) -> OpsResult<()> {
    let new_status = if booking.status == BookingStatus::Pending {
        BookingStatus::Cancelled
    } else {
        booking.status
    };

    sqlx::query("UPDATE bookings SET deposit_status = $1, status = $2 WHERE booking_id = $3")
        .bind(new_deposit_status)
        .bind(new_status)
        .bind(booking.booking_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Inserts or merges a `Payment` row, parameterized on `status` so both the
/// succeeded and failed/expired branches of `handle_invoice_event`/
/// `handle_deposit_event` can record their outcome. Per §8 invariant 5,
/// succeeded payments are monotonic: a replay or later failure notification
/// never downgrades a row that already recorded `SUCCEEDED`.
async fn upsert_payment(
    tx: &mut Transaction<'_, Postgres>,
    event: &RawStripeEvent,
    invoice_id: Option<Uuid>,
    booking_id: Option<Uuid>,
    amount_cents: i64,
    currency: &str,
    status: PaymentStatus,
) -> OpsResult<()> {
    let provider_ref = event.data.object.payment_intent.clone().unwrap_or_else(|| event.data.object.id.clone());

    sqlx::query(
        r#"INSERT INTO payments
               (payment_id, org_id, invoice_id, booking_id, provider, provider_ref,
                checkout_session_id, payment_intent_id, amount_cents, currency, status, created_at)
           SELECT gen_random_uuid(), COALESCE(
                      (SELECT org_id FROM invoices WHERE invoice_id = $2),
                      (SELECT org_id FROM bookings WHERE booking_id = $3)
                  ),
                  $2, $3, 'stripe', $1, $4, $1, $5, $6, $7, now()
           ON CONFLICT (provider, provider_ref) WHERE provider_ref IS NOT NULL
           DO UPDATE SET
               status = CASE WHEN payments.status = 'SUCCEEDED' THEN payments.status ELSE EXCLUDED.status END,
               amount_cents = GREATEST(payments.amount_cents, EXCLUDED.amount_cents)"#,
    )
    .bind(&provider_ref)
    .bind(invoice_id)
    .bind(booking_id)
    .bind(&event.data.object.id)
    .bind(amount_cents)
    .bind(currency)
    .bind(status)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

fn sha256_hex(payload: &[u8]) -> String {
    use sha2::Digest;
    hex::encode(Sha256::digest(payload))
}
