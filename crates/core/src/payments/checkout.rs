//! Stripe checkout session creation for deposits and invoices. Side-effect
//! first, DB commit second: the external call happens before any row is
//! written, so a crash after a successful Stripe call still leaves Stripe as
//! the source of truth (the webhook reconciles it later).

use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{OpsError, OpsResult};
use crate::scheduling::{Booking, DepositStatus};

use super::circuit_breaker::CircuitBreaker;
use super::stripe_client::StripeClient;
use super::types::{Invoice, InvoiceStatus};

pub struct CheckoutResult {
    pub checkout_url: String,
    pub checkout_session_id: String,
}

/// Wraps a Stripe call with the circuit breaker, translating `CircuitOpen`
/// into the dedicated dependency-unavailable error rather than a generic 502.
async fn guarded_call<F, Fut, T>(breaker: &CircuitBreaker, call: F) -> OpsResult<T>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, anyhow::Error>>,
{
    if !breaker.allow_request() {
        return Err(OpsError::DependencyUnavailable {
            reason: "stripe_temporarily_unavailable",
        });
    }

    match call().await {
        Ok(value) => {
            breaker.record_success();
            Ok(value)
        }
        Err(err) => {
            breaker.record_failure();
            tracing::warn!(error = %err, "stripe call failed");
            Err(OpsError::UpstreamError {
                code: "stripe_checkout_unavailable",
            })
        }
    }
}

#[cfg(feature = "stripe")]
async fn create_stripe_checkout_session(
    stripe: &StripeClient,
    amount_cents: i64,
    currency: &str,
    description: &str,
    success_url: &str,
    cancel_url: &str,
    metadata: Vec<(&'static str, String)>,
) -> Result<CheckoutResult, anyhow::Error> {
    use stripe::{
        CheckoutSessionMode, CreateCheckoutSession, CreateCheckoutSessionLineItems,
        CreateCheckoutSessionLineItemsPriceData,
        CreateCheckoutSessionLineItemsPriceDataProductData, CreateCheckoutSessionPaymentIntentData,
        Currency,
    };

    let currency: Currency = currency.parse().unwrap_or(Currency::USD);
    let mut params = CreateCheckoutSession::new();
    params.mode = Some(CheckoutSessionMode::Payment);
    params.success_url = Some(success_url);
    params.cancel_url = Some(cancel_url);
    params.line_items = Some(vec![CreateCheckoutSessionLineItems {
        quantity: Some(1),
        price_data: Some(CreateCheckoutSessionLineItemsPriceData {
            currency,
            unit_amount: Some(amount_cents),
            product_data: Some(CreateCheckoutSessionLineItemsPriceDataProductData {
                name: description.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }]);
    params.payment_intent_data = Some(CreateCheckoutSessionPaymentIntentData {
        metadata: Some(metadata.iter().cloned().collect()),
        ..Default::default()
    });
    params.metadata = Some(metadata.into_iter().collect());

    let session = stripe::CheckoutSession::create(stripe.inner(), params).await?;
    let url = session
        .url
        .ok_or_else(|| anyhow::anyhow!("stripe did not return a checkout url"))?;

    Ok(CheckoutResult {
        checkout_url: url,
        checkout_session_id: session.id.to_string(),
    })
}

#[cfg(not(feature = "stripe"))]
async fn create_stripe_checkout_session(
    _stripe: &StripeClient,
    _amount_cents: i64,
    _currency: &str,
    _description: &str,
    _success_url: &str,
    _cancel_url: &str,
    _metadata: Vec<(&'static str, String)>,
) -> Result<CheckoutResult, anyhow::Error> {
    Err(anyhow::anyhow!("stripe integration compiled out"))
}

/// `POST /v1/payments/deposit/checkout`. Pre-check and the final write are two
/// separate, short transactions with no transaction held open across the
/// Stripe HTTP call in between (§4.3/§5): the `FOR UPDATE` lock taken during
/// the pre-check is released at its commit, so a slow Stripe round trip never
/// blocks other writers on this booking row.
pub async fn create_deposit_checkout(
    pool: &PgPool,
    stripe: &StripeClient,
    breaker: &CircuitBreaker,
    org_id: Uuid,
    booking_id: Uuid,
    success_url: &str,
    cancel_url: &str,
) -> OpsResult<CheckoutResult> {
    let amount_cents = {
        let mut tx = pool.begin().await?;
        let booking = sqlx::query_as::<_, Booking>(
            "SELECT * FROM bookings WHERE booking_id = $1 FOR UPDATE",
        )
        .bind(booking_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(OpsError::NotFound { entity: "booking" })?;

        if booking.org_id != org_id {
            return Err(OpsError::Forbidden {
                reason: "cross_org_forbidden",
            });
        }
        if !booking.deposit_required {
            return Err(OpsError::Precondition {
                reason: "deposit not required for this booking",
            });
        }
        if booking.deposit_status == Some(DepositStatus::Paid) {
            return Err(OpsError::Conflict {
                reason: "deposit_already_paid".to_string(),
            });
        }
        let amount_cents = booking
            .deposit_cents
            .ok_or(OpsError::Precondition { reason: "deposit amount missing" })?;
        tx.commit().await?;
        amount_cents
    };

    let result = guarded_call(breaker, || {
        create_stripe_checkout_session(
            stripe,
            amount_cents,
            "usd",
            "Booking deposit",
            success_url,
            cancel_url,
            vec![
                ("booking_id", booking_id.to_string()),
                ("org_id", org_id.to_string()),
            ],
        )
    })
    .await?;

    let mut tx = pool.begin().await?;
    sqlx::query(
        "UPDATE bookings SET stripe_checkout_session_id = $1 WHERE booking_id = $2",
    )
    .bind(&result.checkout_session_id)
    .bind(booking_id)
    .execute(&mut *tx)
    .await?;

    insert_pending_payment(
        &mut tx,
        org_id,
        None,
        Some(booking_id),
        &result.checkout_session_id,
        amount_cents,
        "usd",
    )
    .await?;

    tx.commit().await?;
    Ok(result)
}

/// `POST /v1/payments/invoice/checkout`. Same pre-check/commit/call/write-back
/// shape as `create_deposit_checkout` — see its doc comment.
pub async fn create_invoice_checkout(
    pool: &PgPool,
    stripe: &StripeClient,
    breaker: &CircuitBreaker,
    org_id: Uuid,
    invoice_id: Uuid,
    success_url: &str,
    cancel_url: &str,
) -> OpsResult<CheckoutResult> {
    let invoice = {
        let mut tx = pool.begin().await?;
        let invoice = sqlx::query_as::<_, Invoice>(
            "SELECT * FROM invoices WHERE invoice_id = $1 FOR UPDATE",
        )
        .bind(invoice_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(OpsError::NotFound { entity: "invoice" })?;

        if invoice.org_id != org_id {
            return Err(OpsError::Forbidden {
                reason: "cross_org_forbidden",
            });
        }
        if !matches!(
            invoice.status,
            InvoiceStatus::Sent | InvoiceStatus::Partial | InvoiceStatus::Overdue
        ) {
            return Err(OpsError::Precondition {
                reason: "invoice not in a payable state",
            });
        }
        if invoice.balance_cents() <= 0 {
            return Err(OpsError::Conflict {
                reason: "invoice_already_paid".to_string(),
            });
        }
        tx.commit().await?;
        invoice
    };
    let balance = invoice.balance_cents();

    let result = guarded_call(breaker, || {
        create_stripe_checkout_session(
            stripe,
            balance,
            &invoice.currency,
            &format!("Invoice {}", invoice.invoice_number),
            success_url,
            cancel_url,
            vec![
                ("invoice_id", invoice_id.to_string()),
                ("org_id", org_id.to_string()),
            ],
        )
    })
    .await?;

    let mut tx = pool.begin().await?;
    insert_pending_payment(
        &mut tx,
        org_id,
        Some(invoice_id),
        invoice.booking_id,
        &result.checkout_session_id,
        balance,
        &invoice.currency,
    )
    .await?;

    tx.commit().await?;
    Ok(result)
}

async fn insert_pending_payment(
    tx: &mut Transaction<'_, Postgres>,
    org_id: Uuid,
    invoice_id: Option<Uuid>,
    booking_id: Option<Uuid>,
    checkout_session_id: &str,
    amount_cents: i64,
    currency: &str,
) -> OpsResult<()> {
    sqlx::query(
        r#"INSERT INTO payments
               (payment_id, org_id, invoice_id, booking_id, provider, checkout_session_id,
                amount_cents, currency, status, created_at)
           VALUES (gen_random_uuid(), $1, $2, $3, 'stripe', $4, $5, $6, 'PENDING', now())"#,
    )
    .bind(org_id)
    .bind(invoice_id)
    .bind(booking_id)
    .bind(checkout_session_id)
    .bind(amount_cents)
    .bind(currency)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
