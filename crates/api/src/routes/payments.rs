//! Payment Reconciler surface: checkout session creation and the Stripe
//! webhook sink.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use opscore_core::payments::{create_deposit_checkout, create_invoice_checkout, process_webhook};
use opscore_core::payments::NoopBillingEventSink;

use crate::error::{ApiError, ApiResult};
use crate::identity::RequestIdentity;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/payments/deposit/checkout", post(deposit_checkout))
        .route("/v1/payments/invoice/checkout", post(invoice_checkout))
        .route("/v1/payments/stripe/webhook", post(stripe_webhook))
        .route("/stripe/webhook", post(stripe_webhook))
}

#[derive(Debug, Deserialize)]
pub struct DepositCheckoutRequest {
    pub booking_id: Uuid,
}

/// `POST /v1/payments/deposit/checkout` response shape per §6.
#[derive(Debug, Serialize)]
pub struct DepositCheckoutResponse {
    pub checkout_url: String,
    pub provider: &'static str,
    pub booking_id: Uuid,
}

/// `POST /v1/payments/invoice/checkout` response shape (`InvoicePaymentInitResponse`
/// per §6).
#[derive(Debug, Serialize)]
pub struct InvoicePaymentInitResponse {
    pub checkout_url: String,
    pub provider: &'static str,
    pub invoice_id: Uuid,
}

fn require_stripe(state: &AppState) -> ApiResult<&opscore_core::payments::StripeClient> {
    state.stripe.as_deref().ok_or_else(|| {
        ApiError::Ops(opscore_core::OpsError::DependencyUnavailable {
            reason: "stripe integration is not configured",
        })
    })
}

fn require_url<'a>(url: &'a Option<String>, name: &'static str) -> ApiResult<&'a str> {
    url.as_deref()
        .ok_or_else(|| ApiError::BadRequest(format!("{name} is not configured")))
}

async fn deposit_checkout(
    State(state): State<AppState>,
    ident: RequestIdentity,
    Json(body): Json<DepositCheckoutRequest>,
) -> ApiResult<Json<DepositCheckoutResponse>> {
    let stripe = require_stripe(&state)?;
    let result = create_deposit_checkout(
        &state.pool,
        stripe,
        &state.checkout_breaker,
        ident.org_id.0,
        body.booking_id,
        require_url(&state.config.stripe_success_url, "stripe_success_url")?,
        require_url(&state.config.stripe_cancel_url, "stripe_cancel_url")?,
    )
    .await?;

    Ok(Json(DepositCheckoutResponse {
        checkout_url: result.checkout_url,
        provider: "stripe",
        booking_id: body.booking_id,
    }))
}

#[derive(Debug, Deserialize)]
pub struct InvoiceCheckoutRequest {
    pub invoice_id: Uuid,
}

async fn invoice_checkout(
    State(state): State<AppState>,
    ident: RequestIdentity,
    Json(body): Json<InvoiceCheckoutRequest>,
) -> ApiResult<Json<InvoicePaymentInitResponse>> {
    let stripe = require_stripe(&state)?;
    let result = create_invoice_checkout(
        &state.pool,
        stripe,
        &state.checkout_breaker,
        ident.org_id.0,
        body.invoice_id,
        require_url(&state.config.stripe_invoice_success_url, "stripe_invoice_success_url")?,
        require_url(&state.config.stripe_invoice_cancel_url, "stripe_invoice_cancel_url")?,
    )
    .await?;

    Ok(Json(InvoicePaymentInitResponse {
        checkout_url: result.checkout_url,
        provider: "stripe",
        invoice_id: body.invoice_id,
    }))
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub received: bool,
    pub processed: bool,
}

/// Unauthenticated: Stripe signs the payload itself, so this route deliberately
/// bypasses `RequestIdentity` and instead verifies `Stripe-Signature`.
async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> ApiResult<Json<WebhookResponse>> {
    let stripe = require_stripe(&state)?;
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("missing Stripe-Signature header".to_string()))?;

    opscore_core::payments::verify_signature(
        &body,
        signature,
        &stripe.config().webhook_secret,
        state.clock.now(),
        state.config.webhook_timestamp_tolerance_seconds,
    )?;

    let sink = NoopBillingEventSink;
    let outcome = process_webhook(
        &state.pool,
        &body,
        &sink,
        state.config.stuck_processing_timeout_minutes,
    )
    .await?;

    // Per §6: `{received: true, processed: bool}` on 200 regardless of which
    // non-error branch fired — `processed` distinguishes "this call applied a
    // business effect" from "ignored/duplicate, no-op by design".
    let processed = matches!(outcome, opscore_core::payments::WebhookOutcome::Processed);

    Ok(Json(WebhookResponse {
        received: true,
        processed,
    }))
}
