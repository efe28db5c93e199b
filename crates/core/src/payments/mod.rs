//! Payment Reconciler: Stripe checkout creation and idempotent webhook intake.

pub mod checkout;
pub mod circuit_breaker;
pub mod stripe_client;
pub mod types;
pub mod webhook;

pub use checkout::{create_deposit_checkout, create_invoice_checkout, CheckoutResult};
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use stripe_client::{StripeClient, StripeConfig};
pub use types::{
    Invoice, InvoiceStatus, Payment, PaymentStatus, StripeEventRecord, StripeEventStatus,
};
pub use webhook::{
    parse_event, process_webhook, verify_signature, BillingEventSink, NoopBillingEventSink,
    RawStripeEvent, WebhookOutcome,
};
