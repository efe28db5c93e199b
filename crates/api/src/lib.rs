// API crate clippy configuration
#![allow(clippy::useless_vec)] // Vec preferred for API response patterns
#![allow(clippy::single_match)] // Clearer in some cases
#![allow(clippy::needless_borrows_for_generic_args)] // Sometimes needed for clarity
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Operations Core API Library
//!
//! The HTTP surface over the Scheduling Engine, Policy Engine, Payment
//! Reconciler, and Outbox & Delivery Pipeline defined in `opscore-core`.

pub mod error;
pub mod idempotency;
pub mod identity;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;
