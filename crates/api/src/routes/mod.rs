//! Aggregates the per-module route sets into a single router over `AppState`.

pub mod outbox;
pub mod payments;
pub mod scheduling;

use axum::Router;

use crate::state::AppState;

pub fn create_router() -> Router<AppState> {
    Router::new()
        .merge(scheduling::router())
        .merge(payments::router())
        .merge(outbox::router())
}
