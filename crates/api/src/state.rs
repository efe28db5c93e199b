//! Application state, constructed once in `main` and cloned (cheap, every
//! field is an `Arc` or otherwise shareable handle) into every axum handler.

use std::sync::Arc;

use sqlx::PgPool;

use opscore_core::payments::{CircuitBreaker, StripeClient, StripeConfig};
use opscore_shared::clock::{BusinessTimezone, Clock, SystemClock};
use opscore_shared::config::Config;
use opscore_shared::rate_limit::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub clock: Arc<dyn Clock>,
    pub business_timezone: BusinessTimezone,
    pub rate_limiter: Arc<RateLimiter>,
    pub stripe: Option<Arc<StripeClient>>,
    pub checkout_breaker: Arc<CircuitBreaker>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Arc<Config>) -> Self {
        let business_timezone =
            BusinessTimezone::from_offset_hours(config.business_timezone_offset_hours);

        let rate_limiter = Arc::new(RateLimiter::new_in_memory(
            config.rate_limit_default_capacity,
            config.rate_limit_default_refill_per_second,
        ));

        let stripe = match StripeConfig::from_app_config(&config) {
            Some(stripe_config) => {
                tracing::info!("stripe integration configured");
                Some(Arc::new(StripeClient::new(stripe_config)))
            }
            None => {
                tracing::warn!("stripe not configured, checkout/webhook endpoints will return dependency_unavailable");
                None
            }
        };

        let checkout_breaker = Arc::new(CircuitBreaker::new(
            config.circuit_breaker_failure_threshold,
            std::time::Duration::from_secs(config.circuit_breaker_reset_seconds),
            config.circuit_breaker_half_open_probes,
        ));

        Self {
            pool,
            config,
            clock: Arc::new(SystemClock),
            business_timezone,
            rate_limiter,
            stripe,
            checkout_breaker,
        }
    }
}
