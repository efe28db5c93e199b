//! Token-bucket rate limiting keyed by `(org_id, action)`.
//!
//! One bucket per key, refilled continuously at a configured rate. Exceeding the
//! limit is surfaced to callers as 429 + `Retry-After` at the API boundary; this
//! module only tracks bucket state and answers "would this consume succeed".

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::tenancy::OrgId;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateLimitOutcome {
    Allowed,
    Limited { retry_after: Duration },
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// In-memory token-bucket limiter. Matches the platform's existing
/// `RateLimiter::new_in_memory()` construction style; a Redis-backed variant would
/// implement the same `check` signature for multi-process deployments but is not
/// needed for a single `opscore-api` process.
pub struct RateLimiter {
    capacity: f64,
    refill_per_second: f64,
    buckets: Mutex<HashMap<(OrgId, &'static str), Bucket>>,
}

impl RateLimiter {
    pub fn new_in_memory(capacity: u32, refill_per_second: f64) -> Self {
        Self {
            capacity: capacity as f64,
            refill_per_second,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Attempts to consume one token for `(org_id, action)`. Returns
    /// `RateLimitOutcome::Limited` with a retry-after duration when the bucket is
    /// empty; otherwise consumes a token and returns `Allowed`.
    pub fn check(&self, org_id: OrgId, action: &'static str) -> RateLimitOutcome {
        let now = Instant::now();
        let mut buckets = match self.buckets.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let bucket = buckets.entry((org_id, action)).or_insert(Bucket {
            tokens: self.capacity,
            last_refill: now,
        });

        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_second).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            RateLimitOutcome::Allowed
        } else {
            let deficit = 1.0 - bucket.tokens;
            let wait_secs = deficit / self.refill_per_second.max(f64::EPSILON);
            RateLimitOutcome::Limited {
                retry_after: Duration::from_secs_f64(wait_secs),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn org() -> OrgId {
        OrgId(Uuid::from_u128(1))
    }

    #[test]
    fn allows_up_to_capacity_then_limits() {
        let limiter = RateLimiter::new_in_memory(2, 0.0001);
        assert_eq!(limiter.check(org(), "resend_email"), RateLimitOutcome::Allowed);
        assert_eq!(limiter.check(org(), "resend_email"), RateLimitOutcome::Allowed);
        matches!(
            limiter.check(org(), "resend_email"),
            RateLimitOutcome::Limited { .. }
        );
    }

    #[test]
    fn buckets_are_independent_per_action() {
        let limiter = RateLimiter::new_in_memory(1, 0.0001);
        assert_eq!(limiter.check(org(), "resend_email"), RateLimitOutcome::Allowed);
        assert_eq!(limiter.check(org(), "replay_outbox"), RateLimitOutcome::Allowed);
    }
}
