//! Circuit breaker guarding outbound calls to Stripe. Closed → open after N
//! consecutive failures; open → half-open after a cooldown; half-open → closed
//! after K consecutive successful probes, or back to open on any probe failure.
//! State is process-local (one breaker per worker/api instance), matching the
//! Outbox & Delivery Pipeline's per-process circuit breaker description.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: CircuitState,
    opened_at: Option<Instant>,
}

/// Thread-safe breaker. `consecutive_failures`/`consecutive_successes` are
/// tracked as atomics for cheap reads from callers deciding whether to even
/// attempt a call; the `state`/`opened_at` pair lives behind a mutex since a
/// state transition must see both consistently.
pub struct CircuitBreaker {
    failure_threshold: u32,
    reset_after: Duration,
    half_open_probes: u32,
    consecutive_failures: AtomicU32,
    consecutive_successes: AtomicU32,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, reset_after: Duration, half_open_probes: u32) -> Self {
        Self {
            failure_threshold,
            reset_after,
            half_open_probes,
            consecutive_failures: AtomicU32::new(0),
            consecutive_successes: AtomicU32::new(0),
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                opened_at: None,
            }),
        }
    }

    /// Call before attempting the guarded operation. Transitions Open ->
    /// HalfOpen once the cooldown elapses, as a side effect of the check.
    pub fn allow_request(&self) -> bool {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match guard.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = guard
                    .opened_at
                    .map(|at| at.elapsed() >= self.reset_after)
                    .unwrap_or(false);
                if elapsed {
                    guard.state = CircuitState::HalfOpen;
                    self.consecutive_successes.store(0, Ordering::SeqCst);
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.state == CircuitState::HalfOpen {
            let successes = self.consecutive_successes.fetch_add(1, Ordering::SeqCst) + 1;
            if successes >= self.half_open_probes {
                guard.state = CircuitState::Closed;
                guard.opened_at = None;
            }
        }
    }

    pub fn record_failure(&self) {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.state == CircuitState::HalfOpen {
            guard.state = CircuitState::Open;
            guard.opened_at = Some(Instant::now());
            self.consecutive_failures.store(0, Ordering::SeqCst);
            return;
        }

        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= self.failure_threshold {
            guard.state = CircuitState::Open;
            guard.opened_at = Some(Instant::now());
        }
    }

    pub fn state(&self) -> CircuitState {
        match self.inner.lock() {
            Ok(guard) => guard.state,
            Err(poisoned) => poisoned.into_inner().state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(30), 2);
        assert!(breaker.allow_request());
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_request());
    }

    #[test]
    fn half_open_closes_after_k_successful_probes() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(0), 2);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.allow_request());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens_immediately() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(0), 2);
        breaker.record_failure();
        assert!(breaker.allow_request());
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }
}
