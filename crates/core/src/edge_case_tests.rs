#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Cross-module boundary and scenario tests for the Operations Core.
//!
//! Complements the unit tests living beside each pure function (policy,
//! conflicts, slots, circuit breaker, backoff) with the scenarios from §8
//! that span more than one module but still need no database: policy
//! downgrade idempotency end-to-end, the outbox backoff sequence, the risk
//! band thresholds at their exact boundary, and webhook signature tolerance.

#[cfg(test)]
mod policy_downgrade_idempotence {
    use crate::policy::{
        evaluate, DepositBasis, DepositSnapshot, PolicyInputs, RiskBand,
        DEFAULT_HIGH_RISK_POSTAL_PREFIXES,
    };
    use time::macros::datetime;

    #[test]
    fn applying_downgrade_twice_matches_applying_once() {
        let now = datetime!(2026-01-01 00:00:00 UTC);
        let starts_at = now + time::Duration::hours(12);
        let decision = evaluate(PolicyInputs {
            configured_deposit_percent: 0.25,
            is_first_time_client: true,
            service_type: "deep",
            now,
            starts_at,
            estimated_total_cents: Some(40_000),
            postal_prefix: None,
            prior_cancellations: 0,
            high_risk_postal_prefixes: DEFAULT_HIGH_RISK_POSTAL_PREFIXES,
            extra_deposit_reasons: &[],
        });
        assert_eq!(decision.risk.band, RiskBand::High);

        let once = decision.downgrade("operator_waived");
        let twice = once.downgrade("operator_waived");

        assert!(!once.deposit.required);
        assert_eq!(once.deposit.amount_cents, twice.deposit.amount_cents);
        assert_eq!(once.deposit.reasons, twice.deposit.reasons);
        let downgrade_tags = twice
            .deposit
            .reasons
            .iter()
            .filter(|r| r.starts_with("downgraded:"))
            .count();
        assert_eq!(downgrade_tags, 1, "downgrade tag must appear at most once");
    }

    #[test]
    fn downgrading_with_a_different_reason_still_appends_at_most_one_tag() {
        let snapshot = DepositSnapshot {
            required: true,
            percent: 0.25,
            amount_cents: Some(10_000),
            basis: DepositBasis::PercentClamped,
            reasons: vec!["risk_required".to_string()],
        };
        let first = crate::policy::downgrade_deposit_requirement(&snapshot, "waived_a");
        let second = crate::policy::downgrade_deposit_requirement(&first, "waived_b");
        let downgrade_tags = second
            .reasons
            .iter()
            .filter(|r| r.starts_with("downgraded:"))
            .count();
        assert_eq!(downgrade_tags, 1);
        assert!(!second.required);
    }
}

#[cfg(test)]
mod risk_band_thresholds {
    use crate::policy::{evaluate_risk, RiskBand, RiskInputs, DEFAULT_HIGH_RISK_POSTAL_PREFIXES};

    fn assess(is_new_client: bool, estimated_total_cents: Option<i64>, prior_cancellations: u32) -> (i32, RiskBand) {
        let assessment = evaluate_risk(
            RiskInputs {
                is_new_client,
                estimated_total_cents,
                lead_time_hours: 72.0,
                postal_prefix: None,
                prior_cancellations,
            },
            DEFAULT_HIGH_RISK_POSTAL_PREFIXES,
        );
        (assessment.score, assessment.band)
    }

    #[test]
    fn score_44_is_low_45_is_medium() {
        // new_client(20) + high_total(25) = 45 exactly.
        let (score, band) = assess(true, Some(30_000), 0);
        assert_eq!(score, 45);
        assert_eq!(band, RiskBand::Medium);

        // new_client(20) alone stays well under the medium band.
        let (score, band) = assess(true, None, 0);
        assert_eq!(score, 20);
        assert_eq!(band, RiskBand::Low);
    }

    #[test]
    fn score_70_is_medium_75_is_high() {
        // cancel_history(45) + high_total(25) = 70, still medium.
        let (score, band) = assess(false, Some(30_000), 1);
        assert_eq!(score, 70);
        assert_eq!(band, RiskBand::Medium);

        // new_client(20) + cancel_history(45) + repeat_cancel(10) = 75 exactly.
        let (score, band) = assess(true, None, 2);
        assert_eq!(score, 75);
        assert_eq!(band, RiskBand::High);
    }
}

#[cfg(test)]
mod outbox_backoff_sequence {
    use crate::outbox::{backoff_duration, DeliveryPolicy};
    use std::time::Duration as StdDuration;

    #[test]
    fn three_failures_then_dead_matches_spec_scenario() {
        let policy = DeliveryPolicy {
            max_retries: 3,
            base_backoff: StdDuration::from_secs(60),
            call_timeout: StdDuration::from_secs(10),
        };
        assert_eq!(backoff_duration(&policy, 1), time::Duration::seconds(60));
        assert_eq!(backoff_duration(&policy, 2), time::Duration::seconds(120));
        assert_eq!(backoff_duration(&policy, 3), time::Duration::seconds(240));
        // A 4th attempt would equal max_retries and dead-letters instead of
        // scheduling another backoff; that branch is exercised in
        // `outbox::delivery`'s own test module against the attempt counter.
    }
}

#[cfg(test)]
mod webhook_signature_tolerance {
    use crate::payments::verify_signature;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;
    use time::macros::datetime;

    fn sign(secret: &str, timestamp: i64, payload: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn signature_exactly_at_tolerance_boundary_is_accepted() {
        let now = datetime!(2026-01-01 00:05:00 UTC);
        let event_ts = now.unix_timestamp() - 300;
        let payload = b"{\"id\":\"evt_1\"}";
        let sig = sign("whsec_test", event_ts, payload);
        let header = format!("t={event_ts},v1={sig}");
        assert!(verify_signature(payload, &header, "whsec_test", now, 300).is_ok());
    }

    #[test]
    fn signature_one_second_past_tolerance_is_rejected() {
        let now = datetime!(2026-01-01 00:05:01 UTC);
        let event_ts = now.unix_timestamp() - 301;
        let payload = b"{\"id\":\"evt_1\"}";
        let sig = sign("whsec_test", event_ts, payload);
        let header = format!("t={event_ts},v1={sig}");
        assert!(verify_signature(payload, &header, "whsec_test", now, 300).is_err());
    }

    #[test]
    fn mismatched_signature_is_rejected() {
        let now = datetime!(2026-01-01 00:00:00 UTC);
        let header = format!("t={},v1=deadbeef", now.unix_timestamp());
        assert!(verify_signature(b"payload", &header, "whsec_test", now, 300).is_err());
    }
}

#[cfg(test)]
mod circuit_breaker_plus_backoff {
    use crate::payments::circuit_breaker::{CircuitBreaker, CircuitState};
    use std::time::Duration as StdDuration;

    #[test]
    fn open_breaker_blocks_calls_until_reset_elapses() {
        let breaker = CircuitBreaker::new(2, StdDuration::from_millis(20), 1);
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_request());
        std::thread::sleep(StdDuration::from_millis(25));
        assert!(breaker.allow_request());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }
}
