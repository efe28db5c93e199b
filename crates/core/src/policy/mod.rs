//! Policy Engine: pure functions from (lead, time, service) to deposit and
//! cancellation snapshots, plus risk scoring. Nothing in this module touches the
//! database or the clock directly — callers compute `lead_time_hours` once and
//! pass it in, which is what makes these functions trivially unit-testable.

pub mod cancellation;
pub mod deposit;
pub mod risk;

pub use cancellation::{
    build_cancellation_snapshot, CancellationInputs, CancellationSnapshot, CancellationWindow,
    CancellationWindowKind,
};
pub use deposit::{
    downgrade_deposit_requirement, evaluate_deposit_policy, DepositBasis, DepositInputs,
    DepositSnapshot, HEAVY_SERVICES,
};
pub use risk::{
    evaluate_risk, RiskAssessment, RiskBand, RiskInputs, DEFAULT_HIGH_RISK_POSTAL_PREFIXES,
};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Lead-time hours = max(0, (starts_at - now) / hour), matching the original's
/// `max(0, round((starts_at − now)/hour, 2))` (the rounding is cosmetic for
/// display; internal comparisons use the full-precision value).
pub fn lead_time_hours(now: OffsetDateTime, starts_at: OffsetDateTime) -> f64 {
    let delta = (starts_at - now).as_seconds_f64() / 3600.0;
    delta.max(0.0)
}

/// The combined output of the Policy Engine for a booking: deposit snapshot,
/// cancellation snapshot, and the risk assessment that fed both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositDecision {
    pub deposit: DepositSnapshot,
    pub cancellation: CancellationSnapshot,
    pub risk: RiskAssessment,
}

impl DepositDecision {
    /// Applies an operator-initiated downgrade. Idempotent: calling this twice
    /// with the same reason leaves the decision unchanged after the first call.
    /// Per the resolved Open Question, this decision replaces the live policy
    /// fields but does not retroactively rewrite the immutable `policy_snapshot`
    /// embedded document — callers are responsible for recording the override
    /// as a separate audit entry.
    pub fn downgrade(&self, reason: &str) -> DepositDecision {
        DepositDecision {
            deposit: downgrade_deposit_requirement(&self.deposit, reason),
            cancellation: self.cancellation.clone(),
            risk: self.risk.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PolicyInputs<'a> {
    pub configured_deposit_percent: f64,
    pub is_first_time_client: bool,
    pub service_type: &'a str,
    pub now: OffsetDateTime,
    pub starts_at: OffsetDateTime,
    pub estimated_total_cents: Option<i64>,
    pub postal_prefix: Option<&'a str>,
    pub prior_cancellations: u32,
    pub high_risk_postal_prefixes: &'a [&'a str],
    pub extra_deposit_reasons: &'a [String],
}

/// Evaluates the full Policy Engine: risk first (it can force a deposit), then
/// the deposit and cancellation snapshots that consult the risk outcome and the
/// shared lead-time/service-type classification.
pub fn evaluate(inputs: PolicyInputs<'_>) -> DepositDecision {
    let lead_time = lead_time_hours(inputs.now, inputs.starts_at);
    let is_heavy = HEAVY_SERVICES.contains(&inputs.service_type);
    let is_high_value = inputs
        .estimated_total_cents
        .is_some_and(|cents| cents >= deposit::HIGH_VALUE_THRESHOLD_CENTS);
    let is_short_notice = lead_time < deposit::SHORT_NOTICE_HOURS;

    let risk = evaluate_risk(
        RiskInputs {
            is_new_client: inputs.is_first_time_client,
            estimated_total_cents: inputs.estimated_total_cents,
            lead_time_hours: lead_time,
            postal_prefix: inputs.postal_prefix,
            prior_cancellations: inputs.prior_cancellations,
        },
        inputs.high_risk_postal_prefixes,
    );

    let deposit = evaluate_deposit_policy(
        DepositInputs {
            configured_percent: inputs.configured_deposit_percent,
            is_first_time_client: inputs.is_first_time_client,
            service_type: inputs.service_type,
            lead_time_hours: lead_time,
            estimated_total_cents: inputs.estimated_total_cents,
            risk_required: risk.band.requires_deposit(),
        },
        inputs.extra_deposit_reasons,
    );

    let cancellation = build_cancellation_snapshot(CancellationInputs {
        is_heavy_service: is_heavy,
        is_first_time_client: inputs.is_first_time_client,
        is_high_value,
        is_short_notice,
    });

    DepositDecision {
        deposit,
        cancellation,
        risk,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn high_risk_first_time_deep_clean_forces_deposit_via_risk() {
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
        assert!(decision.deposit.required);
        assert_eq!(decision.deposit.amount_cents, Some(20_000));
    }
}
