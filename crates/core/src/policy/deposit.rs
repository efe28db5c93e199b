//! Deposit policy. A pure function producing an immutable `DepositSnapshot`;
//! grounded verbatim on `evaluate_deposit_policy()` in the original scheduler,
//! including its fixed reason ordering (order affects only snapshot rendering,
//! not the computed percent/amount, but is preserved for reproducibility).

use serde::{Deserialize, Serialize};

pub const HEAVY_SERVICES: &[&str] = &["deep", "move_out_empty", "move_in_empty"];

pub const SHORT_NOTICE_HOURS: f64 = 24.0;
pub const LATE_HOURS: f64 = 48.0;
pub const HIGH_VALUE_THRESHOLD_CENTS: i64 = 30_000;

pub const MIN_DEPOSIT_CENTS: i64 = 5_000;
pub const MAX_DEPOSIT_CENTS: i64 = 20_000;

const BASE_PERCENT_FLOOR_HEAVY: f64 = 0.35;
const BASE_PERCENT_FLOOR_LATE: f64 = 0.40;
const BASE_PERCENT_FLOOR_SHORT_NOTICE: f64 = 0.50;
const BASE_PERCENT_FLOOR_HIGH_VALUE: f64 = 0.30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepositBasis {
    PercentClamped,
    FixedMinimum,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositSnapshot {
    pub required: bool,
    pub percent: f64,
    pub amount_cents: Option<i64>,
    pub basis: DepositBasis,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct DepositInputs<'a> {
    pub configured_percent: f64,
    pub is_first_time_client: bool,
    pub service_type: &'a str,
    pub lead_time_hours: f64,
    pub estimated_total_cents: Option<i64>,
    pub risk_required: bool,
}

/// Builds a `DepositSnapshot` from policy inputs and any extra caller-supplied
/// reasons (e.g. an operator forcing a deposit for an out-of-band reason).
pub fn evaluate_deposit_policy(
    inputs: DepositInputs<'_>,
    extra_reasons: &[String],
) -> DepositSnapshot {
    let mut percent = inputs.configured_percent;
    let mut reasons = Vec::new();

    if inputs.is_first_time_client {
        reasons.push("first_time_client".to_string());
    }

    if HEAVY_SERVICES.contains(&inputs.service_type) {
        reasons.push(format!("service_type_{}", inputs.service_type));
        percent = percent.max(BASE_PERCENT_FLOOR_HEAVY);
    }

    if inputs.lead_time_hours < SHORT_NOTICE_HOURS {
        reasons.push("short_notice".to_string());
        percent = percent.max(BASE_PERCENT_FLOOR_SHORT_NOTICE);
    } else if inputs.lead_time_hours < LATE_HOURS {
        reasons.push("late_booking".to_string());
        percent = percent.max(BASE_PERCENT_FLOOR_LATE);
    }

    if inputs
        .estimated_total_cents
        .is_some_and(|cents| cents >= HIGH_VALUE_THRESHOLD_CENTS)
    {
        reasons.push("high_value_booking".to_string());
        percent = percent.max(BASE_PERCENT_FLOOR_HIGH_VALUE);
    }

    reasons.extend(extra_reasons.iter().cloned());

    if inputs.risk_required && reasons.is_empty() {
        reasons.push("risk_required".to_string());
    }

    if reasons.is_empty() {
        return DepositSnapshot {
            required: false,
            percent: 0.0,
            amount_cents: None,
            basis: DepositBasis::Disabled,
            reasons,
        };
    }

    let (amount_cents, basis) = match inputs.estimated_total_cents {
        Some(total) => {
            let raw = (total as f64 * percent).ceil() as i64;
            (
                Some(raw.clamp(MIN_DEPOSIT_CENTS, MAX_DEPOSIT_CENTS)),
                DepositBasis::PercentClamped,
            )
        }
        None => (Some(MIN_DEPOSIT_CENTS), DepositBasis::FixedMinimum),
    };

    DepositSnapshot {
        required: true,
        percent,
        amount_cents,
        basis,
        reasons,
    }
}

/// Produces a new decision with `required=false`, preserving the original reasons
/// augmented by `downgraded:<reason>` — applied at most once. Grounded on
/// `downgrade_deposit_requirement()`: the original keeps `required=false`
/// permanently via an explicit operator call and checks for the tag in the
/// snapshot's own reason list before appending, so replays are idempotent.
pub fn downgrade_deposit_requirement(snapshot: &DepositSnapshot, reason: &str) -> DepositSnapshot {
    let marker = format!("downgraded:{reason}");
    let mut reasons = snapshot.reasons.clone();
    if !reasons.contains(&marker) {
        reasons.push(marker);
    }

    DepositSnapshot {
        required: false,
        percent: snapshot.percent,
        amount_cents: snapshot.amount_cents,
        basis: snapshot.basis,
        reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> DepositInputs<'static> {
        DepositInputs {
            configured_percent: 0.25,
            is_first_time_client: false,
            service_type: "standard",
            lead_time_hours: 72.0,
            estimated_total_cents: Some(10_000),
            risk_required: false,
        }
    }

    #[test]
    fn no_triggers_disables_deposit() {
        let snapshot = evaluate_deposit_policy(inputs(), &[]);
        assert!(!snapshot.required);
        assert_eq!(snapshot.basis, DepositBasis::Disabled);
        assert!(snapshot.amount_cents.is_none());
    }

    #[test]
    fn high_value_first_time_short_notice_deep_clean_clamps_to_max() {
        let inputs = DepositInputs {
            is_first_time_client: true,
            service_type: "deep",
            lead_time_hours: 12.0,
            estimated_total_cents: Some(40_000),
            ..inputs()
        };
        let snapshot = evaluate_deposit_policy(inputs, &[]);
        assert!(snapshot.required);
        // short_notice floor (0.50) dominates; 40000 * 0.50 = 20000, clamp ceiling is 20000
        assert_eq!(snapshot.amount_cents, Some(20_000));
        assert_eq!(
            snapshot.reasons,
            vec![
                "first_time_client",
                "service_type_deep",
                "short_notice",
                "high_value_booking",
            ]
        );
    }

    #[test]
    fn reason_order_is_fixed_and_late_excludes_short_notice() {
        let inputs = DepositInputs {
            lead_time_hours: 36.0,
            ..inputs()
        };
        let snapshot = evaluate_deposit_policy(inputs, &[]);
        assert_eq!(snapshot.reasons, vec!["late_booking"]);
    }

    #[test]
    fn amount_floors_at_minimum_for_small_totals() {
        let inputs = DepositInputs {
            is_first_time_client: true,
            estimated_total_cents: Some(1_000),
            ..inputs()
        };
        let snapshot = evaluate_deposit_policy(inputs, &[]);
        assert_eq!(snapshot.amount_cents, Some(MIN_DEPOSIT_CENTS));
    }

    #[test]
    fn downgrade_is_idempotent() {
        let snapshot = evaluate_deposit_policy(
            DepositInputs {
                is_first_time_client: true,
                ..inputs()
            },
            &[],
        );
        let once = downgrade_deposit_requirement(&snapshot, "operator_waived");
        let twice = downgrade_deposit_requirement(&once, "operator_waived");
        assert!(!twice.required);
        assert_eq!(
            twice.reasons.iter().filter(|r| r.as_str() == "downgraded:operator_waived").count(),
            1
        );
    }
}
