//! Risk scoring. A pure function from booking inputs to an integer score and band;
//! grounded verbatim on `evaluate_risk()` in the original scheduler.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum RiskBand {
    Low,
    Medium,
    High,
}

impl RiskBand {
    pub fn requires_manual_confirmation(self) -> bool {
        matches!(self, RiskBand::High)
    }

    pub fn requires_deposit(self) -> bool {
        matches!(self, RiskBand::Medium | RiskBand::High)
    }
}

/// Default high-risk postal code prefixes. Operator-configurable; these are the
/// original source's built-in defaults (`HIGH_RISK_POSTAL_PREFIXES`).
pub const DEFAULT_HIGH_RISK_POSTAL_PREFIXES: &[&str] = &["X0A", "Z9Z", "T9X"];

#[derive(Debug, Clone, Copy)]
pub struct RiskInputs<'a> {
    pub is_new_client: bool,
    pub estimated_total_cents: Option<i64>,
    pub lead_time_hours: f64,
    pub postal_prefix: Option<&'a str>,
    pub prior_cancellations: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub score: i32,
    pub band: RiskBand,
    pub reasons: Vec<String>,
}

pub const HIGH_VALUE_THRESHOLD_CENTS: i64 = 30_000;
pub const SHORT_NOTICE_HOURS: f64 = 24.0;

const WEIGHT_NEW_CLIENT: i32 = 20;
const WEIGHT_HIGH_TOTAL: i32 = 25;
const WEIGHT_SHORT_NOTICE: i32 = 20;
const WEIGHT_AREA_FLAGGED: i32 = 15;
const WEIGHT_CANCEL_HISTORY: i32 = 45;
const WEIGHT_REPEAT_CANCEL: i32 = 10;

pub fn evaluate_risk(
    inputs: RiskInputs<'_>,
    high_risk_postal_prefixes: &[&str],
) -> RiskAssessment {
    let mut score: i32 = 0;
    let mut reasons = Vec::new();

    if inputs.is_new_client {
        score += WEIGHT_NEW_CLIENT;
        reasons.push("new_client".to_string());
    }

    if inputs
        .estimated_total_cents
        .is_some_and(|cents| cents >= HIGH_VALUE_THRESHOLD_CENTS)
    {
        score += WEIGHT_HIGH_TOTAL;
        reasons.push("high_total".to_string());
    }

    if inputs.lead_time_hours < SHORT_NOTICE_HOURS {
        score += WEIGHT_SHORT_NOTICE;
        reasons.push("short_notice".to_string());
    }

    if let Some(prefix) = inputs.postal_prefix {
        if high_risk_postal_prefixes
            .iter()
            .any(|flagged| flagged.eq_ignore_ascii_case(prefix))
        {
            score += WEIGHT_AREA_FLAGGED;
            reasons.push("area_flagged".to_string());
        }
    }

    if inputs.prior_cancellations > 0 {
        score += WEIGHT_CANCEL_HISTORY;
        reasons.push("cancel_history".to_string());
        if inputs.prior_cancellations > 1 {
            score += WEIGHT_REPEAT_CANCEL;
        }
    }

    let score = score.clamp(0, 100);
    let band = if score >= 75 {
        RiskBand::High
    } else if score >= 45 {
        RiskBand::Medium
    } else {
        RiskBand::Low
    };

    RiskAssessment {
        score,
        band,
        reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_inputs() -> RiskInputs<'static> {
        RiskInputs {
            is_new_client: false,
            estimated_total_cents: None,
            lead_time_hours: 72.0,
            postal_prefix: None,
            prior_cancellations: 0,
        }
    }

    #[test]
    fn no_reasons_yields_low_band_and_zero_score() {
        let assessment = evaluate_risk(base_inputs(), DEFAULT_HIGH_RISK_POSTAL_PREFIXES);
        assert_eq!(assessment.score, 0);
        assert_eq!(assessment.band, RiskBand::Low);
        assert!(assessment.reasons.is_empty());
    }

    #[test]
    fn clamps_at_100_with_contrived_reasons() {
        let inputs = RiskInputs {
            is_new_client: true,
            estimated_total_cents: Some(50_000),
            lead_time_hours: 1.0,
            postal_prefix: Some("X0A"),
            prior_cancellations: 3,
        };
        let assessment = evaluate_risk(inputs, DEFAULT_HIGH_RISK_POSTAL_PREFIXES);
        // 20 + 25 + 20 + 15 + 45 + 10 = 135, clamped to 100
        assert_eq!(assessment.score, 100);
        assert_eq!(assessment.band, RiskBand::High);
    }

    #[test]
    fn high_band_requires_manual_confirmation_and_deposit() {
        assert!(RiskBand::High.requires_manual_confirmation());
        assert!(RiskBand::High.requires_deposit());
        assert!(!RiskBand::Medium.requires_manual_confirmation());
        assert!(RiskBand::Medium.requires_deposit());
        assert!(!RiskBand::Low.requires_deposit());
    }

    #[test]
    fn single_cancellation_does_not_add_repeat_weight() {
        let inputs = RiskInputs {
            prior_cancellations: 1,
            ..base_inputs()
        };
        let assessment = evaluate_risk(inputs, DEFAULT_HIGH_RISK_POSTAL_PREFIXES);
        assert_eq!(assessment.score, WEIGHT_CANCEL_HISTORY);
    }
}
