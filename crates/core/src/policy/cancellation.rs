//! Cancellation policy. Builds the three-window refund schedule (free / partial /
//! late) attached to a booking at creation or reschedule time. Grounded on
//! `_build_cancellation_policy()` in the original scheduler.

use serde::{Deserialize, Serialize};

const FREE_CUTOFF_HEAVY_HOURS: f64 = 72.0;
const FREE_CUTOFF_STANDARD_HOURS: f64 = 48.0;
const PARTIAL_START_HEAVY_HOURS: f64 = 48.0;
const PARTIAL_START_STANDARD_HOURS: f64 = 24.0;

const BASE_PARTIAL_PERCENT: f64 = 50.0;
const FIRST_TIME_PARTIAL_CAP: f64 = 40.0;
const HIGH_VALUE_PARTIAL_CAP: f64 = 25.0;
const SHORT_NOTICE_PARTIAL_CAP: f64 = 25.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancellationWindowKind {
    Free,
    Partial,
    Late,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancellationWindow {
    pub kind: CancellationWindowKind,
    /// Lower bound of lead-time hours this window applies to (inclusive).
    pub from_hours: f64,
    /// Upper bound, exclusive; `None` means unbounded (the free window).
    pub to_hours: Option<f64>,
    pub refund_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancellationSnapshot {
    pub windows: Vec<CancellationWindow>,
    pub rules_fired: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct CancellationInputs {
    pub is_heavy_service: bool,
    pub is_first_time_client: bool,
    pub is_high_value: bool,
    pub is_short_notice: bool,
}

pub fn build_cancellation_snapshot(inputs: CancellationInputs) -> CancellationSnapshot {
    let free_cutoff = if inputs.is_heavy_service {
        FREE_CUTOFF_HEAVY_HOURS
    } else {
        FREE_CUTOFF_STANDARD_HOURS
    };
    let partial_start = if inputs.is_heavy_service {
        PARTIAL_START_HEAVY_HOURS
    } else {
        PARTIAL_START_STANDARD_HOURS
    };

    let mut partial_percent = BASE_PARTIAL_PERCENT;
    let mut rules_fired = Vec::new();

    if inputs.is_first_time_client {
        partial_percent = partial_percent.min(FIRST_TIME_PARTIAL_CAP);
        rules_fired.push("first_time_client".to_string());
    }
    if inputs.is_high_value {
        partial_percent = partial_percent.min(HIGH_VALUE_PARTIAL_CAP);
        rules_fired.push("high_value_booking".to_string());
    }
    if inputs.is_short_notice {
        partial_percent = partial_percent.min(SHORT_NOTICE_PARTIAL_CAP);
        rules_fired.push("short_notice".to_string());
    }

    let windows = vec![
        CancellationWindow {
            kind: CancellationWindowKind::Free,
            from_hours: free_cutoff,
            to_hours: None,
            refund_percent: 100.0,
        },
        CancellationWindow {
            kind: CancellationWindowKind::Partial,
            from_hours: partial_start,
            to_hours: Some(free_cutoff),
            refund_percent: partial_percent,
        },
        CancellationWindow {
            kind: CancellationWindowKind::Late,
            from_hours: 0.0,
            to_hours: Some(partial_start),
            refund_percent: 0.0,
        },
    ];

    CancellationSnapshot {
        windows,
        rules_fired,
    }
}

impl CancellationSnapshot {
    /// Refund percent applicable at `lead_time_hours` before the booking start.
    pub fn refund_percent_at(&self, lead_time_hours: f64) -> f64 {
        for window in &self.windows {
            let above_floor = lead_time_hours >= window.from_hours;
            let below_ceiling = window.to_hours.is_none_or(|to| lead_time_hours < to);
            if above_floor && below_ceiling {
                return window.refund_percent;
            }
        }
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_service_uses_48h_free_cutoff() {
        let snapshot = build_cancellation_snapshot(CancellationInputs {
            is_heavy_service: false,
            is_first_time_client: false,
            is_high_value: false,
            is_short_notice: false,
        });
        assert_eq!(snapshot.refund_percent_at(48.0), 100.0);
        assert_eq!(snapshot.refund_percent_at(47.99), 50.0);
        assert_eq!(snapshot.refund_percent_at(23.99), 0.0);
    }

    #[test]
    fn heavy_service_uses_72h_free_cutoff_and_48h_partial_start() {
        let snapshot = build_cancellation_snapshot(CancellationInputs {
            is_heavy_service: true,
            is_first_time_client: false,
            is_high_value: false,
            is_short_notice: false,
        });
        assert_eq!(snapshot.refund_percent_at(72.0), 100.0);
        assert_eq!(snapshot.refund_percent_at(50.0), 50.0);
        assert_eq!(snapshot.refund_percent_at(10.0), 0.0);
    }

    #[test]
    fn multiple_reductions_take_the_minimum() {
        let snapshot = build_cancellation_snapshot(CancellationInputs {
            is_heavy_service: false,
            is_first_time_client: true,
            is_high_value: true,
            is_short_notice: true,
        });
        let partial = snapshot
            .windows
            .iter()
            .find(|w| w.kind == CancellationWindowKind::Partial)
            .unwrap();
        assert_eq!(partial.refund_percent, 25.0);
    }
}
