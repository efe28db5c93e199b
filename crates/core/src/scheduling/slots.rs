//! Slot generation and suggestion. Grounded on `generate_slots()` and
//! `SlotProvider.suggest_slots()` in the original scheduler.

use serde::Serialize;
use time::OffsetDateTime;

use super::conflicts::{bookings_conflict, overlaps_blackout};
use super::types::{DEFAULT_WORK_END_HOUR, DEFAULT_WORK_START_HOUR, SLOT_STEP_MINUTES};

#[derive(Debug, Clone, Copy)]
pub struct BlockingBooking {
    pub starts_at: OffsetDateTime,
    pub duration_minutes: i32,
}

#[derive(Debug, Clone, Copy)]
pub struct Blackout {
    pub starts_at: OffsetDateTime,
    pub ends_at: OffsetDateTime,
}

/// Enumerates every open candidate start for `duration_minutes` within
/// `[day_start, day_end)` (both UTC instants, already derived from the team's
/// working-hours-for-weekday or the 09:00-18:00 default), at a fixed
/// `SLOT_STEP_MINUTES` cadence. A candidate is open iff it overlaps no buffered
/// booking and no (unbuffered) blackout. Ordering is ascending by construction.
pub fn generate_slots(
    day_start: OffsetDateTime,
    day_end: OffsetDateTime,
    duration_minutes: i32,
    bookings: &[BlockingBooking],
    blackouts: &[Blackout],
) -> Vec<OffsetDateTime> {
    let mut slots = Vec::new();
    let mut candidate = day_start;
    let step = time::Duration::minutes(SLOT_STEP_MINUTES);

    while candidate + time::Duration::minutes(duration_minutes as i64) <= day_end {
        let blocked = bookings
            .iter()
            .any(|b| bookings_conflict(b.starts_at, b.duration_minutes, candidate, duration_minutes))
            || blackouts
                .iter()
                .any(|b| overlaps_blackout(b.starts_at, b.ends_at, candidate, duration_minutes));

        if !blocked {
            slots.push(candidate);
        }
        candidate += step;
    }

    slots
}

/// Default day window (UTC) for a team with no configured working-hours rule for
/// the weekday: `day_start.with_hour(DEFAULT_WORK_START_HOUR)` through
/// `day_start.with_hour(DEFAULT_WORK_END_HOUR)`.
pub fn default_day_window(local_midnight_utc: OffsetDateTime) -> (OffsetDateTime, OffsetDateTime) {
    (
        local_midnight_utc + time::Duration::hours(DEFAULT_WORK_START_HOUR as i64),
        local_midnight_utc + time::Duration::hours(DEFAULT_WORK_END_HOUR as i64),
    )
}

pub const MIN_SLOTS_SUGGESTED: usize = 2;
pub const MAX_SLOTS_SUGGESTED: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClarifierReason {
    None,
    LimitedAvailability,
    NoOpenSlots,
}

impl ClarifierReason {
    /// Human-readable sentence preserved verbatim from the original source, for
    /// callers/UIs that render prose rather than branch on the machine code.
    pub fn message(self) -> Option<&'static str> {
        match self {
            ClarifierReason::None => None,
            ClarifierReason::LimitedAvailability => Some(
                "Limited availability in that window; can we look at nearby times the same day?",
            ),
            ClarifierReason::NoOpenSlots => {
                Some("No open slots on that day. Would you like another date?")
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotSuggestions {
    pub slots: Vec<OffsetDateTime>,
    pub clarifier: ClarifierReason,
}

/// Filters `all_day_slots` (already generated for the full working day) down to
/// an optional local time-of-day window, backfilling with nearby same-day slots
/// when supply is short of `MIN_SLOTS_SUGGESTED`, per `SlotProvider.suggest_slots`.
pub fn suggest_slots(
    all_day_slots: &[OffsetDateTime],
    window: Option<(OffsetDateTime, OffsetDateTime)>,
) -> SlotSuggestions {
    if all_day_slots.is_empty() {
        return SlotSuggestions {
            slots: Vec::new(),
            clarifier: ClarifierReason::NoOpenSlots,
        };
    }

    let in_window: Vec<OffsetDateTime> = match window {
        Some((start, end)) => all_day_slots
            .iter()
            .copied()
            .filter(|s| *s >= start && *s < end)
            .collect(),
        None => all_day_slots.to_vec(),
    };

    if in_window.len() >= MIN_SLOTS_SUGGESTED || window.is_none() {
        let slots = in_window.into_iter().take(MAX_SLOTS_SUGGESTED).collect();
        return SlotSuggestions {
            slots,
            clarifier: ClarifierReason::None,
        };
    }

    // Backfill with nearby same-day slots outside the window, preserving the
    // in-window matches first.
    let mut combined = in_window.clone();
    for slot in all_day_slots {
        if combined.len() >= MAX_SLOTS_SUGGESTED {
            break;
        }
        if !combined.contains(slot) {
            combined.push(*slot);
        }
    }
    combined.sort();
    combined.truncate(MAX_SLOTS_SUGGESTED);

    SlotSuggestions {
        slots: combined,
        clarifier: ClarifierReason::LimitedAvailability,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn thirty_minute_step_with_no_blocking() {
        let day_start = datetime!(2026-01-05 09:00:00 UTC);
        let day_end = datetime!(2026-01-05 10:00:00 UTC);
        let slots = generate_slots(day_start, day_end, 30, &[], &[]);
        assert_eq!(
            slots,
            vec![
                datetime!(2026-01-05 09:00:00 UTC),
                datetime!(2026-01-05 09:30:00 UTC),
            ]
        );
    }

    #[test]
    fn booking_blocks_buffered_window() {
        let day_start = datetime!(2026-01-05 09:00:00 UTC);
        let day_end = datetime!(2026-01-05 12:00:00 UTC);
        let bookings = [BlockingBooking {
            starts_at: datetime!(2026-01-05 10:00:00 UTC),
            duration_minutes: 60,
        }];
        let slots = generate_slots(day_start, day_end, 30, &bookings, &[]);
        // booking occupies 10:00-11:00, buffered 09:30-11:30
        assert!(!slots.contains(&datetime!(2026-01-05 09:30:00 UTC)));
        assert!(!slots.contains(&datetime!(2026-01-05 11:00:00 UTC)));
        assert!(slots.contains(&datetime!(2026-01-05 11:30:00 UTC)));
    }

    #[test]
    fn no_slots_at_all_yields_no_open_slots_clarifier() {
        let result = suggest_slots(&[], None);
        assert_eq!(result.clarifier, ClarifierReason::NoOpenSlots);
        assert!(result.slots.is_empty());
    }

    #[test]
    fn fewer_than_min_in_window_backfills_with_clarifier() {
        let all_day = vec![
            datetime!(2026-01-05 09:00:00 UTC),
            datetime!(2026-01-05 14:00:00 UTC),
            datetime!(2026-01-05 15:00:00 UTC),
        ];
        let window = Some((
            datetime!(2026-01-05 09:00:00 UTC),
            datetime!(2026-01-05 10:00:00 UTC),
        ));
        let result = suggest_slots(&all_day, window);
        assert_eq!(result.clarifier, ClarifierReason::LimitedAvailability);
        assert_eq!(result.slots.len(), 3);
    }
}
