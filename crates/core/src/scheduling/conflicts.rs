//! Conflict detection. Pure interval-overlap arithmetic; grounded verbatim on
//! `_conflicts()` in the original scheduler. Kept separate from slot generation
//! and the DB-backed lookups in `bookings.rs` so the core overlap rule has a
//! single, independently testable home.

use time::OffsetDateTime;

use super::types::BUFFER_MINUTES;

/// True iff a booking-buffered interval [start, start+duration) conflicts with
/// another booking-buffered interval under the fixed buffer rule:
/// `candidate.start < existing.end + buffer AND candidate.end > existing.start - buffer`.
pub fn bookings_conflict(
    existing_start: OffsetDateTime,
    existing_duration_minutes: i32,
    candidate_start: OffsetDateTime,
    candidate_duration_minutes: i32,
) -> bool {
    let buffer = time::Duration::minutes(BUFFER_MINUTES);
    let existing_end = existing_start + time::Duration::minutes(existing_duration_minutes as i64);
    let candidate_end =
        candidate_start + time::Duration::minutes(candidate_duration_minutes as i64);

    candidate_start < existing_end + buffer && candidate_end > existing_start - buffer
}

/// Blackouts use no buffer: the candidate overlaps iff `candidate.start <
/// blackout.end AND candidate.end > blackout.start`. Inclusive on the blackout's
/// start, exclusive on its end — a candidate starting exactly at the blackout's
/// end is NOT blocked; one starting exactly at its start IS.
pub fn overlaps_blackout(
    blackout_start: OffsetDateTime,
    blackout_end: OffsetDateTime,
    candidate_start: OffsetDateTime,
    candidate_duration_minutes: i32,
) -> bool {
    let candidate_end =
        candidate_start + time::Duration::minutes(candidate_duration_minutes as i64);
    candidate_start < blackout_end && candidate_end > blackout_start
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn non_overlapping_bookings_beyond_buffer_do_not_conflict() {
        let existing = datetime!(2026-01-01 09:00:00 UTC);
        // existing ends at 10:30, +30min buffer = 11:00; candidate starts exactly at 11:00
        let candidate = datetime!(2026-01-01 11:00:00 UTC);
        assert!(!bookings_conflict(existing, 90, candidate, 60));
    }

    #[test]
    fn bookings_within_buffer_conflict() {
        let existing = datetime!(2026-01-01 09:00:00 UTC);
        let candidate = datetime!(2026-01-01 10:45:00 UTC);
        assert!(bookings_conflict(existing, 90, candidate, 60));
    }

    #[test]
    fn blackout_boundary_is_inclusive_start_exclusive_end() {
        let blackout_start = datetime!(2026-01-01 12:00:00 UTC);
        let blackout_end = datetime!(2026-01-01 13:00:00 UTC);

        // starts exactly at blackout start: blocked
        assert!(overlaps_blackout(
            blackout_start,
            blackout_end,
            blackout_start,
            30
        ));

        // starts exactly at blackout end: not blocked
        assert!(!overlaps_blackout(
            blackout_start,
            blackout_end,
            blackout_end,
            30
        ));
    }
}
