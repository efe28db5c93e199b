//! Scheduling Engine: bookings, teams, conflict detection, and slot generation.

pub mod bookings;
pub mod conflicts;
pub mod slots;
pub mod teams;
pub mod types;

pub use bookings::{
    apply_booking_override, bulk_update_bookings, block_team_slot, cancel_booking,
    check_conflicts, confirm_booking, create_booking, list_schedule, mark_booking_completed,
    move_booking, reschedule_booking, suggest_schedule_resources, BookingOverride,
    BulkUpdateResult, CreateBookingInput, ResourceSuggestions, ScheduleView,
};
pub use conflicts::{bookings_conflict, overlaps_blackout};
pub use slots::{
    default_day_window, generate_slots, suggest_slots, Blackout, BlockingBooking, ClarifierReason,
    SlotSuggestions, MAX_SLOTS_SUGGESTED, MIN_SLOTS_SUGGESTED,
};
pub use teams::{ensure_default_team, team_for_org};
pub use types::{
    Booking, BookingStatus, Conflict, ConflictKind, DepositStatus, PolicySnapshot, Team,
    TeamBlackout, Worker, BUFFER_MINUTES, DEFAULT_SLOT_DURATION_MINUTES, DEFAULT_WORK_END_HOUR,
    DEFAULT_WORK_START_HOUR, SLOT_STEP_MINUTES,
};
