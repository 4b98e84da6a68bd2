/// Longest slot a single hold may cover.
pub const MAX_HOLD_DURATION_HOURS: i64 = 12;

/// Holds cannot be placed further ahead than this.
pub const MAX_BOOKING_LEAD_DAYS: i64 = 366;

pub const MAX_NOTE_LEN: usize = 1_000;
pub const MAX_CANCEL_REASON_LEN: usize = 500;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

/// Upper bound on court ids accepted by a single listing filter.
pub const MAX_FILTER_COURTS: usize = 256;

/// Hold TTL is clamped to this range when settings are loaded.
pub const MIN_HOLD_TTL_MINUTES: u64 = 1;
pub const MAX_HOLD_TTL_MINUTES: u64 = 60;
