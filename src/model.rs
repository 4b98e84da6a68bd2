use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveTime, Offset, SecondsFormat, SubsecRound, Utc, Weekday};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::lifecycle::{BookingStatus, InvalidTransition, is_valid_transition};

/// Amount in the smallest currency unit.
pub type Price = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("time range start must be before end")]
pub struct InvalidTimeRange;

/// Half-open interval `[start, end)`, truncated to whole seconds so that two
/// requests for the same slot always encode to the same hold key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTimeRange")]
pub struct TimeRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RawTimeRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TryFrom<RawTimeRange> for TimeRange {
    type Error = InvalidTimeRange;

    fn try_from(raw: RawTimeRange) -> Result<Self, Self::Error> {
        TimeRange::new(raw.start, raw.end)
    }
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, InvalidTimeRange> {
        let start = start.trunc_subsecs(0);
        let end = end.trunc_subsecs(0);
        if start >= end {
            return Err(InvalidTimeRange);
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    pub fn duration_hours(&self) -> f64 {
        (self.end - self.start).num_seconds() as f64 / 3600.0
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && self.end > other.start
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.end.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }
}

// ── Catalog ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Venue {
    pub id: Ulid,
    pub name: String,
    /// Offset of the venue's reference calendar from UTC.
    #[serde(default)]
    pub utc_offset_minutes: i32,
    /// Share of the total price collected up front before a hold confirms.
    #[serde(default)]
    pub deposit_percent: Option<u8>,
}

impl Venue {
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }

    pub fn requires_deposit(&self) -> bool {
        self.deposit_percent.is_some_and(|p| p > 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SportType {
    Football,
    Badminton,
    Tennis,
    Basketball,
    Volleyball,
    Pickleball,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Court {
    pub id: Ulid,
    pub venue_id: Ulid,
    pub name: String,
    pub sport: SportType,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatingHours {
    pub court_id: Ulid,
    pub weekday: Weekday,
    pub open: NaiveTime,
    pub close: NaiveTime,
    #[serde(default)]
    pub closed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DayType {
    Weekday,
    Weekend,
}

impl DayType {
    pub fn of(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Sat | Weekday::Sun => DayType::Weekend,
            _ => DayType::Weekday,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingRule {
    pub court_id: Ulid,
    pub day_type: DayType,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub price_per_hour: Price,
    #[serde(default)]
    pub peak: bool,
}

// ── Bookings ─────────────────────────────────────────────────────

/// Fields supplied when a booking row is first written. Rows are always born in HOLD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub user_id: Ulid,
    pub court_id: Ulid,
    pub range: TimeRange,
    pub hold_expires_at: DateTime<Utc>,
    pub total_price: Price,
    pub note: Option<String>,
}

/// Durable booking row. Status only changes through [`Booking::transition`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    id: Ulid,
    user_id: Ulid,
    court_id: Ulid,
    range: TimeRange,
    status: BookingStatus,
    hold_expires_at: Option<DateTime<Utc>>,
    total_price: Price,
    note: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn from_new(id: Ulid, new: NewBooking, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id: new.user_id,
            court_id: new.court_id,
            range: new.range,
            status: BookingStatus::Hold,
            hold_expires_at: Some(new.hold_expires_at),
            total_price: new.total_price,
            note: new.note,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> Ulid {
        self.id
    }

    pub fn user_id(&self) -> Ulid {
        self.user_id
    }

    pub fn court_id(&self) -> Ulid {
        self.court_id
    }

    pub fn range(&self) -> TimeRange {
        self.range
    }

    pub fn status(&self) -> BookingStatus {
        self.status
    }

    /// Only meaningful while the booking is (or started as) a hold.
    pub fn hold_expires_at(&self) -> Option<DateTime<Utc>> {
        self.hold_expires_at
    }

    pub fn total_price(&self) -> Price {
        self.total_price
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_hold_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == BookingStatus::Hold && self.hold_expires_at.is_some_and(|exp| now > exp)
    }

    pub fn can_confirm(&self, now: DateTime<Utc>) -> bool {
        self.status == BookingStatus::Hold && !self.is_hold_expired(now)
    }

    pub fn can_cancel(&self) -> bool {
        self.status == BookingStatus::Confirmed
    }

    pub fn can_complete(&self, now: DateTime<Utc>) -> bool {
        self.status == BookingStatus::Confirmed && now > self.range.end()
    }

    /// Apply a validated status change. A `None` note leaves the existing note untouched.
    pub fn transition(
        &mut self,
        to: BookingStatus,
        note: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        if !is_valid_transition(self.status, to) {
            return Err(InvalidTransition { from: self.status, to });
        }
        self.status = to;
        if note.is_some() {
            self.note = note;
        }
        self.updated_at = at;
        Ok(())
    }
}

// ── Audit ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorType {
    System,
    Customer,
    Owner,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAuditEntry {
    pub booking_id: Ulid,
    pub from_status: Option<BookingStatus>,
    pub to_status: BookingStatus,
    pub actor: ActorType,
    pub actor_id: Option<Ulid>,
    pub note: Option<String>,
}

/// One status transition, written once and never touched again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Ulid,
    pub booking_id: Ulid,
    pub from_status: Option<BookingStatus>,
    pub to_status: BookingStatus,
    pub actor: ActorType,
    pub actor_id: Option<Ulid>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn from_new(id: Ulid, new: NewAuditEntry, now: DateTime<Utc>) -> Self {
        Self {
            id,
            booking_id: new.booking_id,
            from_status: new.from_status,
            to_status: new.to_status,
            actor: new.actor,
            actor_id: new.actor_id,
            note: new.note,
            created_at: now,
        }
    }
}

/// The WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    BookingCreated {
        booking: Booking,
    },
    BookingTransitioned {
        id: Ulid,
        to: BookingStatus,
        note: Option<String>,
        at: DateTime<Utc>,
        /// Written with the transition in one record, so a replay never sees
        /// the move without its entry.
        audit: Option<AuditEntry>,
    },
    AuditRecorded {
        entry: AuditEntry,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub size: usize,
    pub total: usize,
}
