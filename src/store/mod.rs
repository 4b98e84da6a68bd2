//! Storage ports consumed by the engine, plus the reference adapters.

pub mod catalog;
pub mod durable;

use std::io;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ulid::Ulid;

use crate::lifecycle::{BookingStatus, InvalidTransition};
use crate::model::{
    AuditEntry, Booking, Court, NewAuditEntry, NewBooking, OperatingHours, Page, PricingRule,
    TimeRange, Venue,
};

pub use catalog::{CatalogSeed, StaticCatalog};
pub use durable::WalStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(String),
    #[error("WAL error: {0}")]
    Wal(#[from] io::Error),
    #[error("codec error: {0}")]
    Codec(String),
    #[error("store closed")]
    Closed,
    #[error(transparent)]
    Rejected(#[from] InvalidTransition),
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Codec(e.to_string())
    }
}

/// Listing criteria. Empty vectors and `None` mean "any".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingFilter {
    pub user_id: Option<Ulid>,
    pub court_ids: Vec<Ulid>,
    pub statuses: Vec<BookingStatus>,
    /// Inclusive bounds on the booking's start instant.
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// 1-based.
    pub page: usize,
    pub size: usize,
}

impl BookingFilter {
    pub fn matches(&self, booking: &Booking) -> bool {
        let start = booking.range().start();
        self.user_id.is_none_or(|u| booking.user_id() == u)
            && (self.court_ids.is_empty() || self.court_ids.contains(&booking.court_id()))
            && (self.statuses.is_empty() || self.statuses.contains(&booking.status()))
            && self.from.is_none_or(|from| start >= from)
            && self.to.is_none_or(|to| start <= to)
    }
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Persist a new row in HOLD.
    async fn create(&self, new: NewBooking) -> Result<Booking, StoreError>;

    /// Committed snapshot. Never waits on row locks.
    async fn find_by_id(&self, id: Ulid) -> Result<Option<Booking>, StoreError>;

    /// Take the row's exclusive lock. Held until the handle is dropped.
    async fn find_by_id_for_update(&self, id: Ulid) -> Result<Option<Box<dyn LockedBooking>>, StoreError>;

    /// Rows on `court_id` whose range overlaps `range` and whose status is in `statuses`.
    async fn find_overlapping(
        &self,
        court_id: Ulid,
        range: &TimeRange,
        statuses: &[BookingStatus],
        exclude: Option<Ulid>,
    ) -> Result<Vec<Booking>, StoreError>;

    /// Newest first.
    async fn find_page(&self, filter: &BookingFilter) -> Result<Page<Booking>, StoreError>;

    /// HOLD rows with `hold_expires_at <= now` become EXPIRED. Returns the ids moved.
    ///
    /// Each move is committed together with a System audit entry carrying
    /// `note`, readable through the same store's `AuditSink`. A failure part way
    /// through leaves every row already moved with its entry.
    async fn expire_all_past_holds(&self, now: DateTime<Utc>, note: &str) -> Result<Vec<Ulid>, StoreError>;

    /// CONFIRMED rows whose range ended before `now` become COMPLETED, audited
    /// the same way. Returns the ids moved.
    async fn complete_all_finished(&self, now: DateTime<Utc>, note: &str) -> Result<Vec<Ulid>, StoreError>;
}

/// A booking row under its exclusive lock.
#[async_trait]
pub trait LockedBooking: Send {
    fn booking(&self) -> &Booking;

    /// Validated status change. Illegal moves fail with `StoreError::Rejected`
    /// and leave the row untouched.
    async fn update(&mut self, status: BookingStatus, note: Option<String>) -> Result<(), StoreError>;
}

/// Read-only venue, court, pricing and opening-hours lookups.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn find_court(&self, id: Ulid) -> Result<Option<Court>, StoreError>;
    async fn find_venue(&self, id: Ulid) -> Result<Option<Venue>, StoreError>;
    async fn courts_for_venue(&self, venue_id: Ulid) -> Result<Vec<Court>, StoreError>;
    async fn operating_hours(&self, court_id: Ulid) -> Result<Vec<OperatingHours>, StoreError>;
    async fn pricing_rules(&self, court_id: Ulid) -> Result<Vec<PricingRule>, StoreError>;
}

/// Append-only transition log.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: NewAuditEntry) -> Result<AuditEntry, StoreError>;

    /// Insertion order.
    async fn find_by_booking(&self, booking_id: Ulid) -> Result<Vec<AuditEntry>, StoreError>;
}
