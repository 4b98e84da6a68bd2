use std::time::Duration;

use ulid::Ulid;

use crate::hold::HoldKey;
use crate::limits::{DEFAULT_PAGE_SIZE, MAX_FILTER_COURTS, MAX_PAGE_SIZE};
use crate::model::{AuditEntry, Booking, Page, TimeRange};
use crate::store::BookingFilter;

use super::{Engine, EngineError};

/// Who holds a slot's soft lock right now, and for how much longer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldStatus {
    pub booking_id: Ulid,
    pub user_id: Ulid,
    pub remaining_ttl: Option<Duration>,
}

fn normalize(mut filter: BookingFilter) -> Result<BookingFilter, EngineError> {
    if filter.court_ids.len() > MAX_FILTER_COURTS {
        return Err(EngineError::LimitExceeded("too many courts in filter"));
    }
    filter.page = filter.page.max(1);
    filter.size = match filter.size {
        0 => DEFAULT_PAGE_SIZE,
        n => n.min(MAX_PAGE_SIZE),
    };
    Ok(filter)
}

impl Engine {
    pub async fn get_booking(&self, booking_id: Ulid) -> Result<Booking, EngineError> {
        self.ports
            .bookings
            .find_by_id(booking_id)
            .await?
            .ok_or(EngineError::BookingNotFound(booking_id))
    }

    /// Newest first.
    pub async fn list_bookings(&self, filter: BookingFilter) -> Result<Page<Booking>, EngineError> {
        let filter = normalize(filter)?;
        Ok(self.ports.bookings.find_page(&filter).await?)
    }

    /// Bookings across every court of a venue. Court ids in the filter narrow
    /// the venue's courts; ids from other venues match nothing.
    pub async fn list_venue_bookings(
        &self,
        venue_id: Ulid,
        filter: BookingFilter,
    ) -> Result<Page<Booking>, EngineError> {
        let mut filter = normalize(filter)?;
        let courts: Vec<Ulid> = self
            .ports
            .catalog
            .courts_for_venue(venue_id)
            .await?
            .into_iter()
            .map(|c| c.id)
            .filter(|id| filter.court_ids.is_empty() || filter.court_ids.contains(id))
            .collect();
        if courts.is_empty() {
            return Ok(Page { items: Vec::new(), page: filter.page, size: filter.size, total: 0 });
        }
        filter.court_ids = courts;
        Ok(self.ports.bookings.find_page(&filter).await?)
    }

    /// Every status change of a booking, oldest first.
    pub async fn audit_trail(&self, booking_id: Ulid) -> Result<Vec<AuditEntry>, EngineError> {
        if self.ports.bookings.find_by_id(booking_id).await?.is_none() {
            return Err(EngineError::BookingNotFound(booking_id));
        }
        Ok(self.ports.audit.find_by_booking(booking_id).await?)
    }

    /// `None` when nobody holds the exact slot.
    pub async fn hold_status(&self, court_id: Ulid, range: &TimeRange) -> Result<Option<HoldStatus>, EngineError> {
        let key = HoldKey::new(court_id, range);
        let Some(record) = self.ports.holds.get(&key).await? else {
            return Ok(None);
        };
        let remaining_ttl = self.ports.holds.remaining_ttl(&key).await?;
        Ok(Some(HoldStatus { booking_id: record.booking_id, user_id: record.user_id, remaining_ttl }))
    }
}
