use chrono::{DateTime, Duration, Utc};
use ulid::Ulid;

use crate::lifecycle::BookingStatus;
use crate::limits::*;
use crate::model::TimeRange;
use crate::observability;

use super::{Engine, EngineError};

pub(crate) fn validate_hold_range(range: &TimeRange, now: DateTime<Utc>) -> Result<(), EngineError> {
    if range.duration_minutes() > MAX_HOLD_DURATION_HOURS * 60 {
        return Err(EngineError::LimitExceeded("hold longer than allowed"));
    }
    if range.start() > now + Duration::days(MAX_BOOKING_LEAD_DAYS) {
        return Err(EngineError::LimitExceeded("slot too far in the future"));
    }
    Ok(())
}

pub(crate) fn validate_text(text: Option<&str>, max: usize, what: &'static str) -> Result<(), EngineError> {
    match text {
        Some(t) if t.len() > max => Err(EngineError::LimitExceeded(what)),
        _ => Ok(()),
    }
}

impl Engine {
    /// Fails with `SlotConflict` if any booking on the court in `statuses`
    /// overlaps `range`. `stage` labels the conflict metric.
    pub(super) async fn ensure_no_overlap(
        &self,
        court_id: Ulid,
        range: &TimeRange,
        statuses: &[BookingStatus],
        exclude: Option<Ulid>,
        stage: &'static str,
    ) -> Result<(), EngineError> {
        let clashing = self
            .ports
            .bookings
            .find_overlapping(court_id, range, statuses, exclude)
            .await?;
        if let Some(existing) = clashing.first() {
            tracing::info!(
                %court_id,
                %range,
                existing = %existing.id(),
                stage,
                "slot conflict"
            );
            metrics::counter!(observability::SLOT_CONFLICTS_TOTAL, "stage" => stage).increment(1);
            return Err(EngineError::SlotConflict { court_id, range: *range });
        }
        Ok(())
    }
}
