use ulid::Ulid;

use crate::lifecycle::{BookingStatus, InvalidTransition};
use crate::model::{InvalidTimeRange, TimeRange};
use crate::payment::PaymentError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("court not found: {0}")]
    CourtNotFound(Ulid),
    #[error("court is not accepting bookings: {0}")]
    CourtInactive(Ulid),
    #[error("requested time is outside the court's operating hours")]
    OutsideOperatingHours,
    #[error("slot {range} on court {court_id} is not available")]
    SlotConflict { court_id: Ulid, range: TimeRange },
    #[error("hold expired: {0}")]
    HoldExpired(Ulid),
    #[error("invalid booking status transition from {from} to {to}")]
    InvalidBookingTransition { from: BookingStatus, to: BookingStatus },
    #[error("booking not found: {0}")]
    BookingNotFound(Ulid),
    #[error("booking {0} belongs to another user")]
    BookingNotOwned(Ulid),
    #[error(transparent)]
    InvalidTimeRange(#[from] InvalidTimeRange),
    #[error("payment webhook signature is invalid")]
    InvalidWebhookSignature,
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error(transparent)]
    Payment(#[from] PaymentError),
    #[error(transparent)]
    Storage(StoreError),
}

impl EngineError {
    /// Stable machine-readable code for callers that map errors onto a wire format.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::CourtNotFound(_) => "COURT_NOT_FOUND",
            EngineError::CourtInactive(_) => "COURT_INACTIVE",
            EngineError::OutsideOperatingHours => "OUTSIDE_OPERATING_HOURS",
            EngineError::SlotConflict { .. } => "SLOT_CONFLICT",
            EngineError::HoldExpired(_) => "HOLD_EXPIRED",
            EngineError::InvalidBookingTransition { .. } => "INVALID_BOOKING_TRANSITION",
            EngineError::BookingNotFound(_) => "BOOKING_NOT_FOUND",
            EngineError::BookingNotOwned(_) => "BOOKING_NOT_OWNED",
            EngineError::InvalidTimeRange(_) => "INVALID_TIME_RANGE",
            EngineError::InvalidWebhookSignature => "INVALID_WEBHOOK_SIGNATURE",
            EngineError::LimitExceeded(_) => "LIMIT_EXCEEDED",
            EngineError::Payment(_) => "PAYMENT_ERROR",
            EngineError::Storage(_) => "STORAGE_ERROR",
        }
    }
}

impl From<InvalidTransition> for EngineError {
    fn from(t: InvalidTransition) -> Self {
        EngineError::InvalidBookingTransition { from: t.from, to: t.to }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Rejected(t) => t.into(),
            other => EngineError::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_store_update_maps_to_transition_error() {
        let err: EngineError = StoreError::Rejected(InvalidTransition {
            from: BookingStatus::Expired,
            to: BookingStatus::Confirmed,
        })
        .into();
        assert!(matches!(
            err,
            EngineError::InvalidBookingTransition { from: BookingStatus::Expired, to: BookingStatus::Confirmed }
        ));
        assert_eq!(err.code(), "INVALID_BOOKING_TRANSITION");
    }

    #[test]
    fn other_store_errors_stay_storage() {
        let err: EngineError = StoreError::Closed.into();
        assert!(matches!(err, EngineError::Storage(StoreError::Closed)));
        assert_eq!(err.to_string(), "store closed");
    }
}
