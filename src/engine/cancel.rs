use serde::Serialize;
use tracing::info;
use ulid::Ulid;

use crate::lifecycle::{BookingStatus, is_valid_transition};
use crate::limits::MAX_CANCEL_REASON_LEN;
use crate::model::ActorType;
use crate::notify::Notification;
use crate::observability;

use super::conflict::validate_text;
use super::{Engine, EngineError, timed};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelRequest {
    pub booking_id: Ulid,
    pub user_id: Ulid,
    pub reason: Option<String>,
    /// Skips the ownership check. The caller guarantees this is only set after
    /// the authorization layer has verified `user_id` manages the venue.
    pub is_owner: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CancelOutcome {
    pub booking_id: Ulid,
    pub status: BookingStatus,
}

impl Engine {
    pub async fn cancel(&self, req: CancelRequest) -> Result<CancelOutcome, EngineError> {
        timed("cancel", self.cancel_inner(req)).await
    }

    async fn cancel_inner(&self, req: CancelRequest) -> Result<CancelOutcome, EngineError> {
        validate_text(req.reason.as_deref(), MAX_CANCEL_REASON_LEN, "cancel reason too long")?;
        let booking_id = req.booking_id;

        let mut row = self
            .ports
            .bookings
            .find_by_id_for_update(booking_id)
            .await?
            .ok_or(EngineError::BookingNotFound(booking_id))?;

        if !req.is_owner && row.booking().user_id() != req.user_id {
            return Err(EngineError::BookingNotOwned(booking_id));
        }

        let (target, actor, label) = if req.is_owner {
            (BookingStatus::CancelledByOwner, ActorType::Owner, "owner")
        } else {
            (BookingStatus::CancelledByUser, ActorType::Customer, "customer")
        };
        let from = row.booking().status();
        if !is_valid_transition(from, target) {
            return Err(EngineError::InvalidBookingTransition { from, to: target });
        }

        row.update(target, None).await?;
        let cancelled = row.booking().clone();
        drop(row);

        self.audit(booking_id, Some(from), target, actor, Some(req.user_id), req.reason)
            .await?;
        self.announce(
            &cancelled,
            target,
            Notification::BookingCancelled {
                booking_id,
                court_id: cancelled.court_id(),
                status: target,
            },
        )
        .await;
        info!(%booking_id, by = label, "booking cancelled");
        metrics::counter!(observability::CANCELLATIONS_TOTAL, "actor" => label).increment(1);

        Ok(CancelOutcome { booking_id, status: target })
    }
}
