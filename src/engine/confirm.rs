use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use ulid::Ulid;

use crate::lifecycle::BookingStatus;
use crate::limits::MAX_NOTE_LEN;
use crate::model::{ActorType, Booking, Price};
use crate::notify::Notification;
use crate::observability;
use crate::payment::{PaymentWebhook, deposit_description};

use super::conflict::validate_text;
use super::{Engine, EngineError, timed};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BookingConfirmation {
    pub booking_id: Ulid,
    pub status: BookingStatus,
    pub total_price: Price,
}

/// Either the booking is confirmed now, or a deposit has to be paid first and
/// the webhook will confirm it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConfirmOutcome {
    Confirmed(BookingConfirmation),
    AwaitingPayment {
        booking_id: Ulid,
        payment_url: String,
        order_reference: String,
        amount: Price,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Confirmed(Ulid),
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    PaymentFailed,
    UnknownBooking,
    /// Duplicate or late delivery.
    AlreadySettled(BookingStatus),
}

impl IgnoreReason {
    fn label(self) -> &'static str {
        match self {
            IgnoreReason::PaymentFailed => "payment_failed",
            IgnoreReason::UnknownBooking => "unknown_booking",
            IgnoreReason::AlreadySettled(_) => "already_settled",
        }
    }
}

fn ignored(reason: IgnoreReason) -> WebhookOutcome {
    metrics::counter!(observability::WEBHOOKS_IGNORED_TOTAL, "reason" => reason.label()).increment(1);
    WebhookOutcome::Ignored(reason)
}

/// Share of `total` owed up front. Percentages above 100 are capped.
fn deposit_amount(total: Price, percent: u8) -> Price {
    total * Price::from(percent.min(100)) / 100
}

impl Engine {
    pub async fn confirm_hold(
        &self,
        booking_id: Ulid,
        user_id: Ulid,
        note: Option<String>,
    ) -> Result<ConfirmOutcome, EngineError> {
        timed("confirm_hold", self.confirm_hold_inner(booking_id, user_id, note)).await
    }

    async fn confirm_hold_inner(
        &self,
        booking_id: Ulid,
        user_id: Ulid,
        note: Option<String>,
    ) -> Result<ConfirmOutcome, EngineError> {
        validate_text(note.as_deref(), MAX_NOTE_LEN, "note too long")?;

        let mut row = self
            .ports
            .bookings
            .find_by_id_for_update(booking_id)
            .await?
            .ok_or(EngineError::BookingNotFound(booking_id))?;
        let booking = row.booking().clone();

        if booking.user_id() != user_id {
            return Err(EngineError::BookingNotOwned(booking_id));
        }
        if booking.status() != BookingStatus::Hold {
            return Err(EngineError::InvalidBookingTransition {
                from: booking.status(),
                to: BookingStatus::Confirmed,
            });
        }

        if booking.is_hold_expired(Utc::now()) {
            row.update(BookingStatus::Expired, None).await?;
            drop(row);
            self.audit(
                booking_id,
                Some(BookingStatus::Hold),
                BookingStatus::Expired,
                ActorType::System,
                None,
                Some("Hold expired during confirmation attempt".into()),
            )
            .await?;
            info!(%booking_id, "hold expired at confirmation");
            metrics::counter!(observability::HOLDS_EXPIRED_TOTAL, "source" => "confirm").increment(1);
            self.announce(
                &booking,
                BookingStatus::Expired,
                Notification::BookingExpired { booking_id, court_id: booking.court_id() },
            )
            .await;
            return Err(EngineError::HoldExpired(booking_id));
        }

        // HOLD against HOLD was settled by the soft lock at creation.
        self.ensure_no_overlap(
            booking.court_id(),
            &booking.range(),
            &[BookingStatus::Confirmed],
            Some(booking_id),
            "confirm",
        )
        .await?;

        let court = self.court(booking.court_id()).await?;
        let venue = self.venue_of(&court).await?;
        if let Some(percent) = venue.deposit_percent.filter(|p| *p > 0) {
            let amount = deposit_amount(booking.total_price(), percent);
            let link = self
                .ports
                .payments
                .create_payment_link(booking_id, amount, &deposit_description(booking_id))
                .await?;
            info!(%booking_id, amount, order_reference = %link.order_reference, "deposit requested");
            metrics::counter!(observability::PAYMENT_LINKS_TOTAL).increment(1);
            return Ok(ConfirmOutcome::AwaitingPayment {
                booking_id,
                payment_url: link.url,
                order_reference: link.order_reference,
                amount,
            });
        }

        row.update(BookingStatus::Confirmed, note.clone()).await?;
        let confirmed = row.booking().clone();
        drop(row);

        self.release_slot_lock(&confirmed).await;
        self.audit(
            booking_id,
            Some(BookingStatus::Hold),
            BookingStatus::Confirmed,
            ActorType::Customer,
            Some(user_id),
            Some(note.unwrap_or_else(|| "Booking confirmed by customer".into())),
        )
        .await?;
        self.announce_confirmed(&confirmed).await;
        info!(%booking_id, "booking confirmed");
        metrics::counter!(observability::CONFIRMATIONS_TOTAL, "path" => "direct").increment(1);

        Ok(ConfirmOutcome::Confirmed(BookingConfirmation {
            booking_id,
            status: confirmed.status(),
            total_price: confirmed.total_price(),
        }))
    }

    /// Settle a deposit. Duplicate and late deliveries are ignored, not errors.
    pub async fn process_payment_webhook(&self, payload: &PaymentWebhook) -> Result<WebhookOutcome, EngineError> {
        timed("payment_webhook", self.process_payment_webhook_inner(payload)).await
    }

    async fn process_payment_webhook_inner(&self, payload: &PaymentWebhook) -> Result<WebhookOutcome, EngineError> {
        if !self.ports.payments.verify_webhook_signature(payload) {
            warn!(order_reference = %payload.order_reference, "webhook signature rejected");
            return Err(EngineError::InvalidWebhookSignature);
        }
        if !payload.success {
            info!(order_reference = %payload.order_reference, "payment not successful");
            return Ok(ignored(IgnoreReason::PaymentFailed));
        }
        let Some(booking_id) = payload.booking_id() else {
            warn!(description = %payload.description, "webhook carries no booking id");
            return Ok(ignored(IgnoreReason::UnknownBooking));
        };
        let Some(mut row) = self.ports.bookings.find_by_id_for_update(booking_id).await? else {
            warn!(%booking_id, "webhook for unknown booking");
            return Ok(ignored(IgnoreReason::UnknownBooking));
        };

        let status = row.booking().status();
        if status != BookingStatus::Hold {
            info!(%booking_id, %status, "webhook for settled booking");
            return Ok(ignored(IgnoreReason::AlreadySettled(status)));
        }

        let reference = &payload.order_reference;
        row.update(BookingStatus::Confirmed, Some(format!("Payment received. Order: {reference}")))
            .await?;
        let confirmed = row.booking().clone();
        drop(row);

        self.release_slot_lock(&confirmed).await;
        self.audit(
            booking_id,
            Some(BookingStatus::Hold),
            BookingStatus::Confirmed,
            ActorType::System,
            None,
            Some(format!("Payment success. OrderCode: {reference}")),
        )
        .await?;
        self.announce_confirmed(&confirmed).await;
        info!(%booking_id, order_reference = %reference, "booking confirmed by payment");
        metrics::counter!(observability::CONFIRMATIONS_TOTAL, "path" => "webhook").increment(1);

        Ok(WebhookOutcome::Confirmed(booking_id))
    }

    async fn announce_confirmed(&self, booking: &Booking) {
        self.announce(
            booking,
            BookingStatus::Confirmed,
            Notification::BookingConfirmed {
                booking_id: booking.id(),
                court_id: booking.court_id(),
                range: booking.range(),
            },
        )
        .await;
    }
}
