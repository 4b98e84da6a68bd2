mod availability;
mod cancel;
mod confirm;
mod conflict;
mod error;
mod hold;
mod queries;
mod sweep;

pub use availability::{Slot, SlotStatus, hourly_slots};
pub use cancel::{CancelOutcome, CancelRequest};
pub use confirm::{BookingConfirmation, ConfirmOutcome, IgnoreReason, WebhookOutcome};
pub use error::EngineError;
pub use hold::{HoldCreated, HoldRequest};
pub use queries::HoldStatus;

use std::future::Future;
use std::sync::Arc;

use tracing::warn;
use ulid::Ulid;

use crate::config::BookingSettings;
use crate::hold::HoldStore;
use crate::lifecycle::BookingStatus;
use crate::model::{ActorType, Booking, Court, NewAuditEntry, Venue};
use crate::notify::{Notification, NotificationSink};
use crate::observability;
use crate::payment::PaymentProvider;
use crate::store::{AuditSink, BookingStore, CatalogStore, StoreError};

/// Every collaborator the engine talks to. Wired once at startup.
#[derive(Clone)]
pub struct Ports {
    pub bookings: Arc<dyn BookingStore>,
    pub catalog: Arc<dyn CatalogStore>,
    pub holds: Arc<dyn HoldStore>,
    pub audit: Arc<dyn AuditSink>,
    pub payments: Arc<dyn PaymentProvider>,
    pub notifier: Arc<dyn NotificationSink>,
}

/// Reservation orchestrator.
///
/// Stateless between calls: every use case reads what it needs through the
/// ports, so one `Arc<Engine>` can serve any number of concurrent tasks.
pub struct Engine {
    ports: Ports,
    settings: BookingSettings,
}

impl Engine {
    pub fn new(ports: Ports, settings: BookingSettings) -> Self {
        Self { ports, settings }
    }

    pub fn settings(&self) -> &BookingSettings {
        &self.settings
    }

    pub(super) async fn court(&self, court_id: Ulid) -> Result<Court, EngineError> {
        self.ports
            .catalog
            .find_court(court_id)
            .await?
            .ok_or(EngineError::CourtNotFound(court_id))
    }

    pub(super) async fn venue_of(&self, court: &Court) -> Result<Venue, EngineError> {
        self.ports.catalog.find_venue(court.venue_id).await?.ok_or_else(|| {
            EngineError::Storage(StoreError::Backend(format!(
                "court {} references unknown venue {}",
                court.id, court.venue_id
            )))
        })
    }

    /// Best effort, for notifications after a committed change.
    pub(super) async fn venue_id_of(&self, court_id: Ulid) -> Option<Ulid> {
        match self.ports.catalog.find_court(court_id).await {
            Ok(court) => court.map(|c| c.venue_id),
            Err(e) => {
                warn!(%court_id, "venue lookup for notification failed: {e}");
                None
            }
        }
    }

    pub(super) async fn audit(
        &self,
        booking_id: Ulid,
        from_status: Option<BookingStatus>,
        to_status: BookingStatus,
        actor: ActorType,
        actor_id: Option<Ulid>,
        note: Option<String>,
    ) -> Result<(), EngineError> {
        self.ports
            .audit
            .record(NewAuditEntry { booking_id, from_status, to_status, actor, actor_id, note })
            .await?;
        Ok(())
    }

    /// Tell the owner of `booking` and its venue that the slot changed.
    pub(super) async fn announce(&self, booking: &Booking, status: BookingStatus, to_user: Notification) {
        self.ports.notifier.notify_user(booking.user_id(), to_user);
        if let Some(venue_id) = self.venue_id_of(booking.court_id()).await {
            self.ports.notifier.notify_venue(
                venue_id,
                Notification::SlotUpdated {
                    court_id: booking.court_id(),
                    range: booking.range(),
                    status,
                },
            );
        }
    }

    /// A lenient catalog fallback fired. Kept for compatibility, never silent.
    pub(super) fn permissive_default(&self, kind: &'static str, court_id: Ulid) {
        warn!(%court_id, kind, "permissive catalog default applied");
        metrics::counter!(observability::PERMISSIVE_DEFAULTS_TOTAL, "kind" => kind).increment(1);
    }
}

pub(super) async fn timed<T>(op: &'static str, fut: impl Future<Output = T>) -> T {
    let start = std::time::Instant::now();
    let out = fut.await;
    metrics::histogram!(observability::OPERATION_DURATION_SECONDS, "op" => op)
        .record(start.elapsed().as_secs_f64());
    out
}
