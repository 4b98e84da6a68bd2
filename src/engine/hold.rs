use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use ulid::Ulid;

use crate::hold::{HoldKey, HoldRecord, HoldStore};
use crate::lifecycle::{BLOCKING_STATUSES, BookingStatus};
use crate::model::{ActorType, Booking, NewBooking, Price, TimeRange};
use crate::observability;
use crate::pricing::{self, HoursCheck, PriceBasis};
use crate::store::StoreError;

use super::conflict::validate_hold_range;
use super::{Engine, EngineError, timed};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldRequest {
    pub user_id: Ulid,
    pub court_id: Ulid,
    pub range: TimeRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HoldCreated {
    pub booking_id: Ulid,
    pub status: BookingStatus,
    pub hold_expires_at: DateTime<Utc>,
    pub total_price: Price,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Acquired under a temporary id; no durable row yet.
    PendingCreate,
    /// Re-armed with the real booking id.
    Armed,
    /// Committed or released. Drop does nothing.
    Finished,
}

/// A soft lock owned by one create-hold attempt.
///
/// Leaving scope without `commit` or `release` (an early return, a panic, or
/// the caller dropping the future) schedules the release on the runtime.
struct SoftLock {
    store: Arc<dyn HoldStore>,
    key: HoldKey,
    ttl: Duration,
    phase: Phase,
}

impl SoftLock {
    async fn acquire(
        store: Arc<dyn HoldStore>,
        key: HoldKey,
        record: HoldRecord,
        ttl: Duration,
    ) -> Result<Option<Self>, StoreError> {
        if !store.acquire(&key, record, ttl).await? {
            return Ok(None);
        }
        Ok(Some(Self { store, key, ttl, phase: Phase::PendingCreate }))
    }

    /// Replace the temporary payload, keeping the TTL.
    async fn arm(&mut self, record: HoldRecord) -> Result<(), StoreError> {
        self.store.update(&self.key, record, self.ttl).await?;
        self.phase = Phase::Armed;
        Ok(())
    }

    /// Keep the lock until its TTL runs out or a confirm releases it.
    fn commit(mut self) {
        self.phase = Phase::Finished;
    }

    async fn release(mut self) {
        self.phase = Phase::Finished;
        release_logged(self.store.as_ref(), &self.key).await;
    }
}

impl Drop for SoftLock {
    fn drop(&mut self) {
        if self.phase == Phase::Finished {
            return;
        }
        let store = Arc::clone(&self.store);
        let key = self.key.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { release_logged(store.as_ref(), &key).await });
            }
            Err(_) => warn!(%key, "soft lock dropped outside a runtime, left to expire"),
        }
    }
}

/// Never fails the caller: a lock we could not delete still expires on its own.
pub(super) async fn release_logged(store: &dyn HoldStore, key: &HoldKey) {
    if let Err(e) = store.release(key).await {
        metrics::counter!(observability::SOFT_LOCK_RELEASE_FAILURES_TOTAL).increment(1);
        warn!(%key, "soft lock release failed: {e}");
    }
}

impl Engine {
    /// Drop the soft lock of a booking that left HOLD. A lock re-acquired by
    /// another attempt after ours expired is left alone.
    pub(super) async fn release_slot_lock(&self, booking: &Booking) {
        let key = HoldKey::new(booking.court_id(), &booking.range());
        match self.ports.holds.get(&key).await {
            Ok(Some(record)) if record.booking_id != booking.id() => {
                tracing::debug!(%key, holder = %record.booking_id, "soft lock owned by another attempt, skip");
            }
            Ok(None) => {}
            Ok(Some(_)) | Err(_) => release_logged(self.ports.holds.as_ref(), &key).await,
        }
    }

    /// Reserve a slot for a short TTL. The soft lock is taken before any
    /// durable write; the booking row is then created in HOLD.
    pub async fn create_hold(&self, req: HoldRequest) -> Result<HoldCreated, EngineError> {
        timed("create_hold", self.create_hold_inner(req)).await
    }

    async fn create_hold_inner(&self, req: HoldRequest) -> Result<HoldCreated, EngineError> {
        let court = self.court(req.court_id).await?;
        if !court.active {
            return Err(EngineError::CourtInactive(court.id));
        }
        let now = Utc::now();
        validate_hold_range(&req.range, now)?;

        let venue = self.venue_of(&court).await?;
        let offset = venue.offset();
        let hours = self.ports.catalog.operating_hours(court.id).await?;
        match pricing::is_within_operating_hours(&req.range, &hours, offset) {
            HoursCheck::Open => {}
            HoursCheck::Unrestricted => self.permissive_default("hours_unrestricted", court.id),
            HoursCheck::Closed => return Err(EngineError::OutsideOperatingHours),
        }

        let rules = self.ports.catalog.pricing_rules(court.id).await?;
        let quote = pricing::quote(&rules, &req.range, offset, self.settings.default_rate_per_hour);
        match quote.basis {
            PriceBasis::Rule { .. } => {}
            PriceBasis::DefaultRate => self.permissive_default("default_rate", court.id),
            PriceBasis::FirstRuleFallback => self.permissive_default("first_rule_fallback", court.id),
        }

        let ttl = self.settings.hold_ttl();
        let hold_expires_at = now + chrono::Duration::seconds(ttl.as_secs() as i64);

        let key = HoldKey::new(court.id, &req.range);
        let pending = HoldRecord { booking_id: Ulid::new(), user_id: req.user_id };
        let Some(mut lock) = SoftLock::acquire(Arc::clone(&self.ports.holds), key, pending, ttl).await? else {
            info!(court_id = %court.id, range = %req.range, "slot already soft-locked");
            metrics::counter!(observability::SLOT_CONFLICTS_TOTAL, "stage" => "soft_lock").increment(1);
            return Err(EngineError::SlotConflict { court_id: court.id, range: req.range });
        };

        let new = NewBooking {
            user_id: req.user_id,
            court_id: court.id,
            range: req.range,
            hold_expires_at,
            total_price: quote.amount,
            note: None,
        };
        match self.insert_hold(new, &mut lock).await {
            Ok(booking) => {
                lock.commit();
                info!(
                    booking_id = %booking.id(),
                    court_id = %court.id,
                    range = %req.range,
                    total_price = booking.total_price(),
                    "hold created"
                );
                metrics::counter!(observability::HOLDS_CREATED_TOTAL).increment(1);
                Ok(HoldCreated {
                    booking_id: booking.id(),
                    status: booking.status(),
                    hold_expires_at,
                    total_price: booking.total_price(),
                })
            }
            Err(e) => {
                lock.release().await;
                Err(e)
            }
        }
    }

    /// Steps that run while the soft lock is held.
    async fn insert_hold(&self, new: NewBooking, lock: &mut SoftLock) -> Result<Booking, EngineError> {
        // Catches rows keyed differently, e.g. a 30 minute hold inside this hour.
        self.ensure_no_overlap(new.court_id, &new.range, &BLOCKING_STATUSES, None, "durable")
            .await?;

        let booking = self.ports.bookings.create(new).await?;
        lock.arm(HoldRecord { booking_id: booking.id(), user_id: booking.user_id() })
            .await?;
        self.audit(
            booking.id(),
            None,
            BookingStatus::Hold,
            ActorType::Customer,
            Some(booking.user_id()),
            Some("Slot held by customer".into()),
        )
        .await?;
        Ok(booking)
    }
}
