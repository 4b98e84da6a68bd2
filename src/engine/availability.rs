use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};
use serde::Serialize;
use ulid::Ulid;

use crate::lifecycle::BLOCKING_STATUSES;
use crate::model::{Price, PricingRule, TimeRange};
use crate::pricing::{self, PriceBasis};

use super::{Engine, EngineError, timed};

const SLOT_SECS: u32 = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotStatus {
    Available,
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Slot {
    pub range: TimeRange,
    pub status: SlotStatus,
    /// Only set for available slots.
    pub price: Option<Price>,
    #[serde(skip)]
    pub basis: Option<PriceBasis>,
}

/// UTC instant of local midnight starting `date`.
fn local_midnight(date: NaiveDate, offset: FixedOffset) -> DateTime<Utc> {
    let local = date.and_time(NaiveTime::MIN);
    Utc.from_utc_datetime(&(local - TimeDelta::seconds(offset.local_minus_utc().into())))
}

/// Hour-long slots from `window.0` while the slot still ends by `window.1`
/// (seconds from local midnight). A slot is unavailable if it overlaps any
/// range in `taken`.
pub fn hourly_slots(
    date: NaiveDate,
    window: (u32, u32),
    offset: FixedOffset,
    taken: &[TimeRange],
    rules: &[PricingRule],
    default_rate: Price,
) -> Vec<Slot> {
    let midnight = local_midnight(date, offset);
    let (open, close) = window;

    let mut slots = Vec::new();
    let mut cursor = open;
    while cursor + SLOT_SECS <= close {
        let start = midnight + TimeDelta::seconds(cursor.into());
        let Ok(range) = TimeRange::new(start, start + TimeDelta::seconds(SLOT_SECS.into())) else {
            break;
        };
        let slot = if taken.iter().any(|t| t.overlaps(&range)) {
            Slot { range, status: SlotStatus::Unavailable, price: None, basis: None }
        } else {
            let quote = pricing::quote(rules, &range, offset, default_rate);
            Slot {
                range,
                status: SlotStatus::Available,
                price: Some(quote.amount),
                basis: Some(quote.basis),
            }
        };
        slots.push(slot);
        cursor += SLOT_SECS;
    }
    slots
}

impl Engine {
    /// Hourly slot grid for a court on a local date. Reads durable rows only;
    /// soft locks are not consulted.
    pub async fn availability(&self, court_id: Ulid, date: NaiveDate) -> Result<Vec<Slot>, EngineError> {
        timed("availability", self.availability_inner(court_id, date)).await
    }

    async fn availability_inner(&self, court_id: Ulid, date: NaiveDate) -> Result<Vec<Slot>, EngineError> {
        let court = self.court(court_id).await?;
        if !court.active {
            tracing::debug!(%court_id, "inactive court, no slots");
            return Ok(Vec::new());
        }
        let venue = self.venue_of(&court).await?;
        let offset = venue.offset();

        let hours = self.ports.catalog.operating_hours(court_id).await?;
        if hours.is_empty() {
            self.permissive_default("hours_unrestricted", court_id);
        }
        let Some(window) = pricing::day_window(&hours, date) else {
            return Ok(Vec::new());
        };

        let midnight = local_midnight(date, offset);
        let day = TimeRange::new(midnight, midnight + TimeDelta::days(1))?;
        let taken: Vec<TimeRange> = self
            .ports
            .bookings
            .find_overlapping(court_id, &day, &BLOCKING_STATUSES, None)
            .await?
            .iter()
            .map(|b| b.range())
            .collect();

        let rules = self.ports.catalog.pricing_rules(court_id).await?;
        let slots = hourly_slots(date, window, offset, &taken, &rules, self.settings.default_rate_per_hour);

        if rules.is_empty() {
            self.permissive_default("default_rate", court_id);
        } else if slots.iter().any(|s| s.basis == Some(PriceBasis::FirstRuleFallback)) {
            self.permissive_default("first_rule_fallback", court_id);
        }
        Ok(slots)
    }
}
