use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveTime;
use serde::Deserialize;
use tracing::warn;
use ulid::Ulid;

use super::{CatalogStore, StoreError};
use crate::model::{Court, OperatingHours, PricingRule, Venue};

/// On-disk catalog document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogSeed {
    #[serde(default)]
    pub venues: Vec<Venue>,
    #[serde(default)]
    pub courts: Vec<Court>,
    #[serde(default)]
    pub operating_hours: Vec<OperatingHours>,
    #[serde(default)]
    pub pricing_rules: Vec<PricingRule>,
}

/// Immutable catalog loaded once at startup.
#[derive(Debug, Default)]
pub struct StaticCatalog {
    venues: HashMap<Ulid, Venue>,
    courts: HashMap<Ulid, Court>,
    hours: HashMap<Ulid, Vec<OperatingHours>>,
    rules: HashMap<Ulid, Vec<PricingRule>>,
}

impl StaticCatalog {
    pub fn from_seed(seed: CatalogSeed) -> Self {
        let venues: HashMap<Ulid, Venue> = seed.venues.into_iter().map(|v| (v.id, v)).collect();

        let mut courts = HashMap::new();
        for court in seed.courts {
            if !venues.contains_key(&court.venue_id) {
                warn!(court_id = %court.id, venue_id = %court.venue_id, "court references unknown venue");
            }
            courts.insert(court.id, court);
        }

        let mut hours: HashMap<Ulid, Vec<OperatingHours>> = HashMap::new();
        for h in seed.operating_hours {
            // a 00:00 close runs to the end of the day
            if !h.closed && h.close != NaiveTime::MIN && h.open >= h.close {
                warn!(court_id = %h.court_id, weekday = ?h.weekday, "operating hours open at or after close");
            }
            hours.entry(h.court_id).or_default().push(h);
        }

        // Rule order is significant: the first rule is the unmatched fallback.
        let mut rules: HashMap<Ulid, Vec<PricingRule>> = HashMap::new();
        for r in seed.pricing_rules {
            if r.end != NaiveTime::MIN && r.start >= r.end {
                warn!(court_id = %r.court_id, "pricing rule window is empty");
            }
            rules.entry(r.court_id).or_default().push(r);
        }

        tracing::info!(
            venues = venues.len(),
            courts = courts.len(),
            "catalog loaded"
        );
        Self { venues, courts, hours, rules }
    }

    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let seed: CatalogSeed = serde_json::from_str(json)?;
        Ok(Self::from_seed(seed))
    }

    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Backend(format!("reading catalog {}: {e}", path.display())))?;
        Self::from_json(&json)
    }
}

#[async_trait]
impl CatalogStore for StaticCatalog {
    async fn find_court(&self, id: Ulid) -> Result<Option<Court>, StoreError> {
        Ok(self.courts.get(&id).cloned())
    }

    async fn find_venue(&self, id: Ulid) -> Result<Option<Venue>, StoreError> {
        Ok(self.venues.get(&id).cloned())
    }

    async fn courts_for_venue(&self, venue_id: Ulid) -> Result<Vec<Court>, StoreError> {
        let mut courts: Vec<Court> = self
            .courts
            .values()
            .filter(|c| c.venue_id == venue_id)
            .cloned()
            .collect();
        courts.sort_by_key(|c| c.id);
        Ok(courts)
    }

    async fn operating_hours(&self, court_id: Ulid) -> Result<Vec<OperatingHours>, StoreError> {
        Ok(self.hours.get(&court_id).cloned().unwrap_or_default())
    }

    async fn pricing_rules(&self, court_id: Ulid) -> Result<Vec<PricingRule>, StoreError> {
        Ok(self.rules.get(&court_id).cloned().unwrap_or_default())
    }
}
