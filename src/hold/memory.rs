use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;

use super::{HoldKey, HoldRecord, HoldStore};
use crate::store::StoreError;

struct HeldSlot {
    record: HoldRecord,
    expires_at: Instant,
}

/// In-process hold store for single-node deployments and tests.
///
/// Expiry is lazy: an entry past its deadline behaves as absent on every
/// access and is physically removed by `purge_expired`.
#[derive(Default)]
pub struct MemoryHoldStore {
    entries: DashMap<String, HeldSlot>,
}

impl MemoryHoldStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every entry whose TTL has elapsed. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    fn live(&self, key: &HoldKey) -> Option<(HoldRecord, Instant)> {
        let now = Instant::now();
        let entry = self.entries.get(key.as_str())?;
        (entry.expires_at > now).then_some((entry.record, entry.expires_at))
    }
}

#[async_trait]
impl HoldStore for MemoryHoldStore {
    async fn acquire(&self, key: &HoldKey, record: HoldRecord, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let fresh = HeldSlot { record, expires_at: now + ttl };
        match self.entries.entry(key.as_str().to_owned()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().expires_at > now {
                    return Ok(false);
                }
                occupied.insert(fresh);
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                Ok(true)
            }
        }
    }

    async fn update(&self, key: &HoldKey, record: HoldRecord, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = Instant::now() + ttl;
        self.entries.insert(key.as_str().to_owned(), HeldSlot { record, expires_at });
        Ok(())
    }

    async fn release(&self, key: &HoldKey) -> Result<(), StoreError> {
        self.entries.remove(key.as_str());
        Ok(())
    }

    async fn exists(&self, key: &HoldKey) -> Result<bool, StoreError> {
        Ok(self.live(key).is_some())
    }

    async fn get(&self, key: &HoldKey) -> Result<Option<HoldRecord>, StoreError> {
        Ok(self.live(key).map(|(record, _)| record))
    }

    async fn remaining_ttl(&self, key: &HoldKey) -> Result<Option<Duration>, StoreError> {
        let now = Instant::now();
        Ok(self
            .live(key)
            .map(|(_, expires_at)| expires_at.saturating_duration_since(now)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TimeRange;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;
    use ulid::Ulid;

    const TTL: Duration = Duration::from_secs(300);

    fn key() -> HoldKey {
        let start = Utc.with_ymd_and_hms(2025, 3, 4, 18, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 3, 4, 19, 0, 0).unwrap();
        HoldKey::new(Ulid::new(), &TimeRange::new(start, end).unwrap())
    }

    fn record() -> HoldRecord {
        HoldRecord { booking_id: Ulid::new(), user_id: Ulid::new() }
    }

    #[tokio::test(start_paused = true)]
    async fn second_acquire_fails_while_live() {
        let store = MemoryHoldStore::new();
        let k = key();
        let first = record();
        assert!(store.acquire(&k, first, TTL).await.unwrap());
        assert!(!store.acquire(&k, record(), TTL).await.unwrap());
        assert_eq!(store.get(&k).await.unwrap(), Some(first));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_behaves_as_absent() {
        let store = MemoryHoldStore::new();
        let k = key();
        assert!(store.acquire(&k, record(), TTL).await.unwrap());

        tokio::time::advance(TTL + Duration::from_millis(1)).await;
        assert!(!store.exists(&k).await.unwrap());
        assert_eq!(store.get(&k).await.unwrap(), None);
        assert_eq!(store.remaining_ttl(&k).await.unwrap(), None);

        let next = record();
        assert!(store.acquire(&k, next, TTL).await.unwrap());
        assert_eq!(store.get(&k).await.unwrap(), Some(next));
    }

    #[tokio::test(start_paused = true)]
    async fn release_then_reacquire_with_new_payload() {
        let store = MemoryHoldStore::new();
        let k = key();
        assert!(store.acquire(&k, record(), TTL).await.unwrap());
        store.release(&k).await.unwrap();

        let other = record();
        assert!(store.acquire(&k, other, TTL).await.unwrap());
        assert_eq!(store.get(&k).await.unwrap(), Some(other));
    }

    #[tokio::test(start_paused = true)]
    async fn update_overwrites_and_rearms_ttl() {
        let store = MemoryHoldStore::new();
        let k = key();
        assert!(store.acquire(&k, record(), TTL).await.unwrap());

        tokio::time::advance(Duration::from_secs(200)).await;
        let real = record();
        store.update(&k, real, TTL).await.unwrap();

        assert_eq!(store.get(&k).await.unwrap(), Some(real));
        assert_eq!(store.remaining_ttl(&k).await.unwrap(), Some(TTL));

        tokio::time::advance(Duration::from_secs(200)).await;
        assert!(store.exists(&k).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn remaining_ttl_counts_down() {
        let store = MemoryHoldStore::new();
        let k = key();
        store.acquire(&k, record(), TTL).await.unwrap();
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(store.remaining_ttl(&k).await.unwrap(), Some(Duration::from_secs(240)));
    }

    #[tokio::test(start_paused = true)]
    async fn purge_removes_only_expired() {
        let store = MemoryHoldStore::new();
        let short = key();
        let long = key();
        store.acquire(&short, record(), Duration::from_secs(10)).await.unwrap();
        store.acquire(&long, record(), TTL).await.unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(store.purge_expired(), 1);
        assert!(store.exists(&long).await.unwrap());
        assert_eq!(store.purge_expired(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_acquire_has_one_winner() {
        let store = Arc::new(MemoryHoldStore::new());
        let k = key();
        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            let k = k.clone();
            handles.push(tokio::spawn(async move { store.acquire(&k, record(), TTL).await.unwrap() }));
        }
        let mut winners = 0;
        for h in handles {
            if h.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
