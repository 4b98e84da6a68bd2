//! Soft locks: TTL-bound set-if-absent entries keyed by exact slot.
//!
//! A slot is claimed the instant the store accepts the write, before any
//! durable booking row exists. Expiry belongs to the store, so a crashed
//! caller never leaves a lock behind longer than its TTL.

pub mod memory;
pub mod redis;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::model::TimeRange;
use crate::store::StoreError;

pub use memory::MemoryHoldStore;
pub use self::redis::RedisHoldStore;

/// `hold:{court_id}:{start}:{end}` with RFC 3339 second-precision UTC instants.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HoldKey(String);

impl HoldKey {
    pub fn new(court_id: Ulid, range: &TimeRange) -> Self {
        Self(format!(
            "hold:{}:{}:{}",
            court_id,
            range.start().to_rfc3339_opts(SecondsFormat::Secs, true),
            range.end().to_rfc3339_opts(SecondsFormat::Secs, true),
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HoldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Payload stored under a hold key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldRecord {
    pub booking_id: Ulid,
    pub user_id: Ulid,
}

#[async_trait]
pub trait HoldStore: Send + Sync {
    /// Atomic set-if-absent with expiry. `false` means someone else holds the key.
    async fn acquire(&self, key: &HoldKey, record: HoldRecord, ttl: Duration) -> Result<bool, StoreError>;

    /// Unconditional overwrite, resetting the TTL.
    async fn update(&self, key: &HoldKey, record: HoldRecord, ttl: Duration) -> Result<(), StoreError>;

    async fn release(&self, key: &HoldKey) -> Result<(), StoreError>;

    async fn exists(&self, key: &HoldKey) -> Result<bool, StoreError>;

    async fn get(&self, key: &HoldKey) -> Result<Option<HoldRecord>, StoreError>;

    /// `None` when the key is absent or carries no expiry.
    async fn remaining_ttl(&self, key: &HoldKey) -> Result<Option<Duration>, StoreError>;
}
