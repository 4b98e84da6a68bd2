use std::time::Duration;

use ::redis::aio::MultiplexedConnection;
use async_trait::async_trait;

use super::{HoldKey, HoldRecord, HoldStore};
use crate::store::StoreError;

/// Hold store backed by a shared Redis instance, so every engine process
/// contends on the same keys.
#[derive(Clone)]
pub struct RedisHoldStore {
    conn: MultiplexedConnection,
}

impl RedisHoldStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = ::redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        tracing::info!("connected to redis hold store");
        Ok(Self { conn })
    }
}

/// Redis `EX` takes whole seconds and rejects zero.
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl HoldStore for RedisHoldStore {
    async fn acquire(&self, key: &HoldKey, record: HoldRecord, ttl: Duration) -> Result<bool, StoreError> {
        let value = serde_json::to_string(&record)?;
        let mut conn = self.conn.clone();
        let reply: Option<String> = ::redis::cmd("SET")
            .arg(key.as_str())
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn update(&self, key: &HoldKey, record: HoldRecord, ttl: Duration) -> Result<(), StoreError> {
        let value = serde_json::to_string(&record)?;
        let mut conn = self.conn.clone();
        let _: () = ::redis::cmd("SET")
            .arg(key.as_str())
            .arg(value)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn release(&self, key: &HoldKey) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = ::redis::cmd("DEL").arg(key.as_str()).query_async(&mut conn).await?;
        Ok(())
    }

    async fn exists(&self, key: &HoldKey) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let n: i64 = ::redis::cmd("EXISTS").arg(key.as_str()).query_async(&mut conn).await?;
        Ok(n > 0)
    }

    async fn get(&self, key: &HoldKey) -> Result<Option<HoldRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = ::redis::cmd("GET").arg(key.as_str()).query_async(&mut conn).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn remaining_ttl(&self, key: &HoldKey) -> Result<Option<Duration>, StoreError> {
        let mut conn = self.conn.clone();
        // -2: no such key, -1: key without expiry
        let secs: i64 = ::redis::cmd("TTL").arg(key.as_str()).query_async(&mut conn).await?;
        Ok(u64::try_from(secs).ok().map(Duration::from_secs))
    }
}
