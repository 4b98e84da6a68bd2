use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;
use crate::hold::MemoryHoldStore;
use crate::store::WalStore;

/// Background task that demotes lapsed holds and, when enabled, completes
/// bookings whose time has passed.
pub async fn run_reaper(engine: Arc<Engine>, every: Duration, complete_finished: bool) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        match engine.expire_holds().await {
            Ok(0) => {}
            Ok(n) => info!("reaped {n} expired holds"),
            Err(e) => tracing::warn!("expire sweep failed: {e}"),
        }
        if complete_finished {
            match engine.complete_finished().await {
                Ok(0) => {}
                Ok(n) => info!("completed {n} finished bookings"),
                Err(e) => tracing::warn!("complete sweep failed: {e}"),
            }
        }
    }
}

/// Rewrites the journal once enough appends have piled up since the last
/// compaction.
pub async fn run_compactor(store: WalStore, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let appends = store.appends_since_compact().await;
        if appends < threshold {
            tracing::debug!("compactor skip: {appends} appends below {threshold}");
            continue;
        }
        match store.compact().await {
            Ok(()) => info!("compacted journal after {appends} appends, {} bookings kept", store.len()),
            Err(e) => tracing::error!("compaction failed: {e}"),
        }
    }
}

/// Drops expired entries from the in-process hold store. Expired entries are
/// already invisible; this only bounds memory.
pub async fn run_hold_purger(holds: Arc<MemoryHoldStore>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let purged = holds.purge_expired();
        if purged > 0 {
            tracing::debug!("purged {purged} expired soft locks");
        }
    }
}
