use chrono::Utc;
use tracing::info;

use crate::observability;

use super::{Engine, EngineError, timed};

impl Engine {
    /// Demote every lapsed HOLD to EXPIRED. Safe to run repeatedly; the soft
    /// locks expire on their own and are not touched.
    pub async fn expire_holds(&self) -> Result<usize, EngineError> {
        timed("expire_holds", self.expire_holds_inner()).await
    }

    async fn expire_holds_inner(&self) -> Result<usize, EngineError> {
        let expired = self.ports.bookings.expire_all_past_holds(Utc::now(), "Hold expired").await?;
        if !expired.is_empty() {
            info!(count = expired.len(), "expired lapsed holds");
            metrics::counter!(observability::HOLDS_EXPIRED_TOTAL, "source" => "sweep")
                .increment(expired.len() as u64);
        }
        Ok(expired.len())
    }

    /// Move confirmed bookings whose time has passed to COMPLETED.
    pub async fn complete_finished(&self) -> Result<usize, EngineError> {
        timed("complete_finished", self.complete_finished_inner()).await
    }

    async fn complete_finished_inner(&self) -> Result<usize, EngineError> {
        let completed = self
            .ports
            .bookings
            .complete_all_finished(Utc::now(), "Booking completed")
            .await?;
        if !completed.is_empty() {
            info!(count = completed.len(), "completed finished bookings");
            metrics::counter!(observability::BOOKINGS_COMPLETED_TOTAL).increment(completed.len() as u64);
        }
        Ok(completed.len())
    }
}
