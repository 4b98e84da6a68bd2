use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

// ── Booking flow ────────────────────────────────────────────────

/// Counter: holds successfully created.
pub const HOLDS_CREATED_TOTAL: &str = "courtbook_holds_created_total";

/// Counter: slot conflicts. Labels: stage (soft_lock, durable, confirm).
pub const SLOT_CONFLICTS_TOTAL: &str = "courtbook_slot_conflicts_total";

/// Counter: bookings moved to CONFIRMED. Labels: path (direct, webhook).
pub const CONFIRMATIONS_TOTAL: &str = "courtbook_confirmations_total";

/// Counter: deposit links handed out instead of confirming.
pub const PAYMENT_LINKS_TOTAL: &str = "courtbook_payment_links_total";

/// Counter: webhooks that changed nothing. Labels: reason.
pub const WEBHOOKS_IGNORED_TOTAL: &str = "courtbook_webhooks_ignored_total";

/// Counter: holds moved to EXPIRED. Labels: source (sweep, confirm).
pub const HOLDS_EXPIRED_TOTAL: &str = "courtbook_holds_expired_total";

/// Counter: bookings moved to COMPLETED.
pub const BOOKINGS_COMPLETED_TOTAL: &str = "courtbook_bookings_completed_total";

/// Counter: cancellations. Labels: actor (customer, owner).
pub const CANCELLATIONS_TOTAL: &str = "courtbook_cancellations_total";

/// Counter: permissive catalog fallbacks. Labels: kind.
pub const PERMISSIVE_DEFAULTS_TOTAL: &str = "courtbook_permissive_defaults_total";

/// Counter: soft-lock releases that failed and were left to the TTL.
pub const SOFT_LOCK_RELEASE_FAILURES_TOTAL: &str = "courtbook_soft_lock_release_failures_total";

/// Histogram: engine operation latency in seconds. Labels: op.
pub const OPERATION_DURATION_SECONDS: &str = "courtbook_operation_duration_seconds";

// ── Storage ─────────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "courtbook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "courtbook_wal_flush_batch_size";

/// Counter: WAL compactions performed.
pub const WAL_COMPACTIONS_TOTAL: &str = "courtbook_wal_compactions_total";

/// Install the Prometheus exporter on `port`. No-op if `port` is `None`.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
