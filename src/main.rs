use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use courtbook::config::{HoldBackend, Settings};
use courtbook::engine::{Engine, Ports};
use courtbook::hold::{HoldStore, MemoryHoldStore, RedisHoldStore};
use courtbook::notify::NotifyHub;
use courtbook::store::{StaticCatalog, WalStore};
use courtbook::{observability, payment, reaper};

const HOLD_PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("courtbook=info")))
        .init();

    let settings = Settings::load()?;
    observability::init(settings.metrics.port)?;

    let store = WalStore::open(&settings.storage.wal_path)?;
    let catalog = Arc::new(StaticCatalog::load(&settings.storage.catalog_path)?);

    let holds: Arc<dyn HoldStore> = match settings.holds.backend {
        HoldBackend::Memory => {
            let memory = Arc::new(MemoryHoldStore::new());
            tokio::spawn(reaper::run_hold_purger(memory.clone(), HOLD_PURGE_INTERVAL));
            memory
        }
        HoldBackend::Redis => Arc::new(RedisHoldStore::connect(&settings.holds.redis_url).await?),
    };

    let ports = Ports {
        bookings: Arc::new(store.clone()),
        catalog,
        holds,
        audit: Arc::new(store.clone()),
        payments: Arc::new(payment::Disabled),
        notifier: Arc::new(NotifyHub::new()),
    };
    let engine = Arc::new(Engine::new(ports, settings.booking.clone()));

    tokio::spawn(reaper::run_reaper(
        engine.clone(),
        Duration::from_secs(settings.sweep.interval_secs.max(1)),
        settings.sweep.complete_finished,
    ));
    tokio::spawn(reaper::run_compactor(
        store.clone(),
        settings.storage.compact_threshold,
        Duration::from_secs(settings.storage.compact_interval_secs.max(1)),
    ));

    info!("courtbook running");
    info!("  journal: {}", settings.storage.wal_path.display());
    info!("  catalog: {}", settings.storage.catalog_path.display());
    info!("  holds: {:?}, ttl {}s", settings.holds.backend, engine.settings().hold_ttl().as_secs());
    info!(
        "  metrics: {}",
        settings.metrics.port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }

    info!("shutdown signal received, compacting journal");
    if let Err(e) = store.compact().await {
        tracing::warn!("final compaction failed: {e}");
    }
    info!("courtbook stopped");
    Ok(())
}
