//! shipyard Scheduler
//!
//! Runs placement and harmonization against a cluster described by a JSON
//! file, using an in-memory store and the dry-run engine.

use std::sync::Arc;

use anyhow::Result;
use shipyard_scheduler::{
    config::Config, engine::EngineRegistry, seed::ClusterSeed, store::MemoryStore,
    HarmonizationWorker, Scheduler,
};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to SHIPYARD_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting shipyard scheduler");
    info!(
        cluster_id = %config.scheduler.cluster_id,
        cluster_file = %config.cluster_file.display(),
        "Configuration loaded"
    );

    let seed = match ClusterSeed::load(&config.cluster_file).await {
        Ok(seed) => seed,
        Err(e) => {
            error!(error = %e, "Failed to load cluster file");
            return Err(e);
        }
    };

    let (engines, _) = EngineRegistry::dry_run();
    let scheduler = Arc::new(
        Scheduler::new(
            Arc::new(MemoryStore::new()),
            Arc::new(seed.membership()),
            config.scheduler.clone(),
        )
        .with_engines(engines),
    );
    seed.populate(&scheduler).await?;

    info!(
        peers = seed.peers.len(),
        applications = seed.applications.len(),
        "Cluster seeded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker = HarmonizationWorker::new(Arc::clone(&scheduler));
    let worker_handle = tokio::spawn(async move {
        worker.run(shutdown_rx).await;
    });

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    let _ = shutdown_tx.send(true);

    let shutdown_timeout = std::time::Duration::from_secs(10);
    if let Err(e) = tokio::time::timeout(shutdown_timeout, worker_handle).await {
        warn!(error = %e, "Harmonization worker did not shut down in time");
    }

    info!("Scheduler shutdown complete");
    Ok(())
}
