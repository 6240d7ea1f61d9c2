use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use xsync_common::ServerConfig;
use xsync_server::metrics::install_prometheus;
use xsync_server::{
    DueWorkDispatcher, FailedWorkConsumer, IngestionConsumer, NatsDispatchPublisher, PgStore,
    RecoveryScheduler, RedisCache, SyncCounters,
};
use xsync_worker::OnChainPublisher;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("xsync=info".parse()?))
        .init();

    info!("xSync server starting...");

    let config = ServerConfig::from_env()?;

    if let Some(addr) = &config.metrics_addr {
        install_prometheus(addr)?;
    }

    let store = PgStore::connect(&config.database_url).await?;
    store.migrate().await?;
    let store = Arc::new(store);

    let cache = Arc::new(RedisCache::connect(&config.redis_url)?);
    let counters = Arc::new(SyncCounters::new());

    let nats = async_nats::connect(&config.nats_url)
        .await
        .with_context(|| format!("Failed to connect to NATS at {}", config.nats_url))?;

    let publisher = Arc::new(OnChainPublisher::from_config(&config.publisher));

    let ingestion = Arc::new(IngestionConsumer::new(
        store.clone(),
        cache.clone(),
        counters.clone(),
    ));
    let failed = Arc::new(FailedWorkConsumer::new(
        store.clone(),
        cache.clone(),
        counters.clone(),
    ));
    let recovery = Arc::new(RecoveryScheduler::new(
        store.clone(),
        publisher,
        cache.clone(),
        counters.clone(),
    ));
    let dispatcher = Arc::new(DueWorkDispatcher::new(
        store.clone(),
        Arc::new(NatsDispatchPublisher::new(nats.clone())),
    ));

    tokio::select! {
        res = ingestion.run(nats.clone()) => res?,
        res = failed.run(nats) => res?,
        _ = recovery.run(config.recovery_interval) => {},
        _ = dispatcher.run(config.dispatch_interval) => {},
        _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
    }

    info!("xSync server stopped");
    Ok(())
}
