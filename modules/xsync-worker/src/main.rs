use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ipfs_client::IpfsClient;
use xsync_common::WorkerConfig;
use xsync_worker::{
    AdapterRegistry, Dispatcher, HttpFeedFetcher, MediaIngestor, NatsWorkPublisher,
    OnChainPublisher,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("xsync=info".parse()?))
        .init();

    info!("xSync worker starting...");

    let config = WorkerConfig::from_env()?;

    let nats = async_nats::connect(&config.nats_url)
        .await
        .with_context(|| format!("Failed to connect to NATS at {}", config.nats_url))?;

    let fetcher = Arc::new(HttpFeedFetcher::new()?);
    let registry = AdapterRegistry::new(fetcher);
    let ingestor = MediaIngestor::new(Arc::new(IpfsClient::new(
        &config.publisher.ipfs_relay_endpoint,
    )));
    let publisher = Arc::new(OnChainPublisher::from_config(&config.publisher));
    let results = Arc::new(NatsWorkPublisher::new(nats.clone()));

    let dispatcher = Arc::new(Dispatcher::new(&config, registry, ingestor, publisher, results));

    tokio::select! {
        res = dispatcher.run(nats) => res?,
        _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
    }

    info!("xSync worker stopped");
    Ok(())
}
