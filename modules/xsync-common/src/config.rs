use std::time::Duration;

use anyhow::{Context, Result};

/// How attachment width/height are read out of a media's additional props.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttachmentDimensions {
    /// Historical mapping: a parsed height lands in the width slot.
    #[default]
    Legacy,
    /// Width to width, height to height.
    Corrected,
}

impl std::str::FromStr for AttachmentDimensions {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "legacy" => Ok(Self::Legacy),
            "corrected" => Ok(Self::Corrected),
            other => anyhow::bail!("unknown attachment dimension mapping: {other}"),
        }
    }
}

/// Endpoints the on-chain publisher talks to. Shared by the worker and the
/// server (recovery replays through the same publisher).
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub ipfs_relay_endpoint: String,
    pub indexer_endpoint: String,
    pub contract_rpc_endpoint: String,
    pub operator_address: String,
    pub attachment_dimensions: AttachmentDimensions,
}

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub nats_url: String,
    pub rsshub_endpoint_stateful: String,
    pub rsshub_endpoint_stateless: String,
    pub publisher: PublisherConfig,

    // Governor pool sizes
    pub concurrency_direct: usize,
    pub concurrency_stateful: usize,
    pub concurrency_stateless: usize,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            nats_url: env_or("NATS_URL", "nats://127.0.0.1:4222"),
            rsshub_endpoint_stateful: required_env("RSSHUB_ENDPOINT_STATEFUL")?,
            rsshub_endpoint_stateless: required_env("RSSHUB_ENDPOINT_STATELESS")?,
            publisher: PublisherConfig::from_env()?,
            concurrency_direct: parsed_env("CONCURRENCY_DIRECT", 8)?,
            concurrency_stateful: parsed_env("CONCURRENCY_STATEFUL", 2)?,
            concurrency_stateless: parsed_env("CONCURRENCY_STATELESS", 4)?,
        };

        config.log_redacted();
        Ok(config)
    }

    pub fn log_redacted(&self) {
        tracing::info!("Worker config loaded:");
        tracing::info!("  NATS_URL: {}", self.nats_url);
        tracing::info!("  RSSHUB_ENDPOINT_STATEFUL: {}", self.rsshub_endpoint_stateful);
        tracing::info!("  RSSHUB_ENDPOINT_STATELESS: {}", self.rsshub_endpoint_stateless);
        tracing::info!(
            direct = self.concurrency_direct,
            stateful = self.concurrency_stateful,
            stateless = self.concurrency_stateless,
            "  Concurrency pools"
        );
        self.publisher.log_redacted();
    }
}

impl PublisherConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            ipfs_relay_endpoint: required_env("IPFS_RELAY_ENDPOINT")?,
            indexer_endpoint: env_or("INDEXER_ENDPOINT", "https://indexer.crossbell.io"),
            contract_rpc_endpoint: required_env("CONTRACT_RPC_ENDPOINT")?,
            operator_address: required_env("OPERATOR_ADDRESS")?,
            attachment_dimensions: env_or("ATTACHMENT_DIMENSIONS", "legacy").parse()?,
        })
    }

    fn log_redacted(&self) {
        tracing::info!("  IPFS_RELAY_ENDPOINT: {}", self.ipfs_relay_endpoint);
        tracing::info!("  INDEXER_ENDPOINT: {}", self.indexer_endpoint);
        tracing::info!("  CONTRACT_RPC_ENDPOINT: {}", preview(&self.contract_rpc_endpoint));
        tracing::info!("  OPERATOR_ADDRESS: {}", self.operator_address);
        tracing::info!("  ATTACHMENT_DIMENSIONS: {:?}", self.attachment_dimensions);
    }
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub redis_url: String,
    pub nats_url: String,
    pub publisher: PublisherConfig,
    pub recovery_interval: Duration,
    pub dispatch_interval: Duration,
    pub metrics_addr: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: required_env("DATABASE_URL")?,
            redis_url: required_env("REDIS_URL")?,
            nats_url: env_or("NATS_URL", "nats://127.0.0.1:4222"),
            publisher: PublisherConfig::from_env()?,
            recovery_interval: Duration::from_secs(parsed_env("RECOVERY_INTERVAL_SECS", 600)?),
            dispatch_interval: Duration::from_secs(parsed_env("DISPATCH_INTERVAL_SECS", 60)?),
            metrics_addr: std::env::var("METRICS_ADDR").ok(),
        };

        config.log_redacted();
        Ok(config)
    }

    pub fn log_redacted(&self) {
        tracing::info!("Server config loaded:");
        tracing::info!("  DATABASE_URL: {}", preview(&self.database_url));
        tracing::info!("  REDIS_URL: {}", preview(&self.redis_url));
        tracing::info!("  NATS_URL: {}", self.nats_url);
        tracing::info!("  RECOVERY_INTERVAL_SECS: {}", self.recovery_interval.as_secs());
        tracing::info!("  DISPATCH_INTERVAL_SECS: {}", self.dispatch_interval.as_secs());
        tracing::info!(
            "  METRICS_ADDR: {}",
            self.metrics_addr.as_deref().unwrap_or("<not set>")
        );
        self.publisher.log_redacted();
    }
}

fn preview(val: &str) -> String {
    let head: String = val.chars().take(5).collect();
    format!("{}...({} chars)", head, val.len())
}

fn required_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("{key} environment variable is required"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parsed_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("{key} is not valid: {e}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_mapping_parses_case_insensitively() {
        assert_eq!(
            "Corrected".parse::<AttachmentDimensions>().unwrap(),
            AttachmentDimensions::Corrected
        );
        assert_eq!(
            "legacy".parse::<AttachmentDimensions>().unwrap(),
            AttachmentDimensions::Legacy
        );
        assert!("sideways".parse::<AttachmentDimensions>().is_err());
    }

    #[test]
    fn preview_truncates_secrets() {
        assert_eq!(preview("postgres://secret"), "postg...(17 chars)");
        assert_eq!(preview("ab"), "ab...(2 chars)");
    }
}
