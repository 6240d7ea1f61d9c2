//! Sync counters.
//!
//! Every increment goes to the `metrics` facade (exported by Prometheus when
//! a listener is configured) and to a process-local tally that logs and
//! tests can read back.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use metrics::describe_counter;
use metrics_exporter_prometheus::PrometheusBuilder;

use xsync_common::ErrorCode;

pub const WORK_SUCCEEDED: &str = "xsync_work_succeeded_total";
pub const WORK_FAILED: &str = "xsync_work_failed_total";
pub const RECOVERY_SWEEPS: &str = "xsync_recovery_sweeps_total";
pub const FEEDS_RECOVERED: &str = "xsync_feeds_recovered_total";

/// Install the Prometheus recorder with an HTTP listener on `addr`.
/// Must run inside the tokio runtime.
pub fn install_prometheus(addr: &str) -> Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("METRICS_ADDR is not a socket address: {addr}"))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus recorder")?;
    register_metrics();
    tracing::info!(%addr, "Prometheus metrics listener started");
    Ok(())
}

fn register_metrics() {
    describe_counter!(WORK_SUCCEEDED, "Work-succeeded batches persisted");
    describe_counter!(WORK_FAILED, "Work-failed messages received, by error code");
    describe_counter!(RECOVERY_SWEEPS, "Recovery sweeps run");
    describe_counter!(FEEDS_RECOVERED, "Pending feeds posted by recovery");
}

#[derive(Debug, Default)]
pub struct SyncCounters {
    work_succeeded: AtomicU64,
    work_failed: AtomicU64,
    recovery_sweeps: AtomicU64,
    feeds_recovered: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountersSnapshot {
    pub work_succeeded: u64,
    pub work_failed: u64,
    pub recovery_sweeps: u64,
    pub feeds_recovered: u64,
}

impl SyncCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn work_succeeded(&self, platform: &str) {
        self.work_succeeded.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(WORK_SUCCEEDED, "platform" => platform.to_string()).increment(1);
    }

    pub fn work_failed(&self, code: ErrorCode) {
        self.work_failed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(WORK_FAILED, "code" => code.as_str()).increment(1);
    }

    pub fn recovery_sweep(&self) {
        self.recovery_sweeps.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(RECOVERY_SWEEPS).increment(1);
    }

    pub fn feeds_recovered(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.feeds_recovered.fetch_add(count, Ordering::Relaxed);
        metrics::counter!(FEEDS_RECOVERED).increment(count);
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            work_succeeded: self.work_succeeded.load(Ordering::Relaxed),
            work_failed: self.work_failed.load(Ordering::Relaxed),
            recovery_sweeps: self.recovery_sweeps.load(Ordering::Relaxed),
            feeds_recovered: self.feeds_recovered.load(Ordering::Relaxed),
        }
    }
}
