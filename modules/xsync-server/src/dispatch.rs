//! Due-work dispatch.
//!
//! Emits one work item per account whose `next_update` has passed, then
//! leases the account forward so the next tick does not dispatch it again
//! while the worker is still busy. The lease is the platform's slowest
//! refresh; a succeeded batch overwrites it with the adaptive schedule.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use xsync_common::subjects::work_dispatched;
use xsync_common::{platform, WorkDispatched};

use crate::interval::next_update;
use crate::store::{Account, SyncStore};

/// Lease for accounts bound to a platform this build does not know.
const UNKNOWN_PLATFORM_LEASE: Duration = Duration::from_secs(24 * 60 * 60);

#[async_trait]
pub trait DispatchPublisher: Send + Sync {
    async fn dispatch(&self, work: &WorkDispatched) -> Result<()>;
}

pub struct NatsDispatchPublisher {
    client: async_nats::Client,
}

impl NatsDispatchPublisher {
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DispatchPublisher for NatsDispatchPublisher {
    async fn dispatch(&self, work: &WorkDispatched) -> Result<()> {
        let subject = work_dispatched(&work.platform);
        let payload = serde_json::to_vec(work).context("Failed to encode work item")?;
        self.client
            .publish(subject.clone(), payload.into())
            .await
            .with_context(|| format!("Failed to publish to {subject}"))?;
        Ok(())
    }
}

pub struct DueWorkDispatcher {
    store: Arc<dyn SyncStore>,
    publisher: Arc<dyn DispatchPublisher>,
}

impl DueWorkDispatcher {
    pub fn new(store: Arc<dyn SyncStore>, publisher: Arc<dyn DispatchPublisher>) -> Self {
        Self { store, publisher }
    }

    pub async fn run(self: Arc<Self>, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(period_secs = period.as_secs(), "Due-work dispatcher started");
        loop {
            ticker.tick().await;
            if let Err(e) = self.run_once(Utc::now()).await {
                error!(error = %format!("{e:#}"), "Dispatch tick failed");
            }
        }
    }

    /// Dispatch every account due at `now`. Returns how many items were sent.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<usize> {
        let due = self
            .store
            .due_accounts(now)
            .await
            .context("Failed to load due accounts")?;

        let mut sent = 0;
        for account in due {
            let work = work_for(&account, now);
            if let Err(e) = self.publisher.dispatch(&work).await {
                warn!(account_id = account.id, error = %format!("{e:#}"), "Failed to dispatch work");
                continue;
            }

            let lease = platform(&account.platform)
                .map(|p| p.max_refresh_gap)
                .unwrap_or(UNKNOWN_PLATFORM_LEASE);
            self.store
                .lease_account(account.id, next_update(now, lease))
                .await
                .with_context(|| format!("Failed to lease account {}", account.id))?;
            sent += 1;
        }

        if sent > 0 {
            info!(sent, "Work dispatched");
        }
        Ok(sent)
    }
}

fn work_for(account: &Account, now: DateTime<Utc>) -> WorkDispatched {
    WorkDispatched {
        account_id: account.id,
        platform: account.platform.clone(),
        username: account.username.clone(),
        verify_key: account.verify_key.clone().unwrap_or_default(),
        character_id: account.character_id,
        on_chain: !account.is_on_chain_paused,
        drop_before: account.last_updated,
        drop_after: now,
        dispatch_at: now,
    }
}
