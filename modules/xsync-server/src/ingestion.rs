//! Ingestion consumer.
//!
//! Persists one work-succeeded batch atomically: feeds, media (deduplicated
//! by content-addressed URI), the account's schedule and the character's
//! media usage. Caches and counters are touched only after commit.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::StreamExt;
use tracing::{error, info, warn};

use xsync_common::subjects::WORK_SUCCEEDED;
use xsync_common::{platform, FeedRecord, Media, WorkSucceeded};

use crate::cache::{keys, CacheInvalidator};
use crate::interval::{clamp_interval, next_update};
use crate::metrics::SyncCounters;
use crate::store::{Account, NewFeed, StoreError, SyncStore};

const QUEUE_GROUP: &str = "xsync-server";

/// What one committed batch changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    pub feeds: usize,
    pub new_media: usize,
    pub added_bytes: i64,
    pub paused: bool,
}

pub struct IngestionConsumer {
    store: Arc<dyn SyncStore>,
    cache: Arc<dyn CacheInvalidator>,
    counters: Arc<SyncCounters>,
}

impl IngestionConsumer {
    pub fn new(
        store: Arc<dyn SyncStore>,
        cache: Arc<dyn CacheInvalidator>,
        counters: Arc<SyncCounters>,
    ) -> Self {
        Self {
            store,
            cache,
            counters,
        }
    }

    pub async fn run(self: Arc<Self>, client: async_nats::Client) -> Result<()> {
        let mut subscriber = client
            .queue_subscribe(WORK_SUCCEEDED, QUEUE_GROUP.to_string())
            .await
            .with_context(|| format!("Failed to subscribe to {WORK_SUCCEEDED}"))?;
        info!(subject = WORK_SUCCEEDED, "Ingestion consumer listening");

        while let Some(msg) = subscriber.next().await {
            match serde_json::from_slice::<WorkSucceeded>(&msg.payload) {
                Ok(work) => {
                    let consumer = self.clone();
                    tokio::spawn(async move {
                        consumer.handle(work).await;
                    });
                }
                Err(e) => warn!(error = %e, "Dropping undecodable work-succeeded message"),
            }
        }
        warn!("Work-succeeded subscription closed");
        Ok(())
    }

    /// Persist a batch. Failures are logged and not retried; nothing of the
    /// batch survives a failed attempt.
    pub async fn handle(&self, work: WorkSucceeded) -> Option<IngestSummary> {
        let account = match self.store.account(work.account_id).await {
            Ok(Some(account)) => account,
            Ok(None) => {
                warn!(account_id = work.account_id, "Work succeeded for unknown account, dropping");
                return None;
            }
            Err(e) => {
                error!(account_id = work.account_id, error = %e, "Failed to load account");
                return None;
            }
        };

        match self.persist(&work, account.clone()).await {
            Ok(summary) => {
                if let Err(e) = self
                    .cache
                    .invalidate(&keys::for_account(account.character_id, account.id))
                    .await
                {
                    warn!(account_id = account.id, error = %format!("{e:#}"), "Cache invalidation failed");
                }
                self.counters.work_succeeded(&work.platform);
                info!(
                    account_id = account.id,
                    feeds = summary.feeds,
                    new_media = summary.new_media,
                    paused = summary.paused,
                    "Work batch persisted"
                );
                Some(summary)
            }
            Err(e) => {
                error!(
                    account_id = account.id,
                    platform = %work.platform,
                    error = %e,
                    "Failed to persist work batch, rolled back"
                );
                None
            }
        }
    }

    async fn persist(&self, work: &WorkSucceeded, mut account: Account) -> Result<IngestSummary, StoreError> {
        let mut tx = self.store.begin().await?;

        // Feeds first: media records point back at them.
        let mut by_uri: HashMap<&str, (&Media, Vec<FeedRecord>)> = HashMap::new();
        let mut uri_order: Vec<&str> = Vec::new();
        for feed in &work.feeds {
            let id = tx
                .insert_feed(NewFeed {
                    account_id: account.id,
                    platform: &work.platform,
                    collected_at: work.succeeded_at,
                    feed,
                })
                .await?;
            for media in &feed.media {
                let entry = by_uri.entry(media.ipfs_uri.as_str()).or_insert_with(|| {
                    uri_order.push(media.ipfs_uri.as_str());
                    (media, Vec::new())
                });
                entry.1.push(FeedRecord {
                    platform: work.platform.clone(),
                    id,
                });
            }
        }

        let mut new_media = 0;
        let mut added_bytes = 0i64;
        for uri in uri_order {
            let (media, related) = &by_uri[uri];
            match tx.media_by_ipfs_uri(uri).await? {
                Some(existing) => tx.add_media_feeds(existing.id, related).await?,
                None => {
                    tx.insert_media(account.character_id, media, related).await?;
                    new_media += 1;
                    added_bytes += media.file_size;
                }
            }
        }

        let interval = match platform(&account.platform) {
            Some(p) => clamp_interval(work.new_interval, p),
            None => account.update_interval,
        };
        account.last_updated = work.succeeded_at;
        account.update_interval = interval;
        account.next_update = next_update(work.succeeded_at, interval);
        account.is_on_chain_paused = work.feeds.iter().any(|f| !f.is_on_chain());
        let paused = tx.save_account(&account).await?;

        tx.save_character(account.character_id, added_bytes).await?;

        tx.commit().await?;

        Ok(IngestSummary {
            feeds: work.feeds.len(),
            new_media,
            added_bytes,
            paused,
        })
    }
}
