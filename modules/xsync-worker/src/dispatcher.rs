//! Work dispatcher.
//!
//! Consumes `xsync.work.dispatched.<platform>` messages, runs each work item
//! as its own task and emits exactly one result message per item.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use tracing::{error, info, warn};

use xsync_common::subjects::{WORK_DISPATCHED_PREFIX, WORK_FAILED, WORK_SUCCEEDED};
use xsync_common::{
    ErrorCode, OnChainRequest, RawFeed, WorkDispatched, WorkError, WorkFailed, WorkSucceeded,
    WorkerConfig,
};

use crate::adapters::AdapterRegistry;
use crate::governor::Governor;
use crate::media::MediaIngestor;
use crate::publisher::NotePublisher;

/// Queue group shared by every worker process, so each item is handled once.
const QUEUE_GROUP: &str = "xsync-workers";

// ---------------------------------------------------------------------------
// WorkPublisher
// ---------------------------------------------------------------------------

/// Outbound side of the bus.
#[async_trait]
pub trait WorkPublisher: Send + Sync {
    async fn work_succeeded(&self, msg: &WorkSucceeded) -> Result<()>;
    async fn work_failed(&self, msg: &WorkFailed) -> Result<()>;
}

pub struct NatsWorkPublisher {
    client: async_nats::Client,
}

impl NatsWorkPublisher {
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }

    async fn send<T: serde::Serialize + Sync>(&self, subject: &'static str, msg: &T) -> Result<()> {
        let payload = serde_json::to_vec(msg).context("Failed to encode result message")?;
        self.client
            .publish(subject, payload.into())
            .await
            .with_context(|| format!("Failed to publish to {subject}"))?;
        Ok(())
    }
}

#[async_trait]
impl WorkPublisher for NatsWorkPublisher {
    async fn work_succeeded(&self, msg: &WorkSucceeded) -> Result<()> {
        self.send(WORK_SUCCEEDED, msg).await
    }

    async fn work_failed(&self, msg: &WorkFailed) -> Result<()> {
        self.send(WORK_FAILED, msg).await
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

pub struct Dispatcher {
    registry: AdapterRegistry,
    governor: Governor,
    ingestor: MediaIngestor,
    publisher: Arc<dyn NotePublisher>,
    results: Arc<dyn WorkPublisher>,
    rsshub_stateful: String,
    rsshub_stateless: String,
}

impl Dispatcher {
    pub fn new(
        config: &WorkerConfig,
        registry: AdapterRegistry,
        ingestor: MediaIngestor,
        publisher: Arc<dyn NotePublisher>,
        results: Arc<dyn WorkPublisher>,
    ) -> Self {
        Self {
            registry,
            governor: Governor::from_config(config),
            ingestor,
            publisher,
            results,
            rsshub_stateful: config.rsshub_endpoint_stateful.clone(),
            rsshub_stateless: config.rsshub_endpoint_stateless.clone(),
        }
    }

    /// Subscribe to every dispatch subject and handle messages until the
    /// subscription closes. Unknown platforms still arrive here so they can
    /// be answered with `UnsupportedPlatform`.
    pub async fn run(self: Arc<Self>, client: async_nats::Client) -> Result<()> {
        let subject = format!("{WORK_DISPATCHED_PREFIX}.*");
        let mut subscriber = client
            .queue_subscribe(subject.clone(), QUEUE_GROUP.to_string())
            .await
            .with_context(|| format!("Failed to subscribe to {subject}"))?;

        info!(subject, platforms = ?self.registry.platform_ids(), "Dispatcher listening");

        while let Some(msg) = subscriber.next().await {
            let dispatcher = self.clone();
            tokio::spawn(async move {
                dispatcher.handle_payload(&msg.payload).await;
            });
        }

        warn!("Dispatch subscription closed");
        Ok(())
    }

    /// Decode and handle one raw message. Undecodable payloads carry no
    /// account to answer for and are dropped.
    pub async fn handle_payload(&self, payload: &[u8]) {
        match serde_json::from_slice::<WorkDispatched>(payload) {
            Ok(work) => self.handle(work).await,
            Err(e) => warn!(error = %e, "Dropping undecodable work message"),
        }
    }

    /// Process one work item and emit its single result message.
    pub async fn handle(&self, work: WorkDispatched) {
        let accepted_at = Utc::now();
        info!(account_id = work.account_id, platform = %work.platform, "Work accepted");

        let outcome = self.process(&work).await;
        let sent = match outcome {
            Ok(mut succeeded) => {
                succeeded.succeeded_at = accepted_at;
                info!(
                    account_id = work.account_id,
                    feeds = succeeded.feeds.len(),
                    "Work succeeded"
                );
                self.results.work_succeeded(&succeeded).await
            }
            Err(e) => {
                warn!(account_id = work.account_id, code = %e.code, error = %e.message, "Work failed");
                self.results
                    .work_failed(&WorkFailed {
                        account_id: work.account_id,
                        platform: work.platform.clone(),
                        error_code: e.code,
                        error_message: e.message,
                    })
                    .await
            }
        };

        if let Err(e) = sent {
            error!(account_id = work.account_id, error = %format!("{e:#}"), "Failed to emit work result");
        }
    }

    async fn process(&self, work: &WorkDispatched) -> Result<WorkSucceeded, WorkError> {
        let adapter = self
            .registry
            .get(&work.platform)
            .ok_or_else(|| WorkError::unsupported_platform(&work.platform))?;
        let platform = adapter.platform();
        let link = platform.collect_link(&self.rsshub_stateful, &self.rsshub_stateless, &work.username);

        let fetched = self
            .governor
            .scoped(platform.class, async {
                let mut fetched = adapter.fetch(work, &link).await?;
                self.ingestor.ingest(&mut fetched.feeds).await;
                Ok::<_, WorkError>(fetched)
            })
            .await
            .map_err(|e| WorkError::new(ErrorCode::FetchFailed, e.to_string()))??;

        let mut feeds = fetched.feeds;
        if work.on_chain {
            self.publish_in_order(work, &mut feeds).await;
        }

        Ok(WorkSucceeded {
            account_id: work.account_id,
            platform: work.platform.clone(),
            dispatch_at: work.dispatch_at,
            succeeded_at: Utc::now(),
            new_interval: fetched.proposed_interval,
            feeds,
        })
    }

    /// Post entries oldest first. The first failure stops the run: the
    /// failing entry keeps whatever storage URI was reached and it and every
    /// later entry are left without a transaction, so the batch still reaches
    /// the server, which pauses the account for ordered replay.
    async fn publish_in_order(&self, work: &WorkDispatched, feeds: &mut [RawFeed]) {
        for feed in feeds.iter_mut() {
            let request = OnChainRequest::from_feed(work.character_id, &work.platform, &work.username, feed);
            match self.publisher.publish(&request).await {
                Ok(receipt) => {
                    feed.ipfs_uri = Some(receipt.ipfs_uri);
                    feed.transaction = Some(receipt.transaction);
                    feed.note_character_id = Some(receipt.note_character_id);
                    feed.note_id = Some(receipt.note_id);
                }
                Err(e) => {
                    if !e.receipt.ipfs_uri.is_empty() {
                        feed.ipfs_uri = Some(e.receipt.ipfs_uri);
                    }
                    warn!(
                        account_id = work.account_id,
                        link = %feed.link,
                        code = %e.code,
                        error = %e.message,
                        "Publishing stopped; remaining entries left for replay"
                    );
                    break;
                }
            }
        }
    }
}
