// Work-failed consumer. Failures are counted and logged; a failed chain
// transaction pauses the account so recovery picks it up.

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::StreamExt;
use tracing::{error, info, warn};

use xsync_common::subjects::WORK_FAILED;
use xsync_common::{ErrorCode, WorkFailed};

use crate::cache::{keys, CacheInvalidator};
use crate::metrics::SyncCounters;
use crate::store::SyncStore;

const QUEUE_GROUP: &str = "xsync-server";

pub struct FailedWorkConsumer {
    store: Arc<dyn SyncStore>,
    cache: Arc<dyn CacheInvalidator>,
    counters: Arc<SyncCounters>,
}

impl FailedWorkConsumer {
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
            .queue_subscribe(WORK_FAILED, QUEUE_GROUP.to_string())
            .await
            .with_context(|| format!("Failed to subscribe to {WORK_FAILED}"))?;
        info!(subject = WORK_FAILED, "Failed-work consumer listening");

        while let Some(msg) = subscriber.next().await {
            match serde_json::from_slice::<WorkFailed>(&msg.payload) {
                Ok(failed) => self.handle(failed).await,
                Err(e) => warn!(error = %e, "Dropping undecodable work-failed message"),
            }
        }
        warn!("Work-failed subscription closed");
        Ok(())
    }

    pub async fn handle(&self, failed: WorkFailed) {
        self.counters.work_failed(failed.error_code);
        warn!(
            account_id = failed.account_id,
            platform = %failed.platform,
            code = %failed.error_code,
            error = %failed.error_message,
            "Work failed"
        );

        if failed.error_code != ErrorCode::ChainTransactionFailed {
            return;
        }

        if let Err(e) = self.store.set_paused(failed.account_id, true).await {
            error!(account_id = failed.account_id, error = %e, "Failed to pause account");
            return;
        }

        match self.store.account(failed.account_id).await {
            Ok(Some(account)) => {
                if let Err(e) = self
                    .cache
                    .invalidate(&[keys::accounts(account.character_id)])
                    .await
                {
                    warn!(account_id = account.id, error = %format!("{e:#}"), "Cache invalidation failed");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(account_id = failed.account_id, error = %e, "Failed to reload paused account"),
        }
    }
}
