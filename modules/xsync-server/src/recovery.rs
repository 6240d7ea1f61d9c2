//! Recovery scheduler.
//!
//! Periodically replays pending feeds of paused accounts through the
//! publisher. At most one sweep runs at a time; a tick that fires while a
//! sweep is in flight is dropped, not queued.
//!
//! Per account, feeds are replayed earliest first and the replay stops at
//! the first failure, since later notes may reference earlier ones. Each
//! success is saved as it happens. The account resumes only when nothing is
//! left pending.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use xsync_common::OnChainRequest;
use xsync_worker::NotePublisher;

use crate::cache::{keys, CacheInvalidator};
use crate::metrics::SyncCounters;
use crate::store::{Account, Result, StoredFeed, SyncStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub accounts: usize,
    pub resumed: usize,
    pub feeds_recovered: usize,
}

/// Outcome of replaying one paused account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountOutcome {
    /// Operator may not post for the character; nothing attempted.
    NoPermission,
    /// Replay stopped at a failing feed after `recovered` successes.
    Stalled { recovered: usize },
    /// Every pending feed now has a transaction.
    Resumed { recovered: usize },
}

pub struct RecoveryScheduler {
    store: Arc<dyn SyncStore>,
    publisher: Arc<dyn NotePublisher>,
    cache: Arc<dyn CacheInvalidator>,
    counters: Arc<SyncCounters>,
    busy: AtomicBool,
}

/// Clears the busy flag on every exit path of a sweep.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl RecoveryScheduler {
    pub fn new(
        store: Arc<dyn SyncStore>,
        publisher: Arc<dyn NotePublisher>,
        cache: Arc<dyn CacheInvalidator>,
        counters: Arc<SyncCounters>,
    ) -> Self {
        Self {
            store,
            publisher,
            cache,
            counters,
            busy: AtomicBool::new(false),
        }
    }

    /// Fire a sweep on every tick of `period`. Each sweep runs in its own
    /// task so a slow sweep never delays the timer; overlapping ticks are
    /// dropped by [`Self::sweep_if_idle`].
    pub async fn run(self: Arc<Self>, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(period_secs = period.as_secs(), "Recovery scheduler started");
        loop {
            ticker.tick().await;
            let scheduler = self.clone();
            tokio::spawn(async move {
                scheduler.sweep_if_idle().await;
            });
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Run one sweep unless another is in flight. `None` means the tick was dropped.
    pub async fn sweep_if_idle(&self) -> Option<SweepReport> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Recovery sweep already running, tick dropped");
            return None;
        }
        let _guard = BusyGuard(&self.busy);

        self.counters.recovery_sweep();
        match self.sweep().await {
            Ok(report) => {
                info!(
                    accounts = report.accounts,
                    resumed = report.resumed,
                    feeds_recovered = report.feeds_recovered,
                    "Recovery sweep finished"
                );
                Some(report)
            }
            Err(e) => {
                error!(error = %e, "Recovery sweep aborted");
                Some(SweepReport::default())
            }
        }
    }

    async fn sweep(&self) -> Result<SweepReport> {
        let accounts = self.store.paused_accounts().await?;
        let mut report = SweepReport {
            accounts: accounts.len(),
            ..Default::default()
        };

        for account in accounts {
            match self.recover_account(&account).await {
                Ok(AccountOutcome::Resumed { recovered }) => {
                    report.resumed += 1;
                    report.feeds_recovered += recovered;
                }
                Ok(AccountOutcome::Stalled { recovered }) => report.feeds_recovered += recovered,
                Ok(AccountOutcome::NoPermission) => {}
                Err(e) => {
                    error!(account_id = account.id, error = %e, "Recovery failed for account");
                }
            }
        }

        self.counters.feeds_recovered(report.feeds_recovered as u64);
        Ok(report)
    }

    /// Replay one paused account's pending feeds in publish order.
    pub async fn recover_account(&self, account: &Account) -> Result<AccountOutcome> {
        match self.publisher.can_post_for(account.character_id).await {
            Ok(true) => {}
            Ok(false) => {
                info!(
                    account_id = account.id,
                    character_id = account.character_id,
                    "Operator lacks permission, account stays paused"
                );
                return Ok(AccountOutcome::NoPermission);
            }
            Err(e) => {
                warn!(account_id = account.id, error = %format!("{e:#}"), "Permission check failed, skipping");
                return Ok(AccountOutcome::NoPermission);
            }
        }

        let pending = self.store.pending_feeds(account.id).await?;
        let mut recovered = 0;

        for feed in &pending {
            let request = self.request_for(account, feed).await?;
            match self.publisher.publish(&request).await {
                Ok(receipt) => {
                    self.store.record_publish(feed.id, &receipt).await?;
                    recovered += 1;
                    debug!(account_id = account.id, feed_id = feed.id, tx = %receipt.transaction, "Feed recovered");
                }
                Err(e) => {
                    self.store
                        .record_publish_failure(feed.id, &e.receipt.ipfs_uri)
                        .await?;
                    warn!(
                        account_id = account.id,
                        feed_id = feed.id,
                        code = %e.code,
                        error = %e.message,
                        "Replay stopped at failing feed"
                    );
                    return Ok(AccountOutcome::Stalled { recovered });
                }
            }
        }

        self.store.set_paused(account.id, false).await?;
        if let Err(e) = self
            .cache
            .invalidate(&keys::for_account(account.character_id, account.id))
            .await
        {
            warn!(account_id = account.id, error = %format!("{e:#}"), "Cache invalidation failed");
        }
        info!(account_id = account.id, recovered, "Account resumed");
        Ok(AccountOutcome::Resumed { recovered })
    }

    async fn request_for(&self, account: &Account, feed: &StoredFeed) -> Result<OnChainRequest> {
        let media = self.store.medias_by_uris(&feed.media_ipfs_uris).await?;
        Ok(OnChainRequest {
            character_id: account.character_id,
            platform: feed.platform.clone(),
            username: account.username.clone(),
            feed_id: Some(feed.id),
            title: feed.title.clone(),
            content: feed.content.clone(),
            categories: feed.categories.clone(),
            authors: feed.authors.clone(),
            content_warning: feed.content_warning.clone(),
            published_at: feed.published_at,
            link: feed.link.clone(),
            for_uri: feed.for_uri.clone(),
            for_character_id: None,
            for_note_id: None,
            media,
        })
    }
}
