//! Platform feed adapters.
//!
//! One adapter per platform. Each turns a collect-link response into
//! normalized [`RawFeed`] entries: ownership is verified against the
//! channel bio, entries outside the work window are dropped, and embedded
//! media is lifted into `pending_media` for the ingestion step.

mod extract;
mod github;
mod medium;
mod rss;
mod tiktok;
mod twitter;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use xsync_common::{platform, Platform, RawFeed, WorkDispatched, WorkError};

use crate::traits::FeedFetcher;
use rss::{parse_channel, ParsedEntry};

pub use extract::unescape_entities;
pub use github::GitHubAdapter;
pub use medium::MediumAdapter;
pub use tiktok::TikTokAdapter;
pub use twitter::TwitterAdapter;

/// Entries retained from one collect call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedFeeds {
    pub feeds: Vec<RawFeed>,
    /// Smallest gap between consecutive retained entries.
    pub proposed_interval: Option<Duration>,
}

impl FetchedFeeds {
    pub(crate) fn new(mut feeds: Vec<RawFeed>) -> Self {
        feeds.sort_by_key(|f| f.published_at);
        let proposed_interval = minimal_interval(&feeds);
        Self {
            feeds,
            proposed_interval,
        }
    }
}

#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> &'static Platform;

    /// Fetch `collect_link` and return the entries inside the work window.
    /// Fails with `AccountNotVerified` before any entry is produced when the
    /// channel bio lacks the verify key.
    async fn fetch(&self, work: &WorkDispatched, collect_link: &str)
        -> Result<FetchedFeeds, WorkError>;
}

/// Adapters keyed by platform id.
pub struct AdapterRegistry {
    adapters: HashMap<&'static str, Arc<dyn PlatformAdapter>>,
}

impl AdapterRegistry {
    pub fn empty() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Every supported platform, sharing one fetcher.
    pub fn new(fetcher: Arc<dyn FeedFetcher>) -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(MediumAdapter::new(fetcher.clone())));
        registry.register(Arc::new(GitHubAdapter::new(fetcher.clone())));
        registry.register(Arc::new(TikTokAdapter::new(fetcher.clone())));
        registry.register(Arc::new(TwitterAdapter::new(fetcher)));
        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn PlatformAdapter>) {
        self.adapters.insert(adapter.platform().id, adapter);
    }

    pub fn get(&self, platform_id: &str) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapters.get(platform_id).cloned()
    }

    pub fn platform_ids(&self) -> Vec<&'static str> {
        let mut ids: Vec<_> = self.adapters.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

// --- Shared adapter steps ---

pub(crate) fn static_platform(id: &str) -> &'static Platform {
    // Adapters are only constructed for ids present in the registry table.
    match platform(id) {
        Some(p) => p,
        None => unreachable!("platform {id} missing from SUPPORTED_PLATFORMS"),
    }
}

/// Body behind a collect link. Transport failures become `FetchFailed`.
pub(crate) async fn fetch_body(
    fetcher: &dyn FeedFetcher,
    collect_link: &str,
) -> Result<Vec<u8>, WorkError> {
    fetcher
        .fetch(collect_link)
        .await
        .map_err(|e| WorkError::fetch(format!("{e:#}")))
}

/// Entries of an RSS collect link inside the work window, once the channel
/// bio has been verified.
pub(crate) async fn collect_rss_entries(
    fetcher: &dyn FeedFetcher,
    work: &WorkDispatched,
    collect_link: &str,
) -> Result<Vec<ParsedEntry>, WorkError> {
    let bytes = fetch_body(fetcher, collect_link).await?;
    let channel = parse_channel(&bytes).map_err(|e| WorkError::fetch(format!("{e:#}")))?;

    verify_ownership(&channel.description, &work.verify_key)?;

    Ok(channel
        .entries
        .into_iter()
        .filter(|e| work.accepts(e.published_at))
        .collect())
}

/// Case-insensitive containment of the verify key in the channel bio. An
/// account without a key never verifies.
pub(crate) fn verify_ownership(bio: &str, verify_key: &str) -> Result<(), WorkError> {
    let key = verify_key.trim();
    if !key.is_empty() && bio.to_lowercase().contains(&key.to_lowercase()) {
        Ok(())
    } else {
        Err(WorkError::not_verified())
    }
}

/// `Name <email>` when an email is known.
pub(crate) fn format_author(name: &str, email: Option<&str>) -> String {
    match email.filter(|e| !e.is_empty()) {
        Some(email) => format!("{name} <{email}>"),
        None => name.to_string(),
    }
}

/// Smallest gap between consecutive entries sorted by publish time. Entries
/// sharing a timestamp give a zero gap.
pub(crate) fn minimal_interval(sorted: &[RawFeed]) -> Option<Duration> {
    sorted
        .windows(2)
        .filter_map(|pair| (pair[1].published_at - pair[0].published_at).to_std().ok())
        .min()
}
