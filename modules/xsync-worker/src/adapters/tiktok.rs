use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use xsync_common::{Platform, RawFeed, WorkDispatched, WorkError};

use super::extract::player_media;
use super::{collect_rss_entries, static_platform, FetchedFeeds, PlatformAdapter};
use crate::traits::FeedFetcher;

/// TikTok user videos through the stateless RSSHub instance. The item
/// description is only the player snippet; the caption lives in the title.
pub struct TikTokAdapter {
    fetcher: Arc<dyn FeedFetcher>,
}

impl TikTokAdapter {
    pub fn new(fetcher: Arc<dyn FeedFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl PlatformAdapter for TikTokAdapter {
    fn platform(&self) -> &'static Platform {
        static_platform("tiktok")
    }

    async fn fetch(
        &self,
        work: &WorkDispatched,
        collect_link: &str,
    ) -> Result<FetchedFeeds, WorkError> {
        let feeds: Vec<RawFeed> = collect_rss_entries(self.fetcher.as_ref(), work, collect_link)
            .await?
            .into_iter()
            .map(|e| RawFeed {
                pending_media: player_media(&e.summary),
                content: e.title,
                link: e.link,
                guid: e.guid,
                authors: e.authors,
                categories: e.categories,
                published_at: e.published_at,
                ..Default::default()
            })
            .collect();

        debug!(account_id = work.account_id, retained = feeds.len(), "TikTok feed collected");
        Ok(FetchedFeeds::new(feeds))
    }
}
