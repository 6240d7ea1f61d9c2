use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use xsync_common::{Platform, RawFeed, WorkDispatched, WorkError};

use super::extract::image_sources;
use super::{collect_rss_entries, static_platform, FetchedFeeds, PlatformAdapter};
use crate::traits::FeedFetcher;

/// Medium publication RSS. Article HTML is kept whole; images stay inline
/// and are rewritten to storage URIs after upload.
pub struct MediumAdapter {
    fetcher: Arc<dyn FeedFetcher>,
}

impl MediumAdapter {
    pub fn new(fetcher: Arc<dyn FeedFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl PlatformAdapter for MediumAdapter {
    fn platform(&self) -> &'static Platform {
        static_platform("medium")
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
                pending_media: image_sources(&e.content),
                title: e.title,
                link: e.link,
                guid: e.guid,
                authors: e.authors,
                categories: e.categories,
                published_at: e.published_at,
                content: e.content,
                ..Default::default()
            })
            .collect();

        debug!(account_id = work.account_id, retained = feeds.len(), "Medium feed collected");
        Ok(FetchedFeeds::new(feeds))
    }
}
