use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use xsync_common::{Platform, RawFeed, WorkDispatched, WorkError};

use super::extract::image_sources;
use super::{collect_rss_entries, static_platform, FetchedFeeds, PlatformAdapter};
use crate::traits::FeedFetcher;

/// GitHub public activity through the stateful RSSHub instance.
pub struct GitHubAdapter {
    fetcher: Arc<dyn FeedFetcher>,
}

impl GitHubAdapter {
    pub fn new(fetcher: Arc<dyn FeedFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl PlatformAdapter for GitHubAdapter {
    fn platform(&self) -> &'static Platform {
        static_platform("github")
    }

    async fn fetch(
        &self,
        work: &WorkDispatched,
        collect_link: &str,
    ) -> Result<FetchedFeeds, WorkError> {
        let feeds: Vec<RawFeed> = collect_rss_entries(self.fetcher.as_ref(), work, collect_link)
            .await?
            .into_iter()
            .map(|e| {
                // Activity items often carry only a title ("alice starred x/y").
                let content = if e.content.trim().is_empty() {
                    e.title.clone()
                } else {
                    e.content
                };
                RawFeed {
                    pending_media: image_sources(&content),
                    title: e.title,
                    link: e.link,
                    guid: e.guid,
                    authors: e.authors,
                    categories: e.categories,
                    published_at: e.published_at,
                    content,
                    ..Default::default()
                }
            })
            .collect();

        debug!(account_id = work.account_id, retained = feeds.len(), "GitHub activity collected");
        Ok(FetchedFeeds::new(feeds))
    }
}
