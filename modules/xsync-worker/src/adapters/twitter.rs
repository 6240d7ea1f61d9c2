use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use xsync_common::{Platform, RawFeed, WorkDispatched, WorkError};

use super::extract::{strip_images, strip_videos, trim_trailing_breaks};
use super::rss::{parse_json_feed, JsonFeedItem};
use super::{
    fetch_body, format_author, static_platform, verify_ownership, FetchedFeeds, PlatformAdapter,
};
use crate::traits::FeedFetcher;

/// Tweets through the stateless RSSHub instance in JSON Feed form, which
/// keeps the repost / quote / reply relations in `_extra.links`.
pub struct TwitterAdapter {
    fetcher: Arc<dyn FeedFetcher>,
}

impl TwitterAdapter {
    pub fn new(fetcher: Arc<dyn FeedFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl PlatformAdapter for TwitterAdapter {
    fn platform(&self) -> &'static Platform {
        static_platform("twitter")
    }

    async fn fetch(
        &self,
        work: &WorkDispatched,
        collect_link: &str,
    ) -> Result<FetchedFeeds, WorkError> {
        let bytes = fetch_body(self.fetcher.as_ref(), collect_link).await?;
        let feed = parse_json_feed(&bytes).map_err(|e| WorkError::fetch(format!("{e:#}")))?;

        verify_ownership(&feed.description, &work.verify_key)?;

        let feeds: Vec<RawFeed> = feed
            .items
            .into_iter()
            .filter(|item| item.date_published.is_some_and(|at| work.accepts(at)))
            .filter_map(convert_tweet)
            .collect();

        debug!(account_id = work.account_id, retained = feeds.len(), "Twitter feed collected");
        Ok(FetchedFeeds::new(feeds))
    }
}

/// `None` for reposts.
fn convert_tweet(item: JsonFeedItem) -> Option<RawFeed> {
    let published_at = item.date_published?;
    let mut content = item.content_html;
    let mut for_uri = None;

    for link in item.extra.map(|e| e.links).unwrap_or_default() {
        match link.kind.as_str() {
            "repost" => return None,
            "quote" => {
                if let Some(quoted) = link.content_html.as_deref().filter(|q| !q.is_empty()) {
                    content = content.replacen(quoted, "", 1);
                }
                for_uri = Some(link.url);
            }
            "reply" => for_uri = Some(link.url),
            other => warn!(kind = other, url = %link.url, "Unknown extra link type"),
        }
    }

    let (content, mut pending_media) = strip_images(&content);
    let (content, videos) = strip_videos(&content);
    pending_media.extend(videos);

    Some(RawFeed {
        title: item.title,
        link: item.url.clone(),
        guid: if item.id.is_empty() { item.url } else { item.id },
        authors: item
            .authors
            .iter()
            .map(|a| format_author(&a.name, None))
            .collect(),
        categories: item.tags,
        published_at,
        content: trim_trailing_breaks(&content),
        for_uri,
        pending_media,
        ..Default::default()
    })
}
