// Media ingestion for one work item: every distinct media URI found in the
// batch is uploaded exactly once, concurrently, and each entry's content is
// rewritten to point at the stored copy.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use xsync_common::{Media, PendingMedia, RawFeed};

use crate::adapters::unescape_entities;
use crate::traits::ContentStore;

pub struct MediaIngestor {
    store: Arc<dyn ContentStore>,
}

impl MediaIngestor {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    /// Upload the batch's pending media and attach the results.
    ///
    /// A failed upload is logged and dropped: the entry keeps the original
    /// URI in its content and simply gets no `Media` for it. Media order per
    /// entry follows extraction order.
    pub async fn ingest(&self, feeds: &mut [RawFeed]) {
        let unique = unique_media(feeds);
        if unique.is_empty() {
            return;
        }

        let uploads = unique.iter().map(|pending| async move {
            let source = unescape_entities(&pending.uri);
            match self.store.upload_from_url(&source, pending.is_video).await {
                Ok(media) => Some((pending.uri.clone(), media)),
                Err(e) => {
                    warn!(uri = %source, error = %format!("{e:#}"), "Media upload failed, dropping");
                    None
                }
            }
        });
        let uploaded: HashMap<String, Media> = join_all(uploads).await.into_iter().flatten().collect();

        debug!(requested = unique.len(), uploaded = uploaded.len(), "Batch media ingested");

        for feed in feeds.iter_mut() {
            for pending in std::mem::take(&mut feed.pending_media) {
                let Some(media) = uploaded.get(&pending.uri) else {
                    continue;
                };
                feed.content = feed.content.replace(&pending.uri, &media.ipfs_uri);
                if !feed.media.iter().any(|m| m.ipfs_uri == media.ipfs_uri) {
                    feed.media.push(media.clone());
                }
            }
        }
    }
}

/// Distinct pending media across the batch, in first-seen order.
fn unique_media(feeds: &[RawFeed]) -> Vec<PendingMedia> {
    let mut seen = std::collections::HashSet::new();
    feeds
        .iter()
        .flat_map(|f| f.pending_media.iter())
        .filter(|m| seen.insert(m.uri.clone()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingContentStore;
    use chrono::Utc;

    fn feed(guid: &str, content: &str, media: &[&str]) -> RawFeed {
        RawFeed {
            guid: guid.into(),
            published_at: Utc::now(),
            content: content.into(),
            pending_media: media.iter().map(|u| PendingMedia::image(*u)).collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn duplicate_uri_is_uploaded_once_and_rewritten_everywhere() {
        let store = Arc::new(RecordingContentStore::new());
        let ingestor = MediaIngestor::new(store.clone());
        let mut feeds = vec![
            feed("a", r#"<img src="https://cdn/x.png">"#, &["https://cdn/x.png"]),
            feed("b", r#"<p><img src="https://cdn/x.png"></p>"#, &["https://cdn/x.png"]),
        ];

        ingestor.ingest(&mut feeds).await;

        assert_eq!(store.upload_count("https://cdn/x.png"), 1);
        let ipfs = feeds[0].media[0].ipfs_uri.clone();
        assert!(feeds[0].content.contains(&ipfs));
        assert!(feeds[1].content.contains(&ipfs));
        assert_eq!(feeds[1].media[0].ipfs_uri, ipfs);
        assert!(feeds.iter().all(|f| f.pending_media.is_empty()));
    }

    #[tokio::test]
    async fn failed_upload_is_dropped_without_failing_batch() {
        let store = Arc::new(RecordingContentStore::new().failing_on("https://cdn/bad.png"));
        let ingestor = MediaIngestor::new(store.clone());
        let mut feeds = vec![feed(
            "a",
            "body",
            &["https://cdn/bad.png", "https://cdn/good.png"],
        )];

        ingestor.ingest(&mut feeds).await;

        assert_eq!(feeds[0].media.len(), 1);
        assert_eq!(feeds[0].media[0].original_uri, "https://cdn/good.png");
    }

    #[tokio::test]
    async fn escaped_uri_is_uploaded_unescaped_and_replaced_raw() {
        let store = Arc::new(RecordingContentStore::new());
        let ingestor = MediaIngestor::new(store.clone());
        let raw = "https://cdn/x.png?a=1&amp;b=2";
        let mut feeds = vec![feed("a", &format!(r#"<img src="{raw}">"#), &[raw])];

        ingestor.ingest(&mut feeds).await;

        assert_eq!(store.upload_count("https://cdn/x.png?a=1&b=2"), 1);
        assert!(!feeds[0].content.contains(raw));
        assert_eq!(feeds[0].media[0].original_uri, "https://cdn/x.png?a=1&b=2");
    }
}
