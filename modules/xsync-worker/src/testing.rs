// Test mocks for the worker's trait seams.
//
// - MockFetcher (FeedFetcher): HashMap-based URL→body
// - RecordingContentStore (ContentStore): deterministic URIs, counts uploads
// - MockIndexer (NoteIndexer): HashMap-based link→IndexedNote
// - MockContract (NoteContract): records posted notes, numbers them
// - ScriptedPublisher (NotePublisher): records publish order, fails on chosen links
// - RecordingWorkPublisher (WorkPublisher): collects result messages
//
// Plus builders for work items and feed bodies.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crossbell_client::{IndexedNote, PostedNote};
use ipfs_client::UploadedBytes;
use xsync_common::{ErrorCode, Media, OnChainRequest, WorkDispatched, WorkFailed, WorkSucceeded};

use crate::dispatcher::WorkPublisher;
use crate::publisher::{NotePublisher, NoteReceipt, PublishError};
use crate::traits::{ContentStore, FeedFetcher, NoteContract, NoteIndexer};

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// HashMap-based feed fetcher. Returns `Err` for unregistered URLs.
pub struct MockFetcher {
    bodies: HashMap<String, Vec<u8>>,
    requested: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            bodies: HashMap::new(),
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn on_body(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.bodies.insert(url.to_string(), body.into());
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeedFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.requested.lock().unwrap().push(url.to_string());
        self.bodies
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("MockFetcher: no body registered for {url}"))
    }
}

// ---------------------------------------------------------------------------
// RecordingContentStore
// ---------------------------------------------------------------------------

/// Content store that derives a stable `ipfs://` URI from each source URI and
/// counts how often each was requested.
pub struct RecordingContentStore {
    url_uploads: Mutex<HashMap<String, usize>>,
    byte_uploads: Mutex<Vec<(String, Vec<u8>)>>,
    failing_urls: HashSet<String>,
    fail_bytes: bool,
    props: String,
}

impl RecordingContentStore {
    pub fn new() -> Self {
        Self {
            url_uploads: Mutex::new(HashMap::new()),
            byte_uploads: Mutex::new(Vec::new()),
            failing_urls: HashSet::new(),
            fail_bytes: false,
            props: r#"{"width":"640","height":"480"}"#.to_string(),
        }
    }

    pub fn failing_on(mut self, uri: &str) -> Self {
        self.failing_urls.insert(uri.to_string());
        self
    }

    pub fn failing_bytes(mut self) -> Self {
        self.fail_bytes = true;
        self
    }

    pub fn upload_count(&self, uri: &str) -> usize {
        self.url_uploads.lock().unwrap().get(uri).copied().unwrap_or(0)
    }

    pub fn total_url_uploads(&self) -> usize {
        self.url_uploads.lock().unwrap().values().sum()
    }

    /// Every uploaded blob, decoded as JSON.
    pub fn uploaded_json(&self) -> Vec<serde_json::Value> {
        self.byte_uploads
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, data)| serde_json::from_slice(data).ok())
            .collect()
    }

    pub fn ipfs_uri_for(source: &str) -> String {
        let digest = source
            .bytes()
            .fold(0xcbf29ce484222325u64, |h, b| (h ^ b as u64).wrapping_mul(0x100000001b3));
        format!("ipfs://bafy{digest:016x}")
    }
}

impl Default for RecordingContentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentStore for RecordingContentStore {
    async fn upload_bytes(&self, data: Vec<u8>, hint_name: &str) -> Result<UploadedBytes> {
        if self.fail_bytes {
            bail!("RecordingContentStore: byte uploads disabled");
        }
        let mut uploads = self.byte_uploads.lock().unwrap();
        let n = uploads.len();
        uploads.push((hint_name.to_string(), data));
        Ok(UploadedBytes {
            url: format!("ipfs://bafymeta{n}"),
            cid: format!("bafymeta{n}"),
        })
    }

    async fn upload_from_url(&self, uri: &str, is_video: bool) -> Result<Media> {
        *self
            .url_uploads
            .lock()
            .unwrap()
            .entry(uri.to_string())
            .or_default() += 1;

        if self.failing_urls.contains(uri) {
            bail!("RecordingContentStore: upload of {uri} refused");
        }

        Ok(Media {
            original_uri: uri.to_string(),
            ipfs_uri: Self::ipfs_uri_for(uri),
            file_name: uri.rsplit('/').next().unwrap_or_default().to_string(),
            file_size: 1024,
            content_type: if is_video { "video/mp4" } else { "image/png" }.to_string(),
            additional_props: self.props.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// MockIndexer
// ---------------------------------------------------------------------------

/// HashMap-based indexer. Unregistered links are "not found".
pub struct MockIndexer {
    notes: Mutex<HashMap<String, IndexedNote>>,
    failing: bool,
}

impl MockIndexer {
    pub fn new() -> Self {
        Self {
            notes: Mutex::new(HashMap::new()),
            failing: false,
        }
    }

    pub fn on_link(self, link: &str, note: IndexedNote) -> Self {
        self.notes.lock().unwrap().insert(link.to_string(), note);
        self
    }

    /// Every lookup errors.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// Make `link` visible, as if a posted note had been indexed.
    pub fn index(&self, link: &str, note: IndexedNote) {
        self.notes.lock().unwrap().insert(link.to_string(), note);
    }
}

impl Default for MockIndexer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NoteIndexer for MockIndexer {
    async fn lookup_by_link(&self, link: &str) -> Result<Option<IndexedNote>> {
        if self.failing {
            bail!("MockIndexer: indexer unavailable");
        }
        Ok(self.notes.lock().unwrap().get(link).cloned())
    }
}

// ---------------------------------------------------------------------------
// MockContract
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedCall {
    pub character_id: i64,
    pub content_uri: String,
    pub for_note: Option<(i64, i64)>,
}

/// Contract that accepts every note, numbering them from 1.
pub struct MockContract {
    posted: Mutex<Vec<PostedCall>>,
    next_note_id: AtomicI64,
    denied: HashSet<i64>,
    failing: bool,
}

impl MockContract {
    pub fn new() -> Self {
        Self {
            posted: Mutex::new(Vec::new()),
            next_note_id: AtomicI64::new(1),
            denied: HashSet::new(),
            failing: false,
        }
    }

    /// Operator lacks permission on `character_id`.
    pub fn denying(mut self, character_id: i64) -> Self {
        self.denied.insert(character_id);
        self
    }

    /// Every post reverts.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn posted(&self) -> Vec<PostedCall> {
        self.posted.lock().unwrap().clone()
    }
}

impl Default for MockContract {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NoteContract for MockContract {
    async fn check_operator_permission(&self, character_id: i64) -> Result<bool> {
        Ok(!self.denied.contains(&character_id))
    }

    async fn post_note(
        &self,
        character_id: i64,
        content_uri: &str,
        for_note: Option<(i64, i64)>,
    ) -> Result<PostedNote> {
        if self.failing {
            bail!("MockContract: execution reverted");
        }
        self.posted.lock().unwrap().push(PostedCall {
            character_id,
            content_uri: content_uri.to_string(),
            for_note,
        });
        let note_id = self.next_note_id.fetch_add(1, Ordering::SeqCst);
        Ok(PostedNote {
            transaction_hash: format!("0xtx{note_id}"),
            character_id,
            note_id,
        })
    }
}

// ---------------------------------------------------------------------------
// ScriptedPublisher
// ---------------------------------------------------------------------------

/// Publisher that succeeds unless the request's link was marked failing.
/// Records the links it was asked to publish, in order.
pub struct ScriptedPublisher {
    failing_links: Mutex<HashSet<String>>,
    denied: HashSet<i64>,
    published: Mutex<Vec<String>>,
    next_note_id: AtomicI64,
}

impl ScriptedPublisher {
    pub fn new() -> Self {
        Self {
            failing_links: Mutex::new(HashSet::new()),
            denied: HashSet::new(),
            published: Mutex::new(Vec::new()),
            next_note_id: AtomicI64::new(1),
        }
    }

    pub fn failing_on(self, link: &str) -> Self {
        self.failing_links.lock().unwrap().insert(link.to_string());
        self
    }

    pub fn denying(mut self, character_id: i64) -> Self {
        self.denied.insert(character_id);
        self
    }

    /// Let a previously failing link succeed from now on.
    pub fn heal(&self, link: &str) {
        self.failing_links.lock().unwrap().remove(link);
    }

    pub fn published(&self) -> Vec<String> {
        self.published.lock().unwrap().clone()
    }
}

impl Default for ScriptedPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotePublisher for ScriptedPublisher {
    async fn publish(&self, request: &OnChainRequest) -> Result<NoteReceipt, PublishError> {
        self.published.lock().unwrap().push(request.link.clone());
        let ipfs_uri = format!("ipfs://bafymeta-{}", request.link);
        if self.failing_links.lock().unwrap().contains(&request.link) {
            return Err(PublishError {
                code: ErrorCode::ChainTransactionFailed,
                message: format!("ScriptedPublisher: {} reverted", request.link),
                receipt: NoteReceipt {
                    ipfs_uri,
                    ..Default::default()
                },
            });
        }
        let note_id = self.next_note_id.fetch_add(1, Ordering::SeqCst);
        Ok(NoteReceipt {
            ipfs_uri,
            transaction: format!("0xtx{note_id}"),
            note_character_id: request.character_id,
            note_id,
        })
    }

    async fn can_post_for(&self, character_id: i64) -> Result<bool> {
        Ok(!self.denied.contains(&character_id))
    }
}

// ---------------------------------------------------------------------------
// RecordingWorkPublisher
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingWorkPublisher {
    succeeded: Mutex<Vec<WorkSucceeded>>,
    failed: Mutex<Vec<WorkFailed>>,
}

impl RecordingWorkPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn succeeded(&self) -> Vec<WorkSucceeded> {
        self.succeeded.lock().unwrap().clone()
    }

    pub fn failed(&self) -> Vec<WorkFailed> {
        self.failed.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkPublisher for RecordingWorkPublisher {
    async fn work_succeeded(&self, msg: &WorkSucceeded) -> Result<()> {
        self.succeeded.lock().unwrap().push(msg.clone());
        Ok(())
    }

    async fn work_failed(&self, msg: &WorkFailed) -> Result<()> {
        self.failed.lock().unwrap().push(msg.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Work item for `platform`/`alice` with verify key `csb:xyz123` and the given window.
pub fn work_item(platform: &str, drop_before: DateTime<Utc>, drop_after: DateTime<Utc>) -> WorkDispatched {
    WorkDispatched {
        account_id: 7,
        platform: platform.to_string(),
        username: "alice".to_string(),
        verify_key: "csb:xyz123".to_string(),
        character_id: 42,
        on_chain: true,
        drop_before,
        drop_after,
        dispatch_at: drop_after,
    }
}

/// One `<item>` of an RSS 2.0 channel.
pub struct RssItem<'a> {
    pub title: &'a str,
    pub link: &'a str,
    pub published_at: DateTime<Utc>,
    pub description: &'a str,
    pub content: &'a str,
}

/// RSS 2.0 document with `description` as the channel bio.
pub fn rss_channel(description: &str, items: &[RssItem<'_>]) -> String {
    let mut body = String::new();
    for item in items {
        body.push_str(&format!(
            "<item><title>{}</title><link>{}</link><guid>{}</guid><pubDate>{}</pubDate>\
             <description><![CDATA[{}]]></description>\
             <content:encoded><![CDATA[{}]]></content:encoded></item>",
            item.title,
            item.link,
            item.link,
            item.published_at.to_rfc2822(),
            item.description,
            item.content,
        ));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/"><channel><title>feed</title><link>https://example.com</link><description>{description}</description>{body}</channel></rss>"#
    )
}
