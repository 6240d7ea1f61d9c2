// Trait seams for everything the worker talks to over the network.
//
// FeedFetcher: raw GET of a platform collect link.
// ContentStore: content-addressed uploads (IPFS relay).
// NoteIndexer: read-only lookups of already-confirmed notes.
// NoteContract: operator permission check and note submission.
//
// Concrete clients implement these directly; `testing` provides in-memory
// mocks so adapters, media ingestion and the publisher run without a network.

use anyhow::{Context, Result};
use async_trait::async_trait;

use crossbell_client::{ContractClient, IndexedNote, IndexerClient, PostedNote};
use ipfs_client::{IpfsClient, UploadedBytes};
use xsync_common::Media;

// ---------------------------------------------------------------------------
// FeedFetcher
// ---------------------------------------------------------------------------

#[async_trait]
pub trait FeedFetcher: Send + Sync {
    /// Fetch the raw body behind a collect link.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// reqwest-backed fetcher. No request timeout is set: a stuck platform call
/// keeps its governor slot until the connection resolves.
pub struct HttpFeedFetcher {
    client: reqwest::Client,
}

impl HttpFeedFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("xsync-worker/0.1")
            .build()
            .context("Failed to build feed HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Feed request failed: {url}"))?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("Feed request returned {status}: {url}");
        }

        let bytes = resp.bytes().await.context("Failed to read feed body")?;
        Ok(bytes.to_vec())
    }
}

// ---------------------------------------------------------------------------
// ContentStore
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store raw bytes; returns the content-addressed URI and hash.
    async fn upload_bytes(&self, data: Vec<u8>, hint_name: &str) -> Result<UploadedBytes>;

    /// Fetch a remote file into storage and describe the stored object.
    async fn upload_from_url(&self, uri: &str, is_video: bool) -> Result<Media>;
}

#[async_trait]
impl ContentStore for IpfsClient {
    async fn upload_bytes(&self, data: Vec<u8>, hint_name: &str) -> Result<UploadedBytes> {
        Ok(IpfsClient::upload_bytes(self, data, hint_name).await?)
    }

    async fn upload_from_url(&self, uri: &str, is_video: bool) -> Result<Media> {
        let uploaded = IpfsClient::upload_from_url(self, uri, is_video).await?;
        Ok(Media {
            original_uri: uri.to_string(),
            additional_props: uploaded.additional_props_json(),
            ipfs_uri: uploaded.url,
            file_name: uploaded.file_name,
            file_size: uploaded.file_size,
            content_type: uploaded.content_type,
        })
    }
}

// ---------------------------------------------------------------------------
// NoteIndexer
// ---------------------------------------------------------------------------

#[async_trait]
pub trait NoteIndexer: Send + Sync {
    async fn lookup_by_link(&self, link: &str) -> Result<Option<IndexedNote>>;
}

#[async_trait]
impl NoteIndexer for IndexerClient {
    async fn lookup_by_link(&self, link: &str) -> Result<Option<IndexedNote>> {
        Ok(IndexerClient::lookup_by_link(self, link).await?)
    }
}

// ---------------------------------------------------------------------------
// NoteContract
// ---------------------------------------------------------------------------

#[async_trait]
pub trait NoteContract: Send + Sync {
    /// Whether the configured operator may post for `character_id`.
    async fn check_operator_permission(&self, character_id: i64) -> Result<bool>;

    async fn post_note(
        &self,
        character_id: i64,
        content_uri: &str,
        for_note: Option<(i64, i64)>,
    ) -> Result<PostedNote>;
}

#[async_trait]
impl NoteContract for ContractClient {
    async fn check_operator_permission(&self, character_id: i64) -> Result<bool> {
        Ok(ContractClient::check_operator_permission(self, character_id).await?)
    }

    async fn post_note(
        &self,
        character_id: i64,
        content_uri: &str,
        for_note: Option<(i64, i64)>,
    ) -> Result<PostedNote> {
        Ok(ContractClient::post_note(self, character_id, content_uri, for_note).await?)
    }
}
