//! Persistence for accounts, characters, feeds and media.
//!
//! [`SyncStore`] covers single-statement reads and writes; [`StoreTx`] is a
//! unit of work that either commits as a whole or leaves nothing behind.

mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use xsync_common::{FeedRecord, Media, RawFeed};
use xsync_worker::NoteReceipt;

pub use postgres::PgStore;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Account not found: {0}")]
    AccountNotFound(i64),

    #[error("Store rejected write: {0}")]
    Rejected(String),
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: i64,
    pub character_id: i64,
    pub platform: String,
    pub username: String,
    pub verify_key: Option<String>,
    pub last_updated: DateTime<Utc>,
    pub update_interval: Duration,
    pub next_update: DateTime<Utc>,
    pub is_on_chain_paused: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Character {
    pub character_id: i64,
    /// Cumulative bytes of media first stored for this character.
    pub media_usage: i64,
}

/// A feed about to be persisted from a work-succeeded batch.
#[derive(Debug, Clone)]
pub struct NewFeed<'a> {
    pub account_id: i64,
    pub platform: &'a str,
    pub collected_at: DateTime<Utc>,
    pub feed: &'a RawFeed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredFeed {
    pub id: i64,
    pub account_id: i64,
    pub platform: String,
    pub collected_at: DateTime<Utc>,
    pub title: String,
    pub link: String,
    pub guid: String,
    pub authors: Vec<String>,
    pub categories: Vec<String>,
    pub published_at: DateTime<Utc>,
    pub content: String,
    pub content_warning: Option<String>,
    pub for_uri: Option<String>,
    /// Content-addressed URIs of the feed's media, in attachment order.
    pub media_ipfs_uris: Vec<String>,
    pub ipfs_uri: Option<String>,
    pub transaction: Option<String>,
    pub note_character_id: Option<i64>,
    pub note_id: Option<i64>,
}

impl StoredFeed {
    pub fn is_on_chain(&self) -> bool {
        self.transaction.as_deref().is_some_and(|tx| !tx.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredMedia {
    pub id: i64,
    pub character_id: i64,
    pub media: Media,
    pub related_feeds: Vec<FeedRecord>,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

#[async_trait]
pub trait SyncStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>>;

    async fn account(&self, account_id: i64) -> Result<Option<Account>>;

    async fn character(&self, character_id: i64) -> Result<Option<Character>>;

    async fn paused_accounts(&self) -> Result<Vec<Account>>;

    /// Accounts whose `next_update` is at or before `now`.
    async fn due_accounts(&self, now: DateTime<Utc>) -> Result<Vec<Account>>;

    /// Push `next_update` forward without touching the interval.
    async fn lease_account(&self, account_id: i64, next_update: DateTime<Utc>) -> Result<()>;

    async fn set_paused(&self, account_id: i64, paused: bool) -> Result<()>;

    /// Feeds of `account_id` without a transaction, earliest publish time
    /// first, ties broken by id.
    async fn pending_feeds(&self, account_id: i64) -> Result<Vec<StoredFeed>>;

    /// Feeds of `account_id` in insertion order.
    async fn feeds(&self, account_id: i64) -> Result<Vec<StoredFeed>>;

    /// Media for the given URIs, in the order given. Unknown URIs are skipped.
    async fn medias_by_uris(&self, ipfs_uris: &[String]) -> Result<Vec<Media>>;

    async fn media_by_ipfs_uri(&self, ipfs_uri: &str) -> Result<Option<StoredMedia>>;

    /// Attach a confirmed note to a pending feed.
    async fn record_publish(&self, feed_id: i64, receipt: &NoteReceipt) -> Result<()>;

    /// Keep the metadata URI of a failed attempt; the transaction stays empty.
    async fn record_publish_failure(&self, feed_id: i64, ipfs_uri: &str) -> Result<()>;
}

#[async_trait]
pub trait StoreTx: Send {
    async fn insert_feed(&mut self, feed: NewFeed<'_>) -> Result<i64>;

    async fn media_by_ipfs_uri(&mut self, ipfs_uri: &str) -> Result<Option<StoredMedia>>;

    async fn insert_media(
        &mut self,
        character_id: i64,
        media: &Media,
        related_feeds: &[FeedRecord],
    ) -> Result<i64>;

    async fn add_media_feeds(&mut self, media_id: i64, related_feeds: &[FeedRecord]) -> Result<()>;

    /// Write the account's schedule. `is_on_chain_paused` is only ever
    /// raised here; a pause already stored is kept. Returns the stored flag.
    async fn save_account(&mut self, account: &Account) -> Result<bool>;

    /// Add `bytes` to the character's media usage, creating the character if needed.
    async fn save_character(&mut self, character_id: i64, added_bytes: i64) -> Result<()>;

    /// Dropping a transaction without committing rolls it back.
    async fn commit(self: Box<Self>) -> Result<()>;
}
