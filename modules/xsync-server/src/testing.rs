// Test doubles for the server's trait seams.
//
// - MemoryStore (SyncStore): in-memory tables, transactional, with failure injection
// - RecordingCache (CacheInvalidator): records invalidated keys
// - RecordingDispatchPublisher (DispatchPublisher): collects dispatched work
//
// Plus builders for accounts and work batches.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use xsync_common::{FeedRecord, Media, RawFeed, WorkDispatched, WorkSucceeded};
use xsync_worker::NoteReceipt;

use crate::cache::CacheInvalidator;
use crate::dispatch::DispatchPublisher;
use crate::store::{
    Account, Character, NewFeed, Result, StoreError, StoreTx, StoredFeed, StoredMedia, SyncStore,
};

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Transaction step that [`MemoryStore::fail_on`] can reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailStep {
    InsertFeed,
    InsertMedia,
    AddMediaFeeds,
    SaveAccount,
    SaveCharacter,
    Commit,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    accounts: Vec<Account>,
    characters: Vec<Character>,
    feeds: Vec<StoredFeed>,
    medias: Vec<StoredMedia>,
    next_feed_id: i64,
    next_media_id: i64,
}

impl Tables {
    fn account_mut(&mut self, account_id: i64) -> Result<&mut Account> {
        self.accounts
            .iter_mut()
            .find(|a| a.id == account_id)
            .ok_or(StoreError::AccountNotFound(account_id))
    }

    fn pending_feed_mut(&mut self, feed_id: i64) -> Option<&mut StoredFeed> {
        self.feeds
            .iter_mut()
            .find(|f| f.id == feed_id && !f.is_on_chain())
    }
}

/// In-memory store. A transaction works on a private copy of the tables and
/// swaps it in on commit, so an abandoned transaction leaves nothing behind.
/// Transactions are not isolated from each other; tests run them one at a time.
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    fail_on: Arc<Mutex<HashSet<FailStep>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables {
                next_feed_id: 1,
                next_media_id: 1,
                ..Default::default()
            })),
            fail_on: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn with_account(self, account: Account) -> Self {
        self.tables.lock().unwrap().accounts.push(account);
        self
    }

    /// Seed a persisted feed for `account_id`. Returns its id.
    pub fn seed_feed(&self, account_id: i64, platform: &str, feed: &RawFeed) -> i64 {
        let mut tables = self.tables.lock().unwrap();
        let id = tables.next_feed_id;
        tables.next_feed_id += 1;
        tables.feeds.push(stored_feed(
            id,
            NewFeed {
                account_id,
                platform,
                collected_at: feed.published_at,
                feed,
            },
        ));
        id
    }

    /// Seed a media record with no related feeds.
    pub fn seed_media(&self, character_id: i64, media: Media) {
        let mut tables = self.tables.lock().unwrap();
        let id = tables.next_media_id;
        tables.next_media_id += 1;
        tables.medias.push(StoredMedia {
            id,
            character_id,
            media,
            related_feeds: Vec::new(),
        });
    }

    /// Reject `step` in every transaction from now on.
    pub fn fail_on(&self, step: FailStep) {
        self.fail_on.lock().unwrap().insert(step);
    }

    pub fn clear_failures(&self) {
        self.fail_on.lock().unwrap().clear();
    }

    pub fn account_snapshot(&self, account_id: i64) -> Option<Account> {
        let tables = self.tables.lock().unwrap();
        tables.accounts.iter().find(|a| a.id == account_id).cloned()
    }

    pub fn all_feeds(&self) -> Vec<StoredFeed> {
        self.tables.lock().unwrap().feeds.clone()
    }

    pub fn all_medias(&self) -> Vec<StoredMedia> {
        self.tables.lock().unwrap().medias.clone()
    }

    pub fn characters(&self) -> Vec<Character> {
        self.tables.lock().unwrap().characters.clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn stored_feed(id: i64, new: NewFeed<'_>) -> StoredFeed {
    let feed = new.feed;
    StoredFeed {
        id,
        account_id: new.account_id,
        platform: new.platform.to_string(),
        collected_at: new.collected_at,
        title: feed.title.clone(),
        link: feed.link.clone(),
        guid: feed.guid.clone(),
        authors: feed.authors.clone(),
        categories: feed.categories.clone(),
        published_at: feed.published_at,
        content: feed.content.clone(),
        content_warning: feed.content_warning.clone(),
        for_uri: feed.for_uri.clone(),
        media_ipfs_uris: feed.media.iter().map(|m| m.ipfs_uri.clone()).collect(),
        ipfs_uri: feed.ipfs_uri.clone(),
        transaction: feed.transaction.clone(),
        note_character_id: feed.note_character_id,
        note_id: feed.note_id,
    }
}

#[async_trait]
impl SyncStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let working = self.tables.lock().unwrap().clone();
        Ok(Box::new(MemoryTx {
            shared: self.tables.clone(),
            fail_on: self.fail_on.lock().unwrap().clone(),
            working,
        }))
    }

    async fn account(&self, account_id: i64) -> Result<Option<Account>> {
        Ok(self.account_snapshot(account_id))
    }

    async fn character(&self, character_id: i64) -> Result<Option<Character>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .characters
            .iter()
            .find(|c| c.character_id == character_id)
            .cloned())
    }

    async fn paused_accounts(&self) -> Result<Vec<Account>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .accounts
            .iter()
            .filter(|a| a.is_on_chain_paused)
            .cloned()
            .collect())
    }

    async fn due_accounts(&self, now: DateTime<Utc>) -> Result<Vec<Account>> {
        let tables = self.tables.lock().unwrap();
        let mut due: Vec<Account> = tables
            .accounts
            .iter()
            .filter(|a| a.next_update <= now)
            .cloned()
            .collect();
        due.sort_by_key(|a| (a.next_update, a.id));
        Ok(due)
    }

    async fn lease_account(&self, account_id: i64, next_update: DateTime<Utc>) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        tables.account_mut(account_id)?.next_update = next_update;
        Ok(())
    }

    async fn set_paused(&self, account_id: i64, paused: bool) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        tables.account_mut(account_id)?.is_on_chain_paused = paused;
        Ok(())
    }

    async fn pending_feeds(&self, account_id: i64) -> Result<Vec<StoredFeed>> {
        let tables = self.tables.lock().unwrap();
        let mut pending: Vec<StoredFeed> = tables
            .feeds
            .iter()
            .filter(|f| f.account_id == account_id && !f.is_on_chain())
            .cloned()
            .collect();
        pending.sort_by_key(|f| (f.published_at, f.id));
        Ok(pending)
    }

    async fn feeds(&self, account_id: i64) -> Result<Vec<StoredFeed>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .feeds
            .iter()
            .filter(|f| f.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn medias_by_uris(&self, ipfs_uris: &[String]) -> Result<Vec<Media>> {
        let tables = self.tables.lock().unwrap();
        Ok(ipfs_uris
            .iter()
            .filter_map(|uri| tables.medias.iter().find(|m| &m.media.ipfs_uri == uri))
            .map(|m| m.media.clone())
            .collect())
    }

    async fn media_by_ipfs_uri(&self, ipfs_uri: &str) -> Result<Option<StoredMedia>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .medias
            .iter()
            .find(|m| m.media.ipfs_uri == ipfs_uri)
            .cloned())
    }

    async fn record_publish(&self, feed_id: i64, receipt: &NoteReceipt) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(feed) = tables.pending_feed_mut(feed_id) {
            feed.ipfs_uri = Some(receipt.ipfs_uri.clone());
            feed.transaction = Some(receipt.transaction.clone());
            feed.note_character_id = Some(receipt.note_character_id);
            feed.note_id = Some(receipt.note_id);
        }
        Ok(())
    }

    async fn record_publish_failure(&self, feed_id: i64, ipfs_uri: &str) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(feed) = tables.pending_feed_mut(feed_id) {
            feed.ipfs_uri = (!ipfs_uri.is_empty()).then(|| ipfs_uri.to_string());
        }
        Ok(())
    }
}

struct MemoryTx {
    shared: Arc<Mutex<Tables>>,
    fail_on: HashSet<FailStep>,
    working: Tables,
}

impl MemoryTx {
    fn check(&self, step: FailStep) -> Result<()> {
        if self.fail_on.contains(&step) {
            return Err(StoreError::Rejected(format!("{step:?} rejected")));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn insert_feed(&mut self, feed: NewFeed<'_>) -> Result<i64> {
        self.check(FailStep::InsertFeed)?;
        let id = self.working.next_feed_id;
        self.working.next_feed_id += 1;
        self.working.feeds.push(stored_feed(id, feed));
        Ok(id)
    }

    async fn media_by_ipfs_uri(&mut self, ipfs_uri: &str) -> Result<Option<StoredMedia>> {
        Ok(self
            .working
            .medias
            .iter()
            .find(|m| m.media.ipfs_uri == ipfs_uri)
            .cloned())
    }

    async fn insert_media(
        &mut self,
        character_id: i64,
        media: &Media,
        related_feeds: &[FeedRecord],
    ) -> Result<i64> {
        self.check(FailStep::InsertMedia)?;
        if self
            .working
            .medias
            .iter()
            .any(|m| m.media.ipfs_uri == media.ipfs_uri)
        {
            return Err(StoreError::Rejected(format!(
                "duplicate media {}",
                media.ipfs_uri
            )));
        }
        let id = self.working.next_media_id;
        self.working.next_media_id += 1;
        self.working.medias.push(StoredMedia {
            id,
            character_id,
            media: media.clone(),
            related_feeds: related_feeds.to_vec(),
        });
        Ok(id)
    }

    async fn add_media_feeds(&mut self, media_id: i64, related_feeds: &[FeedRecord]) -> Result<()> {
        self.check(FailStep::AddMediaFeeds)?;
        if let Some(media) = self.working.medias.iter_mut().find(|m| m.id == media_id) {
            media.related_feeds.extend_from_slice(related_feeds);
        }
        Ok(())
    }

    async fn save_account(&mut self, account: &Account) -> Result<bool> {
        self.check(FailStep::SaveAccount)?;
        let stored = self.working.account_mut(account.id)?;
        let paused = stored.is_on_chain_paused || account.is_on_chain_paused;
        *stored = Account {
            is_on_chain_paused: paused,
            ..account.clone()
        };
        Ok(paused)
    }

    async fn save_character(&mut self, character_id: i64, added_bytes: i64) -> Result<()> {
        self.check(FailStep::SaveCharacter)?;
        match self
            .working
            .characters
            .iter_mut()
            .find(|c| c.character_id == character_id)
        {
            Some(c) => c.media_usage += added_bytes,
            None => self.working.characters.push(Character {
                character_id,
                media_usage: added_bytes,
            }),
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.check(FailStep::Commit)?;
        let MemoryTx {
            shared,
            mut working,
            ..
        } = *self;
        let mut tables = shared.lock().unwrap();
        // Pauses stored after `begin` are kept.
        for account in working.accounts.iter_mut() {
            if tables
                .accounts
                .iter()
                .any(|a| a.id == account.id && a.is_on_chain_paused)
            {
                account.is_on_chain_paused = true;
            }
        }
        *tables = working;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingCache
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingCache {
    invalidated: Mutex<Vec<String>>,
}

impl RecordingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidated(&self) -> Vec<String> {
        self.invalidated.lock().unwrap().clone()
    }
}

#[async_trait]
impl CacheInvalidator for RecordingCache {
    async fn invalidate(&self, keys: &[String]) -> AnyResult<()> {
        self.invalidated.lock().unwrap().extend_from_slice(keys);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingDispatchPublisher
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingDispatchPublisher {
    dispatched: Mutex<Vec<WorkDispatched>>,
    failing_accounts: HashSet<i64>,
}

impl RecordingDispatchPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(mut self, account_id: i64) -> Self {
        self.failing_accounts.insert(account_id);
        self
    }

    pub fn dispatched(&self) -> Vec<WorkDispatched> {
        self.dispatched.lock().unwrap().clone()
    }
}

#[async_trait]
impl DispatchPublisher for RecordingDispatchPublisher {
    async fn dispatch(&self, work: &WorkDispatched) -> AnyResult<()> {
        if self.failing_accounts.contains(&work.account_id) {
            anyhow::bail!("bus unavailable for account {}", work.account_id);
        }
        self.dispatched.lock().unwrap().push(work.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Account 7 of character 42 on `platform`, due at `last_updated`.
pub fn account(platform: &str, last_updated: DateTime<Utc>) -> Account {
    Account {
        id: 7,
        character_id: 42,
        platform: platform.to_string(),
        username: "alice".to_string(),
        verify_key: Some("csb:xyz123".to_string()),
        last_updated,
        update_interval: Duration::from_secs(3600),
        next_update: last_updated,
        is_on_chain_paused: false,
    }
}

/// Feed with `link` as link and guid; on chain when `tx` is given.
pub fn feed(link: &str, published_at: DateTime<Utc>, tx: Option<&str>) -> RawFeed {
    RawFeed {
        title: format!("post {link}"),
        link: link.to_string(),
        guid: link.to_string(),
        published_at,
        content: format!("<p>{link}</p>"),
        ipfs_uri: tx.map(|_| format!("ipfs://bafymeta-{link}")),
        transaction: tx.map(str::to_string),
        note_character_id: tx.map(|_| 42),
        note_id: tx.map(|_| 1),
        ..Default::default()
    }
}

pub fn media(ipfs_uri: &str, file_size: i64) -> Media {
    Media {
        original_uri: format!("https://cdn.example.com/{file_size}.jpg"),
        ipfs_uri: ipfs_uri.to_string(),
        file_name: format!("{file_size}.jpg"),
        file_size,
        content_type: "image/jpeg".to_string(),
        additional_props: r#"{"width":"640","height":"480"}"#.to_string(),
    }
}

/// Work-succeeded batch for account 7.
pub fn batch(
    platform: &str,
    succeeded_at: DateTime<Utc>,
    new_interval: Option<Duration>,
    feeds: Vec<RawFeed>,
) -> WorkSucceeded {
    WorkSucceeded {
        account_id: 7,
        platform: platform.to_string(),
        dispatch_at: succeeded_at,
        succeeded_at,
        new_interval,
        feeds,
    }
}
