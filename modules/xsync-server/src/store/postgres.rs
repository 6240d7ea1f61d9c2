// Postgres implementation of the store traits.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};

use xsync_common::{FeedRecord, Media};
use xsync_worker::NoteReceipt;

use super::{
    Account, Character, NewFeed, Result, StoreError, StoredFeed, StoredMedia, StoreTx, SyncStore,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

const ACCOUNT_COLUMNS: &str = "id, character_id, platform, username, verify_key, last_updated, \
     update_interval_secs, next_update, is_on_chain_paused";

const FEED_COLUMNS: &str = "id, account_id, platform, collected_at, title, link, guid, authors, \
     categories, published_at, content, content_warning, for_uri, media_ipfs_uris, ipfs_uri, \
     transaction_hash, note_character_id, note_id";

const MEDIA_COLUMNS: &str = "id, character_id, ipfs_uri, original_uri, file_name, file_size, \
     content_type, additional_props, related_feeds";

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: i64,
    character_id: i64,
    platform: String,
    username: String,
    verify_key: Option<String>,
    last_updated: DateTime<Utc>,
    update_interval_secs: i64,
    next_update: DateTime<Utc>,
    is_on_chain_paused: bool,
}

impl From<AccountRow> for Account {
    fn from(r: AccountRow) -> Self {
        Self {
            id: r.id,
            character_id: r.character_id,
            platform: r.platform,
            username: r.username,
            verify_key: r.verify_key,
            last_updated: r.last_updated,
            update_interval: Duration::from_secs(r.update_interval_secs.max(0) as u64),
            next_update: r.next_update,
            is_on_chain_paused: r.is_on_chain_paused,
        }
    }
}

#[derive(sqlx::FromRow)]
struct FeedRow {
    id: i64,
    account_id: i64,
    platform: String,
    collected_at: DateTime<Utc>,
    title: String,
    link: String,
    guid: String,
    authors: Vec<String>,
    categories: Vec<String>,
    published_at: DateTime<Utc>,
    content: String,
    content_warning: Option<String>,
    for_uri: Option<String>,
    media_ipfs_uris: Vec<String>,
    ipfs_uri: Option<String>,
    transaction_hash: Option<String>,
    note_character_id: Option<i64>,
    note_id: Option<i64>,
}

impl From<FeedRow> for StoredFeed {
    fn from(r: FeedRow) -> Self {
        Self {
            id: r.id,
            account_id: r.account_id,
            platform: r.platform,
            collected_at: r.collected_at,
            title: r.title,
            link: r.link,
            guid: r.guid,
            authors: r.authors,
            categories: r.categories,
            published_at: r.published_at,
            content: r.content,
            content_warning: r.content_warning,
            for_uri: r.for_uri,
            media_ipfs_uris: r.media_ipfs_uris,
            ipfs_uri: r.ipfs_uri,
            transaction: r.transaction_hash,
            note_character_id: r.note_character_id,
            note_id: r.note_id,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MediaRow {
    id: i64,
    character_id: i64,
    ipfs_uri: String,
    original_uri: String,
    file_name: String,
    file_size: i64,
    content_type: String,
    additional_props: String,
    related_feeds: Json<Vec<FeedRecord>>,
}

impl From<MediaRow> for StoredMedia {
    fn from(r: MediaRow) -> Self {
        Self {
            id: r.id,
            character_id: r.character_id,
            media: Media {
                original_uri: r.original_uri,
                ipfs_uri: r.ipfs_uri,
                file_name: r.file_name,
                file_size: r.file_size,
                content_type: r.content_type,
                additional_props: r.additional_props,
            },
            related_feeds: r.related_feeds.0,
        }
    }
}

fn interval_secs(d: Duration) -> i64 {
    i64::try_from(d.as_secs()).unwrap_or(i64::MAX)
}

// ---------------------------------------------------------------------------
// SyncStore
// ---------------------------------------------------------------------------

#[async_trait]
impl SyncStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn account(&self, account_id: i64) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"
        ))
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Account::from))
    }

    async fn character(&self, character_id: i64) -> Result<Option<Character>> {
        let row = sqlx::query_as::<_, (i64, i64)>(
            "SELECT character_id, media_usage FROM characters WHERE character_id = $1",
        )
        .bind(character_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(character_id, media_usage)| Character {
            character_id,
            media_usage,
        }))
    }

    async fn paused_accounts(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE is_on_chain_paused ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Account::from).collect())
    }

    async fn due_accounts(&self, now: DateTime<Utc>) -> Result<Vec<Account>> {
        let rows = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE next_update <= $1 ORDER BY next_update, id"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Account::from).collect())
    }

    async fn lease_account(&self, account_id: i64, next_update: DateTime<Utc>) -> Result<()> {
        let done = sqlx::query("UPDATE accounts SET next_update = $2 WHERE id = $1")
            .bind(account_id)
            .bind(next_update)
            .execute(&self.pool)
            .await?;
        if done.rows_affected() == 0 {
            return Err(StoreError::AccountNotFound(account_id));
        }
        Ok(())
    }

    async fn set_paused(&self, account_id: i64, paused: bool) -> Result<()> {
        let done = sqlx::query("UPDATE accounts SET is_on_chain_paused = $2 WHERE id = $1")
            .bind(account_id)
            .bind(paused)
            .execute(&self.pool)
            .await?;
        if done.rows_affected() == 0 {
            return Err(StoreError::AccountNotFound(account_id));
        }
        Ok(())
    }

    async fn pending_feeds(&self, account_id: i64) -> Result<Vec<StoredFeed>> {
        let rows = sqlx::query_as::<_, FeedRow>(&format!(
            r#"
            SELECT {FEED_COLUMNS} FROM feeds
            WHERE account_id = $1 AND (transaction_hash IS NULL OR transaction_hash = '')
            ORDER BY published_at ASC, id ASC
            "#
        ))
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(StoredFeed::from).collect())
    }

    async fn feeds(&self, account_id: i64) -> Result<Vec<StoredFeed>> {
        let rows = sqlx::query_as::<_, FeedRow>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds WHERE account_id = $1 ORDER BY id"
        ))
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(StoredFeed::from).collect())
    }

    async fn medias_by_uris(&self, ipfs_uris: &[String]) -> Result<Vec<Media>> {
        if ipfs_uris.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, MediaRow>(&format!(
            "SELECT {MEDIA_COLUMNS} FROM medias WHERE ipfs_uri = ANY($1)"
        ))
        .bind(ipfs_uris)
        .fetch_all(&self.pool)
        .await?;

        let mut found: Vec<StoredMedia> = rows.into_iter().map(StoredMedia::from).collect();
        let mut ordered = Vec::with_capacity(found.len());
        for uri in ipfs_uris {
            if let Some(pos) = found.iter().position(|m| &m.media.ipfs_uri == uri) {
                ordered.push(found.swap_remove(pos).media);
            }
        }
        Ok(ordered)
    }

    async fn media_by_ipfs_uri(&self, ipfs_uri: &str) -> Result<Option<StoredMedia>> {
        let row = sqlx::query_as::<_, MediaRow>(&format!(
            "SELECT {MEDIA_COLUMNS} FROM medias WHERE ipfs_uri = $1"
        ))
        .bind(ipfs_uri)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(StoredMedia::from))
    }

    async fn record_publish(&self, feed_id: i64, receipt: &NoteReceipt) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE feeds
            SET ipfs_uri = $2, transaction_hash = $3, note_character_id = $4, note_id = $5
            WHERE id = $1 AND (transaction_hash IS NULL OR transaction_hash = '')
            "#,
        )
        .bind(feed_id)
        .bind(&receipt.ipfs_uri)
        .bind(&receipt.transaction)
        .bind(receipt.note_character_id)
        .bind(receipt.note_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_publish_failure(&self, feed_id: i64, ipfs_uri: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE feeds SET ipfs_uri = NULLIF($2, '')
            WHERE id = $1 AND (transaction_hash IS NULL OR transaction_hash = '')
            "#,
        )
        .bind(feed_id)
        .bind(ipfs_uri)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// StoreTx
// ---------------------------------------------------------------------------

struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn insert_feed(&mut self, new: NewFeed<'_>) -> Result<i64> {
        let feed = new.feed;
        let media_ipfs_uris: Vec<String> = feed.media.iter().map(|m| m.ipfs_uri.clone()).collect();
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO feeds
                (account_id, platform, collected_at, title, link, guid, authors, categories,
                 published_at, content, content_warning, for_uri, media_ipfs_uris,
                 ipfs_uri, transaction_hash, note_character_id, note_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING id
            "#,
        )
        .bind(new.account_id)
        .bind(new.platform)
        .bind(new.collected_at)
        .bind(&feed.title)
        .bind(&feed.link)
        .bind(&feed.guid)
        .bind(&feed.authors)
        .bind(&feed.categories)
        .bind(feed.published_at)
        .bind(&feed.content)
        .bind(&feed.content_warning)
        .bind(&feed.for_uri)
        .bind(&media_ipfs_uris)
        .bind(&feed.ipfs_uri)
        .bind(&feed.transaction)
        .bind(feed.note_character_id)
        .bind(feed.note_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(id)
    }

    async fn media_by_ipfs_uri(&mut self, ipfs_uri: &str) -> Result<Option<StoredMedia>> {
        let row = sqlx::query_as::<_, MediaRow>(&format!(
            "SELECT {MEDIA_COLUMNS} FROM medias WHERE ipfs_uri = $1 FOR UPDATE"
        ))
        .bind(ipfs_uri)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(StoredMedia::from))
    }

    async fn insert_media(
        &mut self,
        character_id: i64,
        media: &Media,
        related_feeds: &[FeedRecord],
    ) -> Result<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO medias
                (character_id, ipfs_uri, original_uri, file_name, file_size,
                 content_type, additional_props, related_feeds)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(character_id)
        .bind(&media.ipfs_uri)
        .bind(&media.original_uri)
        .bind(&media.file_name)
        .bind(media.file_size)
        .bind(&media.content_type)
        .bind(&media.additional_props)
        .bind(Json(related_feeds))
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(id)
    }

    async fn add_media_feeds(&mut self, media_id: i64, related_feeds: &[FeedRecord]) -> Result<()> {
        sqlx::query("UPDATE medias SET related_feeds = related_feeds || $2 WHERE id = $1")
            .bind(media_id)
            .bind(Json(related_feeds))
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn save_account(&mut self, account: &Account) -> Result<bool> {
        let paused = sqlx::query_scalar::<_, bool>(
            r#"
            UPDATE accounts
            SET last_updated = $2, update_interval_secs = $3, next_update = $4,
                is_on_chain_paused = is_on_chain_paused OR $5
            WHERE id = $1
            RETURNING is_on_chain_paused
            "#,
        )
        .bind(account.id)
        .bind(account.last_updated)
        .bind(interval_secs(account.update_interval))
        .bind(account.next_update)
        .bind(account.is_on_chain_paused)
        .fetch_optional(&mut *self.tx)
        .await?;
        paused.ok_or(StoreError::AccountNotFound(account.id))
    }

    async fn save_character(&mut self, character_id: i64, added_bytes: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO characters (character_id, media_usage) VALUES ($1, $2)
            ON CONFLICT (character_id)
            DO UPDATE SET media_usage = characters.media_usage + EXCLUDED.media_usage
            "#,
        )
        .bind(character_id)
        .bind(added_bytes)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
