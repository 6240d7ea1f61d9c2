// Invalidation of the read caches kept by the public API. Writers only ever
// delete keys; readers rebuild them on miss.

use anyhow::{Context, Result};
use async_trait::async_trait;
use deadpool_redis::redis::AsyncCommands;
use deadpool_redis::{Config, Pool, Runtime};

/// Cache keys derived from persisted state.
pub mod keys {
    /// Accounts bound to a character.
    pub fn accounts(character_id: i64) -> String {
        format!("xsync:accounts:{character_id}")
    }

    /// Feed list of one account.
    pub fn feeds(account_id: i64) -> String {
        format!("xsync:feeds:{account_id}")
    }

    /// Media list of a character.
    pub fn medias(character_id: i64) -> String {
        format!("xsync:medias:{character_id}")
    }

    /// Everything a change to one account's feeds makes stale.
    pub fn for_account(character_id: i64, account_id: i64) -> Vec<String> {
        vec![accounts(character_id), feeds(account_id), medias(character_id)]
    }
}

#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn invalidate(&self, keys: &[String]) -> Result<()>;
}

pub struct RedisCache {
    pool: Pool,
}

impl RedisCache {
    pub fn connect(redis_url: &str) -> Result<Self> {
        let pool = Config::from_url(redis_url)
            .create_pool(Some(Runtime::Tokio1))
            .context("Failed to create Redis pool")?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl CacheInvalidator for RedisCache {
    async fn invalidate(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.pool.get().await.context("Redis pool exhausted")?;
        conn.del::<_, ()>(keys).await.context("Redis DEL failed")?;
        tracing::debug!(?keys, "Cache invalidated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_keys_cover_summary_feeds_and_media() {
        assert_eq!(
            keys::for_account(42, 7),
            vec![
                "xsync:accounts:42".to_string(),
                "xsync:feeds:7".to_string(),
                "xsync:medias:42".to_string(),
            ]
        );
    }
}
