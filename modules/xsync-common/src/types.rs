use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

// --- Bus messages ---

/// One platform-sync task for one bound account. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkDispatched {
    pub account_id: i64,
    pub platform: String,
    pub username: String,
    pub verify_key: String,
    /// Character the account is bound to; notes are posted under it.
    pub character_id: i64,
    /// False while the account is paused; feeds are then collected but not posted.
    #[serde(default)]
    pub on_chain: bool,
    pub drop_before: DateTime<Utc>,
    pub drop_after: DateTime<Utc>,
    pub dispatch_at: DateTime<Utc>,
}

impl WorkDispatched {
    /// Whether a publish timestamp falls strictly inside `(drop_before, drop_after)`.
    pub fn accepts(&self, published_at: DateTime<Utc>) -> bool {
        published_at > self.drop_before && published_at < self.drop_after
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkSucceeded {
    pub account_id: i64,
    pub platform: String,
    pub dispatch_at: DateTime<Utc>,
    pub succeeded_at: DateTime<Utc>,
    /// Smallest gap between consecutive retained entries; `None` when fewer than two.
    #[serde(default, with = "duration_secs_opt")]
    pub new_interval: Option<Duration>,
    pub feeds: Vec<RawFeed>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkFailed {
    pub account_id: i64,
    pub platform: String,
    pub error_code: ErrorCode,
    pub error_message: String,
}

// --- Feed content ---

/// A media reference discovered in feed markup, not yet uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMedia {
    pub uri: String,
    #[serde(default)]
    pub is_video: bool,
}

impl PendingMedia {
    pub fn image(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            is_video: false,
        }
    }

    pub fn video(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            is_video: true,
        }
    }
}

/// Media stored on content-addressed storage. Identity is `ipfs_uri`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    pub original_uri: String,
    pub ipfs_uri: String,
    pub file_name: String,
    pub file_size: i64,
    pub content_type: String,
    /// JSON object of string properties reported by the storage relay (width, height, ...).
    #[serde(default)]
    pub additional_props: String,
}

/// One entry produced by a platform adapter, plus its on-chain outcome once published.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFeed {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    pub guid: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_warning: Option<String>,
    /// Reply / quote target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub for_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_media: Vec<PendingMedia>,
    #[serde(default)]
    pub media: Vec<Media>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipfs_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_character_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_id: Option<i64>,
}

impl RawFeed {
    /// Has this entry been notarized? An empty hash counts as pending.
    pub fn is_on_chain(&self) -> bool {
        self.transaction.as_deref().is_some_and(|tx| !tx.is_empty())
    }
}

/// Everything the publisher needs to post one note.
#[derive(Debug, Clone, PartialEq)]
pub struct OnChainRequest {
    pub character_id: i64,
    pub platform: String,
    pub username: String,
    /// Persisted feed id, for log correlation during recovery.
    pub feed_id: Option<i64>,
    pub title: String,
    pub content: String,
    pub categories: Vec<String>,
    pub authors: Vec<String>,
    pub content_warning: Option<String>,
    pub published_at: DateTime<Utc>,
    pub link: String,
    pub for_uri: Option<String>,
    pub for_character_id: Option<i64>,
    pub for_note_id: Option<i64>,
    pub media: Vec<Media>,
}

impl OnChainRequest {
    pub fn from_feed(character_id: i64, platform: &str, username: &str, feed: &RawFeed) -> Self {
        Self {
            character_id,
            platform: platform.to_string(),
            username: username.to_string(),
            feed_id: None,
            title: feed.title.clone(),
            content: feed.content.clone(),
            categories: feed.categories.clone(),
            authors: feed.authors.clone(),
            content_warning: feed.content_warning.clone(),
            published_at: feed.published_at,
            link: feed.link.clone(),
            for_uri: feed.for_uri.clone(),
            for_character_id: None,
            for_note_id: None,
            media: feed.media.clone(),
        }
    }
}

/// Back-reference from a media record to a persisted feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedRecord {
    pub platform: String,
    pub id: i64,
}

/// Serialize an optional `Duration` as whole seconds.
pub mod duration_secs_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}
