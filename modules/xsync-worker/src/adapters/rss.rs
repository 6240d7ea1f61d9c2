// RSS/Atom parsing shared by the feed-based adapters, plus the JSON Feed
// shape RSSHub emits for Twitter (feed-rs drops its `_extra` block).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::format_author;

/// Channel-level text plus entries, normalized from RSS or Atom.
pub(crate) struct ParsedChannel {
    /// Channel description (RSS) or subtitle (Atom); carries the verify key.
    pub description: String,
    pub entries: Vec<ParsedEntry>,
}

#[derive(Debug)]
pub(crate) struct ParsedEntry {
    pub title: String,
    pub link: String,
    pub guid: String,
    pub authors: Vec<String>,
    pub categories: Vec<String>,
    pub published_at: DateTime<Utc>,
    /// Full body (`content:encoded` / Atom content), falling back to the summary.
    pub content: String,
    /// Summary / RSS item description.
    pub summary: String,
}

pub(crate) fn parse_channel(bytes: &[u8]) -> Result<ParsedChannel> {
    let feed = feed_rs::parser::parse(bytes).context("Failed to parse RSS/Atom feed")?;

    let description = feed
        .description
        .map(|t| t.content)
        .unwrap_or_default();

    let entries = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            // Entries without a date cannot be placed in the window.
            let published_at = entry.published.or(entry.updated)?;

            let link = entry
                .links
                .first()
                .map(|l| l.href.clone())
                .or_else(|| entry.id.starts_with("http").then(|| entry.id.clone()))
                .unwrap_or_default();

            let summary = entry.summary.map(|t| t.content).unwrap_or_default();
            let content = entry
                .content
                .and_then(|c| c.body)
                .filter(|b| !b.is_empty())
                .unwrap_or_else(|| summary.clone());

            Some(ParsedEntry {
                title: entry.title.map(|t| t.content).unwrap_or_default(),
                guid: if entry.id.is_empty() { link.clone() } else { entry.id },
                link,
                authors: entry
                    .authors
                    .iter()
                    .map(|p| format_author(&p.name, p.email.as_deref()))
                    .collect(),
                categories: entry
                    .categories
                    .into_iter()
                    .map(|c| c.label.unwrap_or(c.term))
                    .collect(),
                published_at: published_at.with_timezone(&Utc),
                content,
                summary,
            })
        })
        .collect();

    Ok(ParsedChannel {
        description,
        entries,
    })
}

// --- JSON Feed (RSSHub `?format=json`) ---

#[derive(Debug, Deserialize)]
pub(crate) struct JsonFeed {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub items: Vec<JsonFeedItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JsonFeedItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content_html: String,
    pub date_published: Option<DateTime<Utc>>,
    #[serde(default)]
    pub authors: Vec<JsonFeedAuthor>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, rename = "_extra")]
    pub extra: Option<JsonFeedExtra>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JsonFeedAuthor {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct JsonFeedExtra {
    #[serde(default)]
    pub links: Vec<JsonFeedLink>,
}

/// A related item RSSHub attaches to a tweet.
#[derive(Debug, Deserialize)]
pub(crate) struct JsonFeedLink {
    #[serde(default)]
    pub url: String,
    /// `repost`, `quote` or `reply`.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Markup of the linked item as embedded in the parent's content.
    #[serde(default)]
    pub content_html: Option<String>,
}

pub(crate) fn parse_json_feed(bytes: &[u8]) -> Result<JsonFeed> {
    serde_json::from_slice(bytes).context("Failed to parse JSON feed")
}
