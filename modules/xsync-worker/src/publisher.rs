//! On-chain publisher.
//!
//! Turns an [`OnChainRequest`] into a note: skips work the indexer already
//! knows about, resolves reply/quote targets to existing notes, builds the
//! note metadata, stores it, and submits the transaction.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use spider_transformations::transformation::content::{
    transform_content_input, ReturnFormat, TransformConfig, TransformInput,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crossbell_client::{ContractClient, IndexerClient};
use ipfs_client::IpfsClient;
use xsync_common::{
    platform, AttachmentDimensions, ErrorCode, Media, OnChainRequest, Platform, PublisherConfig,
};

use crate::traits::{ContentStore, NoteContract, NoteIndexer};

/// What is known about a note after a publish attempt. On failure only the
/// fields reached before the failing step are set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteReceipt {
    pub ipfs_uri: String,
    pub transaction: String,
    pub note_character_id: i64,
    pub note_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct PublishError {
    pub code: ErrorCode,
    pub message: String,
    pub receipt: NoteReceipt,
}

impl PublishError {
    fn new(code: ErrorCode, message: impl Into<String>, receipt: NoteReceipt) -> Self {
        Self {
            code,
            message: message.into(),
            receipt,
        }
    }
}

#[async_trait]
pub trait NotePublisher: Send + Sync {
    async fn publish(&self, request: &OnChainRequest) -> Result<NoteReceipt, PublishError>;

    /// Whether notes may currently be posted for `character_id`.
    async fn can_post_for(&self, character_id: i64) -> anyhow::Result<bool>;
}

// --- Note metadata ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoteMetadata {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub authors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub sources: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_published: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub external_urls: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<NoteAttachment>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoteAttachment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub size_in_bytes: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

impl NoteMetadata {
    pub fn build(
        request: &OnChainRequest,
        platform: &Platform,
        dimensions: AttachmentDimensions,
    ) -> Self {
        let mut authors = request.authors.clone();
        authors.push(format!(
            "csb://account:{}@{}",
            request.username, request.platform
        ));

        let content = if platform.html_to_markdown {
            html_to_markdown(&request.content, &request.link)
        } else {
            request.content.clone()
        };

        let attachments = if platform.media_attachments {
            request
                .media
                .iter()
                .map(|m| NoteAttachment::from_media(m, dimensions))
                .collect()
        } else {
            Vec::new()
        };

        Self {
            kind: "note",
            authors,
            title: non_empty(&request.title),
            content: non_empty(&content),
            tags: request.categories.clone(),
            sources: vec!["xSync".to_string(), platform.name.to_string()],
            content_warning: request.content_warning.as_deref().and_then(non_empty),
            date_published: Some(request.published_at.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
            external_urls: if is_web_url(&request.link) {
                vec![request.link.clone()]
            } else {
                Vec::new()
            },
            attachments,
        }
    }
}

impl NoteAttachment {
    fn from_media(media: &Media, dimensions: AttachmentDimensions) -> Self {
        let mut attachment = Self {
            name: non_empty(&media.file_name),
            address: non_empty(&media.ipfs_uri),
            mime_type: non_empty(&media.content_type),
            size_in_bytes: media.file_size,
            alt: non_empty(&media.file_name),
            width: None,
            height: None,
        };

        let props: serde_json::Map<String, serde_json::Value> =
            match serde_json::from_str(&media.additional_props) {
                Ok(props) => props,
                Err(e) => {
                    if !media.additional_props.is_empty() {
                        warn!(ipfs_uri = %media.ipfs_uri, error = %e, "Unreadable media props");
                    }
                    return attachment;
                }
            };

        if let Some(width) = dimension(&props, "width", &media.ipfs_uri) {
            attachment.width = Some(width);
        }
        if let Some(height) = dimension(&props, "height", &media.ipfs_uri) {
            match dimensions {
                // Historical mapping: the parsed height overwrote the width.
                AttachmentDimensions::Legacy => attachment.width = Some(height),
                AttachmentDimensions::Corrected => attachment.height = Some(height),
            }
        }
        attachment
    }
}

fn dimension(
    props: &serde_json::Map<String, serde_json::Value>,
    key: &str,
    ipfs_uri: &str,
) -> Option<u32> {
    let value = props.get(key)?;
    let parsed = match value {
        serde_json::Value::String(s) => s.trim().parse::<u32>().ok(),
        serde_json::Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        _ => None,
    };
    if parsed.is_none() {
        warn!(ipfs_uri, key, value = %value, "Unparseable media dimension");
    }
    parsed
}

/// Rich markup to markdown. Empty output for non-empty input counts as a
/// failed conversion and the raw content is kept.
fn html_to_markdown(html: &str, link: &str) -> String {
    if html.trim().is_empty() {
        return html.to_string();
    }
    let parsed_url = url::Url::parse(link).ok();
    let config = TransformConfig {
        readability: false,
        main_content: false,
        return_format: ReturnFormat::Markdown,
        filter_images: false,
        filter_svg: true,
        clean_html: false,
    };
    let input = TransformInput {
        url: parsed_url.as_ref(),
        content: html.as_bytes(),
        screenshot_bytes: None,
        encoding: None,
        selector_config: None,
        ignore_tags: None,
    };

    let markdown = transform_content_input(input, &config);
    if markdown.trim().is_empty() {
        warn!(link, "Markdown conversion produced nothing, keeping raw content");
        html.to_string()
    } else {
        markdown.trim().to_string()
    }
}

fn is_web_url(raw: &str) -> bool {
    url::Url::parse(raw)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

// --- Publisher ---

pub struct OnChainPublisher {
    store: Arc<dyn ContentStore>,
    indexer: Arc<dyn NoteIndexer>,
    contract: Arc<dyn NoteContract>,
    dimensions: AttachmentDimensions,
}

impl OnChainPublisher {
    pub fn new(
        store: Arc<dyn ContentStore>,
        indexer: Arc<dyn NoteIndexer>,
        contract: Arc<dyn NoteContract>,
        dimensions: AttachmentDimensions,
    ) -> Self {
        Self {
            store,
            indexer,
            contract,
            dimensions,
        }
    }

    /// Publisher backed by the real relay, indexer and contract endpoints.
    pub fn from_config(config: &PublisherConfig) -> Self {
        Self::new(
            Arc::new(IpfsClient::new(&config.ipfs_relay_endpoint)),
            Arc::new(IndexerClient::new(&config.indexer_endpoint)),
            Arc::new(ContractClient::new(
                &config.contract_rpc_endpoint,
                &config.operator_address,
            )),
            config.attachment_dimensions,
        )
    }

    /// Receipt of a confirmed note that already carries `link`.
    async fn already_posted(&self, link: &str) -> Option<NoteReceipt> {
        if !is_web_url(link) {
            return None;
        }
        match self.indexer.lookup_by_link(link).await {
            Ok(Some(note)) if !note.uri.is_empty() && !note.transaction_hash.is_empty() => {
                Some(NoteReceipt {
                    ipfs_uri: note.uri,
                    transaction: note.transaction_hash,
                    note_character_id: note.character_id,
                    note_id: note.note_id,
                })
            }
            Ok(_) => None,
            Err(e) => {
                warn!(link, error = %format!("{e:#}"), "Indexer lookup failed, publishing anyway");
                None
            }
        }
    }

    /// Target note for a reply or quote, if it lives on chain.
    async fn resolve_target(&self, request: &OnChainRequest) -> Option<(i64, i64)> {
        if let (Some(c), Some(n)) = (request.for_character_id, request.for_note_id) {
            if c > 0 && n > 0 {
                return Some((c, n));
            }
        }
        let for_uri = request.for_uri.as_deref().filter(|u| is_web_url(u))?;
        match self.indexer.lookup_by_link(for_uri).await {
            Ok(Some(note)) if note.character_id > 0 && note.note_id > 0 => {
                Some((note.character_id, note.note_id))
            }
            Ok(_) => None,
            Err(e) => {
                warn!(for_uri, error = %format!("{e:#}"), "Target lookup failed, posting as plain note");
                None
            }
        }
    }
}

#[async_trait]
impl NotePublisher for OnChainPublisher {
    async fn publish(&self, request: &OnChainRequest) -> Result<NoteReceipt, PublishError> {
        if let Some(receipt) = self.already_posted(&request.link).await {
            info!(link = %request.link, tx = %receipt.transaction, "Already on chain, skipping");
            return Ok(receipt);
        }

        let target = self.resolve_target(request).await;

        let platform = platform(&request.platform).ok_or_else(|| {
            PublishError::new(
                ErrorCode::UnsupportedPlatform,
                format!("Unsupported platform: {}", request.platform),
                NoteReceipt::default(),
            )
        })?;

        let metadata = NoteMetadata::build(request, platform, self.dimensions);
        let bytes = serde_json::to_vec(&metadata).map_err(|e| {
            PublishError::new(ErrorCode::UploadFailed, e.to_string(), NoteReceipt::default())
        })?;

        let uploaded = self
            .store
            .upload_bytes(bytes, "metadata.json")
            .await
            .map_err(|e| {
                PublishError::new(ErrorCode::UploadFailed, format!("{e:#}"), NoteReceipt::default())
            })?;

        let mut receipt = NoteReceipt {
            ipfs_uri: uploaded.url,
            ..Default::default()
        };

        let posted = match self
            .contract
            .post_note(request.character_id, &receipt.ipfs_uri, target)
            .await
        {
            Ok(posted) => posted,
            Err(e) => {
                return Err(PublishError::new(
                    ErrorCode::ChainTransactionFailed,
                    format!("{e:#}"),
                    receipt,
                ))
            }
        };

        receipt.transaction = posted.transaction_hash;
        receipt.note_character_id = posted.character_id;
        receipt.note_id = posted.note_id;

        debug!(
            character_id = request.character_id,
            feed_id = ?request.feed_id,
            tx = %receipt.transaction,
            "Note published"
        );
        Ok(receipt)
    }

    async fn can_post_for(&self, character_id: i64) -> anyhow::Result<bool> {
        self.contract.check_operator_permission(character_id).await
    }
}
