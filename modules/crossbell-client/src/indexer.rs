// Read-only indexer over confirmed Crossbell data. Used to find notes that
// already carry a given external link.

use serde::Deserialize;

use crate::error::{CrossbellError, Result};

/// An already-confirmed note as reported by the indexer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedNote {
    pub character_id: i64,
    pub note_id: i64,
    /// Content URI of the note metadata.
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub transaction_hash: String,
}

#[derive(Debug, Deserialize)]
struct NoteList {
    #[serde(default)]
    list: Vec<IndexedNote>,
}

pub struct IndexerClient {
    client: reqwest::Client,
    endpoint: String,
}

impl IndexerClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }

    /// Find the note whose external URL is `link`, if one has been indexed.
    pub async fn lookup_by_link(&self, link: &str) -> Result<Option<IndexedNote>> {
        let url = format!("{}/v1/notes", self.endpoint);
        let resp = self
            .client
            .get(&url)
            .query(&[("externalUrl", link), ("limit", "1")])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CrossbellError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let notes: NoteList = resp.json().await?;
        let found = notes.list.into_iter().next();
        tracing::debug!(link, found = found.is_some(), "Indexer lookup");
        Ok(found)
    }
}
