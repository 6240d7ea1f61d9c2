pub mod error;
pub mod types;

pub use error::{IpfsError, Result};
pub use types::{UploadedBytes, UploadedFile};

use reqwest::multipart::{Form, Part};
use types::UploadUrlInput;

/// Client for the IPFS upload relay. Uploads are content-addressed, so the
/// same bytes always come back under the same `ipfs://` URI.
pub struct IpfsClient {
    client: reqwest::Client,
    endpoint: String,
}

impl IpfsClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }

    /// Upload raw bytes (e.g. note metadata) under a file name hint.
    pub async fn upload_bytes(&self, data: Vec<u8>, hint_name: &str) -> Result<UploadedBytes> {
        let url = format!("{}/upload", self.endpoint);
        let form = Form::new().part("file", Part::bytes(data).file_name(hint_name.to_string()));

        let resp = self.client.post(&url).multipart(form).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(IpfsError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let uploaded: UploadedBytes = resp.json().await?;
        tracing::debug!(hint_name, uri = %uploaded.url, "Uploaded bytes");
        Ok(uploaded)
    }

    /// Ask the relay to fetch a remote file and store it. Videos are flagged so
    /// the relay keeps the original container.
    pub async fn upload_from_url(&self, uri: &str, is_video: bool) -> Result<UploadedFile> {
        let url = format!("{}/upload/url", self.endpoint);
        let resp = self
            .client
            .post(&url)
            .json(&UploadUrlInput {
                url: uri,
                video: is_video,
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(IpfsError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let uploaded: UploadedFile = resp.json().await?;
        tracing::debug!(source = uri, uri = %uploaded.url, size = uploaded.file_size, "Uploaded remote file");
        Ok(uploaded)
    }
}
