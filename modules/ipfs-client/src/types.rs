use serde::{Deserialize, Serialize};

/// Response of a raw byte upload.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadedBytes {
    /// `ipfs://<cid>` address.
    pub url: String,
    pub cid: String,
}

/// Response of a fetch-and-store upload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub file_name: String,
    pub url: String,
    pub file_size: i64,
    pub content_type: String,
    #[serde(default)]
    pub additional_props: serde_json::Map<String, serde_json::Value>,
}

impl UploadedFile {
    /// Additional props as a JSON string of string values.
    pub fn additional_props_json(&self) -> String {
        let flattened: serde_json::Map<String, serde_json::Value> = self
            .additional_props
            .iter()
            .map(|(k, v)| {
                let s = match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), serde_json::Value::String(s))
            })
            .collect();
        serde_json::Value::Object(flattened).to_string()
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct UploadUrlInput<'a> {
    pub url: &'a str,
    pub video: bool,
}
