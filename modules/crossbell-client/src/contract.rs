// Operator contract access over JSON-RPC. The RPC endpoint holds the operator
// key and signs on our behalf; from here the contract is opaque.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{CrossbellError, Result};

/// Bit of the operator permission word that grants `postNote`.
pub const POST_NOTE_PERMISSION_BIT: u32 = 236;

/// Result of a submitted note transaction.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostedNote {
    pub transaction_hash: String,
    #[serde(default)]
    pub character_id: i64,
    #[serde(default)]
    pub note_id: i64,
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

pub struct ContractClient {
    client: reqwest::Client,
    endpoint: String,
    operator_address: String,
}

impl ContractClient {
    pub fn new(endpoint: impl Into<String>, operator_address: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            operator_address: operator_address.into(),
        }
    }

    pub fn operator_address(&self) -> &str {
        &self.operator_address
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&RpcRequest {
                jsonrpc: "2.0",
                id: 1,
                method,
                params,
            })
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

        let body: RpcResponse<T> = resp.json().await?;
        if let Some(err) = body.error {
            return Err(CrossbellError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        body.result
            .ok_or_else(|| CrossbellError::Parse(format!("{method}: empty result")))
    }

    /// Raw permission word (hex) granted to `operator` on `character_id`.
    pub async fn get_operator_permissions(&self, character_id: i64, operator: &str) -> Result<String> {
        self.call(
            "getOperatorPermissions",
            json!({ "characterId": character_id, "operator": operator }),
        )
        .await
    }

    /// Whether our operator may post notes for `character_id`.
    pub async fn check_operator_permission(&self, character_id: i64) -> Result<bool> {
        let word = self
            .get_operator_permissions(character_id, &self.operator_address)
            .await?;
        has_permission_bit(&word, POST_NOTE_PERMISSION_BIT)
    }

    /// Post a note under `character_id`; linked to another note when `for_note` is set.
    pub async fn post_note(
        &self,
        character_id: i64,
        content_uri: &str,
        for_note: Option<(i64, i64)>,
    ) -> Result<PostedNote> {
        let posted: PostedNote = match for_note {
            Some((for_character_id, for_note_id)) => {
                self.call(
                    "postNote4Note",
                    json!({
                        "characterId": character_id,
                        "contentUri": content_uri,
                        "forCharacterId": for_character_id,
                        "forNoteId": for_note_id,
                    }),
                )
                .await?
            }
            None => {
                self.call(
                    "postNote",
                    json!({ "characterId": character_id, "contentUri": content_uri }),
                )
                .await?
            }
        };
        tracing::debug!(character_id, tx = %posted.transaction_hash, "Note transaction submitted");
        Ok(posted)
    }
}

/// Test bit `bit` of a big-endian hex word such as `0x1000...`.
pub fn has_permission_bit(word: &str, bit: u32) -> Result<bool> {
    let hex = word.trim_start_matches("0x").trim_start_matches("0X");
    let nibble_index = (bit / 4) as usize;
    if nibble_index >= hex.len() {
        return Ok(false);
    }
    let ch = hex.as_bytes()[hex.len() - 1 - nibble_index] as char;
    let nibble = ch
        .to_digit(16)
        .ok_or_else(|| CrossbellError::Parse(format!("invalid permission word: {word}")))?;
    Ok(nibble & (1 << (bit % 4)) != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_note_bit_is_found() {
        // 1 << 236 = 0x1 followed by 59 zero nibbles.
        let word = format!("0x1{}", "0".repeat(59));
        assert!(has_permission_bit(&word, POST_NOTE_PERMISSION_BIT).unwrap());
        assert!(!has_permission_bit(&word, 235).unwrap());
    }

    #[test]
    fn short_word_has_no_high_bits() {
        assert!(!has_permission_bit("0x0", POST_NOTE_PERMISSION_BIT).unwrap());
        assert!(has_permission_bit("0x2", 1).unwrap());
    }

    #[test]
    fn garbage_word_is_a_parse_error() {
        let word = format!("0xz{}", "0".repeat(59));
        assert!(has_permission_bit(&word, POST_NOTE_PERMISSION_BIT).is_err());
    }
}
