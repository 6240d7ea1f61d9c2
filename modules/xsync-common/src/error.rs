use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure codes carried by work-failed messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    UnsupportedPlatform,
    AccountNotVerified,
    FetchFailed,
    UploadFailed,
    IndexerLookupFailed,
    ChainTransactionFailed,
    PersistenceFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::UnsupportedPlatform => "unsupported_platform",
            ErrorCode::AccountNotVerified => "account_not_verified",
            ErrorCode::FetchFailed => "fetch_failed",
            ErrorCode::UploadFailed => "upload_failed",
            ErrorCode::IndexerLookupFailed => "indexer_lookup_failed",
            ErrorCode::ChainTransactionFailed => "chain_transaction_failed",
            ErrorCode::PersistenceFailed => "persistence_failed",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed work item: a code plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct WorkError {
    pub code: ErrorCode,
    pub message: String,
}

impl WorkError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unsupported_platform(platform: &str) -> Self {
        Self::new(
            ErrorCode::UnsupportedPlatform,
            format!("Unsupported platform: {platform}"),
        )
    }

    pub fn not_verified() -> Self {
        Self::new(
            ErrorCode::AccountNotVerified,
            "No identity verify string found on this account",
        )
    }

    pub fn fetch(err: impl std::fmt::Display) -> Self {
        Self::new(ErrorCode::FetchFailed, err.to_string())
    }
}
