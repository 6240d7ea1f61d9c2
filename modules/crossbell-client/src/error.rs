use thiserror::Error;

pub type Result<T> = std::result::Result<T, CrossbellError>;

#[derive(Debug, Error)]
pub enum CrossbellError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for CrossbellError {
    fn from(err: reqwest::Error) -> Self {
        CrossbellError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for CrossbellError {
    fn from(err: serde_json::Error) -> Self {
        CrossbellError::Parse(err.to_string())
    }
}
