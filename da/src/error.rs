use storage::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaError {
    #[error("unknown data availability layer {0:?}")]
    UnknownLayer(String),
    #[error("invalid data availability config: {0}")]
    Config(#[from] serde_json::Error),
    #[error("data availability client is not initialized")]
    NotInitialized,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected response ({status}): {body}")]
    Status { status: reqwest::StatusCode, body: String },
    #[error("invalid block data: {0}")]
    InvalidData(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}
