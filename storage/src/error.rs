use containers::prost::DecodeError;
use containers::VerifyError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("datastore does not support batched writes")]
    NotBatching,
    #[error("header store is not initialized")]
    NotInitialized,
    #[error("header store is already initialized at height {0}")]
    AlreadyInitialized(u64),
    #[error("header not found")]
    NotFound,
    #[error("header {height} does not follow head {head}")]
    NonAdjacent { head: u64, height: u64 },
    #[error(transparent)]
    Verify(#[from] VerifyError),
    #[error("failed to decode stored header: {0}")]
    Decode(#[from] DecodeError),
    #[error("corrupted entry under {key}")]
    Corrupted { key: String },
    #[error("datastore error: {0}")]
    Backend(String),
}
