//! Data availability layer clients.
//!
//! Every backend implements [`DataAvailabilityLayerClient`] and
//! [`BlockRetriever`]. The node talks to them through
//! [`DataAvailabilityClient`], which picks the backend by name and bounds
//! every call by a caller deadline.

pub mod avail;
mod client;
pub mod error;
pub mod mock;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;
use containers::{Block, NamespaceId};
use storage::Datastore;

pub use avail::{AvailClient, AvailConfig};
pub use client::{DaLayer, DataAvailabilityClient};
pub use error::DaError;
pub use mock::MockDataAvailabilityLayerClient;
pub use types::{BaseResult, ResultCheckBlock, ResultRetrieveBlocks, ResultSubmitBlock, StatusCode};

#[async_trait]
pub trait DataAvailabilityLayerClient: Send + Sync {
    /// Reads backend configuration. Only touches local state.
    fn init(&mut self, namespace: NamespaceId, config: &[u8], store: Arc<dyn Datastore>) -> Result<(), DaError>;

    async fn start(&self) -> Result<(), DaError>;

    async fn stop(&self) -> Result<(), DaError>;

    /// Publishes the block's canonical encoding and reports where it landed.
    async fn submit_block(&self, block: &Block) -> ResultSubmitBlock;

    async fn check_block_availability(&self, da_height: u64) -> ResultCheckBlock;
}

#[async_trait]
pub trait BlockRetriever: Send + Sync {
    /// Blocks published at `da_height`. An empty position is a success with no blocks.
    async fn retrieve_blocks(&self, da_height: u64) -> ResultRetrieveBlocks;
}
