//! Header gossip and exchange capabilities consumed by the sync service.

pub mod exchange;
pub mod server;
pub mod subscriber;

use std::sync::Arc;

use async_trait::async_trait;
use containers::{Hash, SignedHeader};
use libp2p_identity::PeerId;
use storage::{HeaderStore, StoreError};
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use crate::gater::ConnectionGater;
use crate::types::NodeInfo;

pub use exchange::P2pExchange;
pub use server::{P2pExchangeServer, RequestHandler, StoreRequestHandler, serve_request};
pub use subscriber::GossipSubscriber;

#[derive(Debug, Error)]
pub enum P2pError {
    #[error("network service is not running")]
    ServiceStopped,
    #[error("no peers available")]
    NoPeers,
    #[error("header not found")]
    NotFound,
    #[error("request to {peer} failed: {reason}")]
    Request { peer: PeerId, reason: String },
    #[error("invalid response from {peer}: {reason}")]
    InvalidResponse { peer: PeerId, reason: String },
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("subscription failed: {0}")]
    Subscribe(String),
    #[error("network mismatch: node runs {expected}, asked for {actual}")]
    NetworkMismatch { expected: String, actual: String },
    #[error("invalid peer id {0}")]
    InvalidPeerId(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Stream of headers received from gossip.
pub struct Subscription {
    inner: broadcast::Receiver<SignedHeader>,
}

impl Subscription {
    pub fn new(inner: broadcast::Receiver<SignedHeader>) -> Self {
        Self { inner }
    }

    /// Next header, or `None` once the sending side is gone.
    pub async fn next_header(&mut self) -> Option<SignedHeader> {
        loop {
            match self.inner.recv().await {
                Ok(header) => return Some(header),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Header subscription lagged behind gossip");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn start(&self) -> Result<(), P2pError>;

    async fn stop(&self) -> Result<(), P2pError>;

    fn subscribe(&self) -> Result<Subscription, P2pError>;

    async fn broadcast(&self, header: &SignedHeader) -> Result<(), P2pError>;
}

/// Fetches headers from peers.
#[async_trait]
pub trait Exchange: Send + Sync {
    async fn start(&self) -> Result<(), P2pError>;

    async fn stop(&self) -> Result<(), P2pError>;

    async fn head(&self) -> Result<SignedHeader, P2pError>;

    async fn get(&self, hash: &Hash) -> Result<SignedHeader, P2pError>;

    /// Up to `amount` consecutive headers starting at `from`.
    async fn get_range_by_height(&self, from: u64, amount: u64) -> Result<Vec<SignedHeader>, P2pError>;

    async fn get_by_height(&self, height: u64) -> Result<SignedHeader, P2pError> {
        self.get_range_by_height(height, 1)
            .await?
            .into_iter()
            .next()
            .ok_or(P2pError::NotFound)
    }
}

/// Answers header requests from peers out of the local store.
#[async_trait]
pub trait ExchangeServer: Send + Sync {
    async fn start(&self) -> Result<(), P2pError>;

    async fn stop(&self) -> Result<(), P2pError>;
}

/// The node's peer-to-peer client, as seen by the header sync service.
pub trait P2pClient: Send + Sync {
    fn info(&self) -> NodeInfo;

    fn peer_ids(&self) -> Vec<PeerId>;

    fn connection_gater(&self) -> ConnectionGater;

    fn new_subscriber(&self, network_id: &str) -> Result<Arc<dyn Subscriber>, P2pError>;

    fn new_exchange_server(
        &self,
        store: Arc<HeaderStore>,
        network_id: &str,
    ) -> Result<Arc<dyn ExchangeServer>, P2pError>;

    fn new_exchange(
        &self,
        peers: Vec<PeerId>,
        network_id: &str,
        chain_id: &str,
        gater: ConnectionGater,
    ) -> Result<Arc<dyn Exchange>, P2pError>;
}
