use containers::Hash;
use storage::StoreError;
use thiserror::Error;

use super::states::ServiceState;
use crate::header::P2pError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("syncer already started")]
    AlreadyStarted,
    #[error("syncer is not running")]
    NotRunning,
    #[error("syncer task failed: {0}")]
    Task(String),
    #[error(transparent)]
    P2p(#[from] P2pError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A failure attributed to one of the service's components.
#[derive(Debug, Error)]
pub enum ComponentError {
    #[error("header store: {0}")]
    Store(#[source] StoreError),
    #[error("gossip subscriber: {0}")]
    Subscriber(#[source] P2pError),
    #[error("exchange server: {0}")]
    ExchangeServer(#[source] P2pError),
    #[error("exchange: {0}")]
    Exchange(#[source] P2pError),
    #[error("syncer: {0}")]
    Syncer(#[source] SyncError),
}

#[derive(Debug, Error)]
pub enum SyncServiceError {
    #[error("genesis document is required")]
    MissingGenesis,
    #[error("p2p client is required")]
    MissingP2pClient,
    #[error("datastore is required")]
    MissingDatastore,
    #[error("invalid service state transition from {from:?} to {to:?}")]
    InvalidTransition { from: ServiceState, to: ServiceState },
    #[error("failed to start {0}")]
    Startup(#[from] ComponentError),
    #[error("{0} was already set up")]
    ComponentAlreadySet(&'static str),
    #[error("invalid trusted hash {value}: {reason}")]
    InvalidTrustedHash { value: String, reason: String },
    #[error("failed to fetch trusted header {hash}: {source}")]
    TrustedHeaderFetch {
        hash: Hash,
        #[source]
        source: P2pError,
    },
    #[error(
        "failed to fetch the genesis header at height {height}: {source}; \
         the proposer initializes the network with the first header it produces, \
         so start this node once that header is available from peers"
    )]
    GenesisHeaderUnavailable {
        height: u64,
        #[source]
        source: P2pError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("shutdown failed: {}", join_errors(.0))]
    Shutdown(Vec<ComponentError>),
}

fn join_errors(errors: &[ComponentError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
