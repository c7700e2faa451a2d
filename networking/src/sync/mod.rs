/// Header synchronization for the rollup node.
///
/// - **HeaderSyncService**: owns the header store, gossip subscriber, exchange
///   client and server, and decides how an empty store gets its first header
/// - **HeaderSyncer**: keeps the store caught up with gossip and with the
///   network head reported by peers
/// - **SyncerStatus**: start-once guard shared by startup and broadcast-and-init
///
/// ## Service lifecycle
///
/// Created -> Starting -> Bootstrapping -> Running, with Failed on startup
/// errors and Stopped after `stop`.
pub mod config;
pub mod error;
pub mod service;
pub mod states;
pub mod status;
pub mod syncer;

pub use config::*;
pub use error::{ComponentError, SyncError, SyncServiceError};
pub use service::{HeaderSyncService, HeaderSyncServiceBuilder};
pub use states::{ServiceState, SyncState};
pub use status::SyncerStatus;
pub use syncer::{HeaderSyncer, SyncerOptions};

#[cfg(test)]
mod tests;
