pub mod compressor;
pub mod gater;
pub mod gossipsub;
pub mod header;
pub mod network;
pub mod req_resp;
pub mod sync;
pub mod types;

pub use gater::ConnectionGater;
pub use header::{Exchange, ExchangeServer, P2pClient, P2pError, Subscriber, Subscription};
pub use network::{NetworkHandle, NetworkService, NetworkServiceConfig};
pub use sync::{HeaderSyncService, HeaderSyncer, SyncerStatus};
pub use types::NodeInfo;
