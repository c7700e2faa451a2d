mod handle;
mod service;

use libp2p::{connection_limits, identify, swarm::NetworkBehaviour};

use crate::gossipsub::GossipsubBehaviour;
use crate::req_resp::ReqResp;

pub use handle::NetworkHandle;
pub(crate) use handle::NetworkCommand;
pub use service::{NetworkService, NetworkServiceConfig};

/// Header gossip plus the header exchange protocol.
#[derive(NetworkBehaviour)]
pub struct HeaderNetworkBehaviour {
    pub identify: identify::Behaviour,
    pub gossipsub: GossipsubBehaviour,
    /// Header exchange, see [`crate::req_resp`].
    pub header_ex: ReqResp,
    pub connection_limits: connection_limits::Behaviour,
}
