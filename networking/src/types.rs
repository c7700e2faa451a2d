use libp2p::Multiaddr;
use libp2p_identity::PeerId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Peer connection state.
///
/// DISCONNECTED -> CONNECTING -> CONNECTED -> DISCONNECTED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

pub type PeerTable = Arc<Mutex<HashMap<PeerId, ConnectionState>>>;

pub fn connected_peers(peer_table: &PeerTable) -> Vec<PeerId> {
    let mut peers: Vec<PeerId> = peer_table
        .lock()
        .iter()
        .filter(|(_, state)| **state == ConnectionState::Connected)
        .map(|(peer_id, _)| *peer_id)
        .collect();
    peers.sort();
    peers
}

/// What the local node tells the header service about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub peer_id: PeerId,
    /// Network identity; gossip topics and exchange protocols are scoped by it.
    pub network: String,
    pub listen_addrs: Vec<Multiaddr>,
}
