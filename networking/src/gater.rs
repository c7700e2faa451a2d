use crate::header::P2pError;
use chain::P2PConfig;
use libp2p_identity::PeerId;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;

/// Decides which peers may be dialed or kept connected.
///
/// Clones share state, so a peer blocked through one handle is blocked
/// everywhere.
#[derive(Debug, Clone, Default)]
pub struct ConnectionGater {
    blocked: Arc<RwLock<HashSet<PeerId>>>,
    allowed: Arc<RwLock<HashSet<PeerId>>>,
}

impl ConnectionGater {
    pub fn new(blocked: impl IntoIterator<Item = PeerId>, allowed: impl IntoIterator<Item = PeerId>) -> Self {
        Self {
            blocked: Arc::new(RwLock::new(blocked.into_iter().collect())),
            allowed: Arc::new(RwLock::new(allowed.into_iter().collect())),
        }
    }

    pub fn from_config(config: &P2PConfig) -> Result<Self, P2pError> {
        let blocked = parse_peer_ids(&config.blocked_peers)?;
        let allowed = parse_peer_ids(&config.allowed_peers)?;
        Ok(Self::new(blocked, allowed))
    }

    /// A non-empty allow list admits only its members; blocked peers never pass.
    pub fn is_allowed(&self, peer: &PeerId) -> bool {
        if self.blocked.read().contains(peer) {
            return false;
        }
        let allowed = self.allowed.read();
        allowed.is_empty() || allowed.contains(peer)
    }

    pub fn block_peer(&self, peer: PeerId) {
        self.blocked.write().insert(peer);
    }

    pub fn unblock_peer(&self, peer: &PeerId) {
        self.blocked.write().remove(peer);
    }

    pub fn allow_peer(&self, peer: PeerId) {
        self.allowed.write().insert(peer);
    }

    pub fn blocked_peers(&self) -> Vec<PeerId> {
        self.blocked.read().iter().copied().collect()
    }
}

fn parse_peer_ids(values: &[String]) -> Result<Vec<PeerId>, P2pError> {
    values
        .iter()
        .map(|value| {
            value
                .parse::<PeerId>()
                .map_err(|err| P2pError::InvalidPeerId(format!("{value}: {err}")))
        })
        .collect()
}
