use async_trait::async_trait;
use containers::{Hash, SignedHeader};
use libp2p_identity::PeerId;
use tracing::{debug, warn};

use super::{Exchange, P2pClient, P2pError};
use crate::gater::ConnectionGater;
use crate::network::NetworkHandle;
use crate::req_resp::{HeaderRequest, HeaderResponse, MAX_REQUEST_HEADERS};

/// Requests headers from peers, trying trusted peers first.
pub struct P2pExchange {
    network: NetworkHandle,
    trusted_peers: Vec<PeerId>,
    chain_id: String,
    gater: ConnectionGater,
}

impl P2pExchange {
    pub fn new(
        network: NetworkHandle,
        trusted_peers: Vec<PeerId>,
        chain_id: impl Into<String>,
        gater: ConnectionGater,
    ) -> Self {
        Self {
            network,
            trusted_peers,
            chain_id: chain_id.into(),
            gater,
        }
    }

    /// Connected, allowed peers: trusted ones first, in the order given.
    fn candidate_peers(&self) -> Vec<PeerId> {
        let mut peers = order_peers(&self.trusted_peers, self.network.peer_ids());
        peers.retain(|peer| self.gater.is_allowed(peer));
        peers
    }

    async fn request_any(&self, request: HeaderRequest) -> Result<Vec<SignedHeader>, P2pError> {
        let peers = self.candidate_peers();
        if peers.is_empty() {
            return Err(P2pError::NoPeers);
        }

        let mut last_error = P2pError::NotFound;
        for peer in peers {
            match self.request_from(peer, &request).await {
                Ok(headers) => return Ok(headers),
                Err(P2pError::ServiceStopped) => return Err(P2pError::ServiceStopped),
                Err(err) => {
                    debug!(%peer, ?request, %err, "Header request failed, trying next peer");
                    last_error = err;
                }
            }
        }
        Err(last_error)
    }

    async fn request_from(&self, peer: PeerId, request: &HeaderRequest) -> Result<Vec<SignedHeader>, P2pError> {
        match self.network.request(peer, request.clone()).await? {
            HeaderResponse::Headers(headers) => {
                validate_response(&self.chain_id, request, &headers).map_err(|reason| {
                    warn!(%peer, %reason, "Peer sent an invalid header response");
                    P2pError::InvalidResponse { peer, reason }
                })?;
                Ok(headers)
            }
            HeaderResponse::NotFound => Err(P2pError::NotFound),
            HeaderResponse::Invalid => Err(P2pError::Request {
                peer,
                reason: "peer rejected the request".to_string(),
            }),
        }
    }
}

/// Connected trusted peers in their configured order, then every other connected peer.
fn order_peers(trusted: &[PeerId], connected: Vec<PeerId>) -> Vec<PeerId> {
    let mut peers: Vec<PeerId> = trusted.iter().filter(|peer| connected.contains(peer)).copied().collect();
    let others: Vec<PeerId> = connected.into_iter().filter(|peer| !peers.contains(peer)).collect();
    peers.extend(others);
    peers
}

/// Checks a response against the request that produced it.
pub fn validate_response(chain_id: &str, request: &HeaderRequest, headers: &[SignedHeader]) -> Result<(), String> {
    if headers.is_empty() {
        return Err("empty response".to_string());
    }
    for header in headers {
        header
            .validate_basic()
            .map_err(|err| format!("header {}: {err}", header.height()))?;
        if header.chain_id() != chain_id {
            return Err(format!("header {} is for chain {}", header.height(), header.chain_id()));
        }
    }

    match request {
        HeaderRequest::Head => {
            if headers.len() != 1 {
                return Err(format!("expected one head, got {}", headers.len()));
            }
        }
        HeaderRequest::ByHash(hash) => {
            if headers.len() != 1 || headers[0].hash() != *hash {
                return Err(format!("expected header {hash}"));
            }
        }
        HeaderRequest::Range { from, amount } => {
            if headers.len() as u64 > *amount {
                return Err(format!("asked for {amount} headers, got {}", headers.len()));
            }
            for (offset, header) in headers.iter().enumerate() {
                let expected = from + offset as u64;
                if header.height() != expected {
                    return Err(format!("expected height {expected}, got {}", header.height()));
                }
            }
        }
    }
    Ok(())
}

#[async_trait]
impl Exchange for P2pExchange {
    async fn start(&self) -> Result<(), P2pError> {
        debug!(chain_id = %self.chain_id, trusted = self.trusted_peers.len(), "Header exchange started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), P2pError> {
        Ok(())
    }

    /// Asks every candidate peer and keeps the highest head.
    async fn head(&self) -> Result<SignedHeader, P2pError> {
        let peers = self.candidate_peers();
        if peers.is_empty() {
            return Err(P2pError::NoPeers);
        }

        let mut best: Option<SignedHeader> = None;
        let mut last_error = P2pError::NotFound;
        for peer in peers {
            match self.request_from(peer, &HeaderRequest::Head).await {
                Ok(mut headers) => {
                    if let Some(head) = headers.pop()
                        && best.as_ref().is_none_or(|best| head.height() > best.height())
                    {
                        best = Some(head);
                    }
                }
                Err(P2pError::ServiceStopped) => return Err(P2pError::ServiceStopped),
                Err(err) => last_error = err,
            }
        }
        best.ok_or(last_error)
    }

    async fn get(&self, hash: &Hash) -> Result<SignedHeader, P2pError> {
        let mut headers = self.request_any(HeaderRequest::ByHash(*hash)).await?;
        headers.pop().ok_or(P2pError::NotFound)
    }

    async fn get_range_by_height(&self, from: u64, amount: u64) -> Result<Vec<SignedHeader>, P2pError> {
        if amount == 0 {
            return Ok(Vec::new());
        }
        let amount = amount.min(MAX_REQUEST_HEADERS);
        self.request_any(HeaderRequest::Range { from, amount }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use containers::testing::{TEST_CHAIN_ID, TestProposer};
    use pretty_assertions::assert_eq;

    #[test]
    fn trusted_peers_come_first_without_duplicates() {
        let trusted = [PeerId::random(), PeerId::random(), PeerId::random()];
        let other = PeerId::random();
        let connected = vec![other, trusted[2], trusted[0]];

        assert_eq!(order_peers(&trusted, connected), vec![trusted[0], trusted[2], other]);
    }

    #[test]
    fn no_connected_peers_means_no_candidates() {
        assert!(order_peers(&[PeerId::random()], Vec::new()).is_empty());
    }

    #[test]
    fn contiguous_range_is_accepted() {
        let chain = TestProposer::new(1).chain(TEST_CHAIN_ID, 1, 4);
        let request = HeaderRequest::Range { from: 2, amount: 5 };
        assert_eq!(validate_response(TEST_CHAIN_ID, &request, &chain[1..]), Ok(()));
    }

    #[test]
    fn range_with_gap_is_rejected() {
        let chain = TestProposer::new(1).chain(TEST_CHAIN_ID, 1, 4);
        let request = HeaderRequest::Range { from: 1, amount: 4 };
        let gapped = vec![chain[0].clone(), chain[2].clone()];
        assert!(validate_response(TEST_CHAIN_ID, &request, &gapped).is_err());
    }

    #[test]
    fn oversized_range_is_rejected() {
        let chain = TestProposer::new(1).chain(TEST_CHAIN_ID, 1, 4);
        let request = HeaderRequest::Range { from: 1, amount: 2 };
        assert!(validate_response(TEST_CHAIN_ID, &request, &chain).is_err());
    }

    #[test]
    fn foreign_chain_is_rejected() {
        let header = TestProposer::new(1).first_header("other-chain", 1);
        assert!(validate_response(TEST_CHAIN_ID, &HeaderRequest::Head, &[header]).is_err());
    }

    #[test]
    fn by_hash_must_match() {
        let chain = TestProposer::new(1).chain(TEST_CHAIN_ID, 1, 2);
        let request = HeaderRequest::ByHash(chain[0].hash());
        assert_eq!(validate_response(TEST_CHAIN_ID, &request, &chain[..1]), Ok(()));
        assert!(validate_response(TEST_CHAIN_ID, &request, &chain[1..]).is_err());
    }

    #[test]
    fn tampered_header_is_rejected() {
        let mut header = TestProposer::new(1).first_header(TEST_CHAIN_ID, 1);
        header.commit.signatures[0][0] ^= 0xff;
        assert!(validate_response(TEST_CHAIN_ID, &HeaderRequest::Head, &[header]).is_err());
    }
}
