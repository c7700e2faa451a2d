use std::sync::Arc;

use containers::SignedHeader;
use libp2p_identity::PeerId;
use storage::HeaderStore;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::gater::ConnectionGater;
use crate::gossipsub::HeaderTopic;
use crate::header::{
    Exchange, ExchangeServer, GossipSubscriber, P2pClient, P2pError, P2pExchange, P2pExchangeServer,
    RequestHandler, Subscriber,
};
use crate::req_resp::{HeaderRequest, HeaderResponse};
use crate::types::{NodeInfo, PeerTable, connected_peers};

pub(crate) type Reply<T> = oneshot::Sender<T>;

pub(crate) enum NetworkCommand {
    Subscribe {
        topic: HeaderTopic,
        reply: Reply<Result<(), P2pError>>,
    },
    Unsubscribe {
        topic: HeaderTopic,
        reply: Reply<Result<(), P2pError>>,
    },
    Publish {
        topic: HeaderTopic,
        data: Vec<u8>,
        reply: Reply<Result<(), P2pError>>,
    },
    Request {
        peer: PeerId,
        request: HeaderRequest,
        reply: Reply<Result<HeaderResponse, P2pError>>,
    },
    SetRequestHandler {
        handler: Option<Arc<dyn RequestHandler>>,
        reply: Reply<()>,
    },
}

/// Cloneable access to a running [`NetworkService`](super::NetworkService).
#[derive(Clone)]
pub struct NetworkHandle {
    commands: mpsc::UnboundedSender<NetworkCommand>,
    headers: broadcast::Sender<SignedHeader>,
    peer_table: PeerTable,
    info: NodeInfo,
    gater: ConnectionGater,
}

impl NetworkHandle {
    pub(crate) fn new(
        commands: mpsc::UnboundedSender<NetworkCommand>,
        headers: broadcast::Sender<SignedHeader>,
        peer_table: PeerTable,
        info: NodeInfo,
        gater: ConnectionGater,
    ) -> Self {
        Self {
            commands,
            headers,
            peer_table,
            info,
            gater,
        }
    }

    async fn call<T, F>(&self, command: F) -> Result<T, P2pError>
    where
        T: Send,
        F: FnOnce(Reply<T>) -> NetworkCommand + Send,
    {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| P2pError::ServiceStopped)?;
        response.await.map_err(|_| P2pError::ServiceStopped)
    }

    pub async fn subscribe(&self, topic: HeaderTopic) -> Result<(), P2pError> {
        self.call(|reply| NetworkCommand::Subscribe { topic, reply }).await?
    }

    pub async fn unsubscribe(&self, topic: HeaderTopic) -> Result<(), P2pError> {
        self.call(|reply| NetworkCommand::Unsubscribe { topic, reply }).await?
    }

    pub async fn publish(&self, topic: HeaderTopic, data: Vec<u8>) -> Result<(), P2pError> {
        self.call(|reply| NetworkCommand::Publish { topic, data, reply }).await?
    }

    pub async fn request(&self, peer: PeerId, request: HeaderRequest) -> Result<HeaderResponse, P2pError> {
        self.call(|reply| NetworkCommand::Request { peer, request, reply }).await?
    }

    pub async fn set_request_handler(&self, handler: Option<Arc<dyn RequestHandler>>) -> Result<(), P2pError> {
        self.call(|reply| NetworkCommand::SetRequestHandler { handler, reply }).await
    }

    /// Headers that passed gossip validation.
    pub fn header_receiver(&self) -> broadcast::Receiver<SignedHeader> {
        self.headers.subscribe()
    }

    fn check_network(&self, network_id: &str) -> Result<(), P2pError> {
        if network_id != self.info.network {
            return Err(P2pError::NetworkMismatch {
                expected: self.info.network.clone(),
                actual: network_id.to_string(),
            });
        }
        Ok(())
    }
}

impl P2pClient for NetworkHandle {
    fn info(&self) -> NodeInfo {
        self.info.clone()
    }

    fn peer_ids(&self) -> Vec<PeerId> {
        connected_peers(&self.peer_table)
    }

    fn connection_gater(&self) -> ConnectionGater {
        self.gater.clone()
    }

    fn new_subscriber(&self, network_id: &str) -> Result<Arc<dyn Subscriber>, P2pError> {
        Ok(Arc::new(GossipSubscriber::new(self.clone(), network_id)))
    }

    fn new_exchange_server(
        &self,
        store: Arc<HeaderStore>,
        network_id: &str,
    ) -> Result<Arc<dyn ExchangeServer>, P2pError> {
        // The exchange protocol is fixed when the swarm is built.
        self.check_network(network_id)?;
        Ok(Arc::new(P2pExchangeServer::new(self.clone(), store)))
    }

    fn new_exchange(
        &self,
        peers: Vec<PeerId>,
        network_id: &str,
        chain_id: &str,
        gater: ConnectionGater,
    ) -> Result<Arc<dyn Exchange>, P2pError> {
        self.check_network(network_id)?;
        Ok(Arc::new(P2pExchange::new(self.clone(), peers, chain_id, gater)))
    }
}
