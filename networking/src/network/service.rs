use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use anyhow::{Result, anyhow};
use containers::SignedHeader;
use futures::StreamExt;
use libp2p::{
    Multiaddr, SwarmBuilder,
    connection_limits::{self, ConnectionLimits},
    gossipsub::{Event, IdentTopic, Message, MessageAcceptance, MessageAuthenticity, MessageId, PublishError},
    identify, noise,
    multiaddr::Protocol,
    request_response::OutboundRequestId,
    swarm::{Config, Swarm, SwarmEvent},
    tcp, yamux,
};
use libp2p_identity::{Keypair, PeerId};
use parking_lot::Mutex;
use tokio::select;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Duration, MissedTickBehavior, interval, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{HeaderNetworkBehaviour, HeaderNetworkBehaviourEvent};
use super::handle::{NetworkCommand, NetworkHandle};
use crate::{
    compressor::Compressor,
    gater::ConnectionGater,
    gossipsub::{self, GossipsubConfig, HeaderTopic},
    header::{P2pError, RequestHandler},
    req_resp::{self, HeaderResponse, ReqRespMessage},
    types::{ConnectionState, NodeInfo, PeerTable},
};

const HEADER_CHANNEL_CAPACITY: usize = 256;
const RECONNECT_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_SEED_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct NetworkServiceConfig {
    pub gossipsub_config: GossipsubConfig,
    pub listen_address: Multiaddr,
    /// Seed peers; only addresses carrying a `/p2p/` component are dialed.
    pub seeds: Vec<Multiaddr>,
    /// Scopes the header exchange protocol.
    pub network: String,
    /// How long `bootstrap` waits for seed connections.
    pub seed_connect_timeout: Duration,
}

impl NetworkServiceConfig {
    pub fn new(
        gossipsub_config: GossipsubConfig,
        listen_address: Multiaddr,
        seeds: Vec<Multiaddr>,
        network: impl Into<String>,
    ) -> Self {
        Self {
            gossipsub_config,
            listen_address,
            seeds,
            network: network.into(),
            seed_connect_timeout: DEFAULT_SEED_CONNECT_TIMEOUT,
        }
    }

    /// Parses seed addresses, skipping those that are not valid multiaddrs.
    pub fn parse_seeds(seeds: &[String]) -> Vec<Multiaddr> {
        seeds
            .iter()
            .filter_map(|seed| match seed.parse::<Multiaddr>() {
                Ok(addr) => Some(addr),
                Err(err) => {
                    warn!(seed, %err, "Ignoring invalid seed address");
                    None
                }
            })
            .collect()
    }
}

type PendingRequest = oneshot::Sender<Result<HeaderResponse, P2pError>>;

/// Owns the libp2p swarm. Everything else talks to it through [`NetworkHandle`].
pub struct NetworkService {
    config: Arc<NetworkServiceConfig>,
    swarm: Swarm<HeaderNetworkBehaviour>,
    peer_table: PeerTable,
    gater: ConnectionGater,
    handle: NetworkHandle,
    commands: mpsc::UnboundedReceiver<NetworkCommand>,
    headers: broadcast::Sender<SignedHeader>,
    pending_requests: HashMap<OutboundRequestId, PendingRequest>,
    request_handler: Option<Arc<dyn RequestHandler>>,
}

impl NetworkService {
    pub fn new(config: NetworkServiceConfig, local_key: Keypair, gater: ConnectionGater) -> Result<Self> {
        let config = Arc::new(config);
        let behaviour = Self::build_behaviour(&local_key, &config)?;

        let swarm_config = Config::with_tokio_executor().with_idle_connection_timeout(Duration::from_secs(60));

        let mut swarm = SwarmBuilder::with_existing_identity(local_key)
            .with_tokio()
            .with_tcp(tcp::Config::default(), noise::Config::new, yamux::Config::default)?
            .with_quic()
            .with_behaviour(|_| behaviour)?
            .with_swarm_config(|_| swarm_config)
            .build();

        swarm
            .listen_on(config.listen_address.clone())
            .map_err(|e| anyhow!("Failed to listen on {}: {e:?}", config.listen_address))?;
        info!(addr = %config.listen_address, "Listening on");

        let peer_table: PeerTable = Arc::new(Mutex::new(HashMap::new()));
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (headers, _) = broadcast::channel(HEADER_CHANNEL_CAPACITY);
        let info = NodeInfo {
            peer_id: *swarm.local_peer_id(),
            network: config.network.clone(),
            listen_addrs: vec![config.listen_address.clone()],
        };
        let handle = NetworkHandle::new(commands_tx, headers.clone(), peer_table.clone(), info, gater.clone());

        Ok(Self {
            config,
            swarm,
            peer_table,
            gater,
            handle,
            commands,
            headers,
            pending_requests: HashMap::new(),
            request_handler: None,
        })
    }

    pub fn handle(&self) -> NetworkHandle {
        self.handle.clone()
    }

    pub fn local_peer_id(&self) -> PeerId {
        *self.swarm.local_peer_id()
    }

    pub fn peer_table(&self) -> PeerTable {
        self.peer_table.clone()
    }

    /// Dials the seeds and waits until each has connected or failed, or the
    /// seed timeout passes.
    pub async fn bootstrap(&mut self) {
        let mut waiting = self.connect_to_seeds();
        if waiting.is_empty() {
            return;
        }

        let deadline = sleep(self.config.seed_connect_timeout);
        tokio::pin!(deadline);

        while !waiting.is_empty() {
            select! {
                _ = &mut deadline => {
                    warn!(pending = waiting.len(), "Timed out waiting for seed connections");
                    break;
                }
                event = self.swarm.select_next_some() => {
                    match &event {
                        SwarmEvent::ConnectionEstablished { peer_id, .. }
                        | SwarmEvent::OutgoingConnectionError { peer_id: Some(peer_id), .. } => {
                            waiting.remove(peer_id);
                        }
                        _ => {}
                    }
                    self.handle_swarm_event(event);
                }
            }
        }

        info!(connected = crate::types::connected_peers(&self.peer_table).len(), "Bootstrap finished");
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        let mut reconnect_interval = interval(RECONNECT_INTERVAL);
        reconnect_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            select! {
                _ = cancel.cancelled() => {
                    info!("Network service stopping");
                    break;
                }
                _ = reconnect_interval.tick() => {
                    self.connect_to_seeds();
                }
                Some(command) = self.commands.recv() => {
                    self.handle_command(command);
                }
                event = self.swarm.select_next_some() => {
                    self.handle_swarm_event(event);
                }
            }
        }

        for (_, reply) in self.pending_requests.drain() {
            let _ = reply.send(Err(P2pError::ServiceStopped));
        }
    }

    fn handle_command(&mut self, command: NetworkCommand) {
        match command {
            NetworkCommand::Subscribe { topic, reply } => {
                let result = self
                    .swarm
                    .behaviour_mut()
                    .gossipsub
                    .subscribe(&IdentTopic::from(topic.clone()))
                    .map(|_| ())
                    .map_err(|err| P2pError::Subscribe(format!("{topic}: {err:?}")));
                let _ = reply.send(result);
            }
            NetworkCommand::Unsubscribe { topic, reply } => {
                let _ = self.swarm.behaviour_mut().gossipsub.unsubscribe(&IdentTopic::from(topic));
                let _ = reply.send(Ok(()));
            }
            NetworkCommand::Publish { topic, data, reply } => {
                let result = match self.swarm.behaviour_mut().gossipsub.publish(IdentTopic::from(topic), data) {
                    Ok(_) => Ok(()),
                    // We already sent or received this exact header.
                    Err(PublishError::Duplicate) => Ok(()),
                    Err(err) => Err(P2pError::Publish(format!("{err:?}"))),
                };
                let _ = reply.send(result);
            }
            NetworkCommand::Request { peer, request, reply } => {
                if !self.gater.is_allowed(&peer) {
                    let _ = reply.send(Err(P2pError::Request {
                        peer,
                        reason: "peer is not allowed".to_string(),
                    }));
                    return;
                }
                trace!(%peer, ?request, "Sending header request");
                let request_id = self.swarm.behaviour_mut().header_ex.send_request(&peer, request);
                self.pending_requests.insert(request_id, reply);
            }
            NetworkCommand::SetRequestHandler { handler, reply } => {
                self.request_handler = handler;
                let _ = reply.send(());
            }
        }
    }

    fn handle_swarm_event(&mut self, event: SwarmEvent<HeaderNetworkBehaviourEvent>) {
        match event {
            SwarmEvent::Behaviour(HeaderNetworkBehaviourEvent::Gossipsub(event)) => {
                self.handle_gossipsub_event(event);
            }
            SwarmEvent::Behaviour(HeaderNetworkBehaviourEvent::HeaderEx(event)) => {
                self.handle_request_response_event(event);
            }
            SwarmEvent::Behaviour(HeaderNetworkBehaviourEvent::Identify(event)) => {
                self.handle_identify_event(event);
            }
            SwarmEvent::Behaviour(_) => {
                // ConnectionLimits behaviour has no events
            }
            SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                if !self.gater.is_allowed(&peer_id) {
                    warn!(peer = %peer_id, "Disconnecting gated peer");
                    let _ = self.swarm.disconnect_peer_id(peer_id);
                    return;
                }
                self.peer_table.lock().insert(peer_id, ConnectionState::Connected);
                info!(peer = %peer_id, "Connected to peer (total: {})", self.connected_count());
            }
            SwarmEvent::ConnectionClosed {
                peer_id,
                num_established,
                ..
            } => {
                if num_established == 0 {
                    self.peer_table.lock().insert(peer_id, ConnectionState::Disconnected);
                    info!(peer = %peer_id, "Disconnected from peer (total: {})", self.connected_count());
                }
            }
            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                if let Some(peer_id) = peer_id {
                    self.peer_table.lock().insert(peer_id, ConnectionState::Disconnected);
                }
                warn!(?peer_id, %error, "Failed to connect to peer");
            }
            SwarmEvent::NewListenAddr { address, .. } => {
                info!(%address, "New listen address");
            }
            event => {
                trace!(?event, "Unhandled swarm event");
            }
        }
    }

    fn connected_count(&self) -> usize {
        self.peer_table
            .lock()
            .values()
            .filter(|state| **state == ConnectionState::Connected)
            .count()
    }

    fn handle_gossipsub_event(&mut self, event: Event) {
        match event {
            Event::Message {
                propagation_source,
                message_id,
                message,
            } => self.handle_gossip_message(propagation_source, message_id, message),
            Event::Subscribed { peer_id, topic } => {
                debug!(peer = %peer_id, %topic, "Peer subscribed to topic");
            }
            Event::Unsubscribed { peer_id, topic } => {
                debug!(peer = %peer_id, %topic, "Peer unsubscribed from topic");
            }
            event => {
                trace!(?event, "Unhandled gossipsub event");
            }
        }
    }

    fn handle_gossip_message(&mut self, source: PeerId, message_id: MessageId, message: Message) {
        let acceptance = match decode_gossip_header(&message) {
            Ok(header) => {
                debug!(peer = %source, height = header.height(), "Received header from gossip");
                // No receivers just means nobody is syncing yet.
                let _ = self.headers.send(header);
                MessageAcceptance::Accept
            }
            Err(reason) => {
                warn!(peer = %source, topic = %message.topic, %reason, "Rejecting gossiped header");
                MessageAcceptance::Reject
            }
        };

        let _ = self
            .swarm
            .behaviour_mut()
            .gossipsub
            .report_message_validation_result(&message_id, &source, acceptance);
    }

    fn handle_request_response_event(&mut self, event: ReqRespMessage) {
        use libp2p::request_response::{Event, Message};

        match event {
            Event::Message { peer, message, .. } => match message {
                Message::Request { request, channel, .. } => {
                    let Some(handler) = self.request_handler.clone() else {
                        debug!(%peer, ?request, "No header exchange server, dropping request");
                        return;
                    };
                    let response = handler.handle(request);
                    if let Err(response) = self.swarm.behaviour_mut().header_ex.send_response(channel, response) {
                        warn!(%peer, ?response, "Failed to send header response");
                    }
                }
                Message::Response { request_id, response } => {
                    if let Some(reply) = self.pending_requests.remove(&request_id) {
                        let _ = reply.send(Ok(response));
                    }
                }
            },
            Event::OutboundFailure {
                peer,
                request_id,
                error,
                ..
            } => {
                warn!(%peer, %error, "Header request failed");
                if let Some(reply) = self.pending_requests.remove(&request_id) {
                    let _ = reply.send(Err(P2pError::Request {
                        peer,
                        reason: error.to_string(),
                    }));
                }
            }
            Event::InboundFailure { peer, error, .. } => {
                warn!(%peer, %error, "Inbound header request failed");
            }
            Event::ResponseSent { peer, .. } => {
                trace!(%peer, "Header response sent");
            }
        }
    }

    fn handle_identify_event(&mut self, event: identify::Event) {
        match event {
            identify::Event::Received { peer_id, info, .. } => {
                debug!(
                    peer = %peer_id,
                    agent_version = %info.agent_version,
                    protocols = info.protocols.len(),
                    "Received peer info"
                );
            }
            identify::Event::Error { peer_id, error, .. } => {
                warn!(peer = %peer_id, ?error, "Identify error");
            }
            _ => {}
        }
    }

    /// Dials seeds that are not connected yet and returns the peers dialed.
    fn connect_to_seeds(&mut self) -> HashSet<PeerId> {
        let mut dialed = HashSet::new();
        for seed in self.config.seeds.clone() {
            let Some(peer_id) = seed_peer_id(&seed) else {
                warn!(%seed, "Seed address has no peer id, skipping");
                continue;
            };
            if peer_id == self.local_peer_id() {
                continue;
            }
            if !self.gater.is_allowed(&peer_id) {
                debug!(peer = %peer_id, "Not dialing gated seed");
                continue;
            }

            let current_state = self.peer_table.lock().get(&peer_id).copied();
            if matches!(
                current_state,
                Some(ConnectionState::Connected | ConnectionState::Connecting)
            ) {
                trace!(peer = %peer_id, "Already connected");
                continue;
            }

            if let Err(err) = self.swarm.dial(seed.clone()) {
                warn!(%seed, ?err, "Failed to dial seed");
                continue;
            }

            info!(peer = %peer_id, "Dialing seed");
            self.peer_table.lock().insert(peer_id, ConnectionState::Connecting);
            dialed.insert(peer_id);
        }
        dialed
    }

    fn build_behaviour(local_key: &Keypair, cfg: &NetworkServiceConfig) -> Result<HeaderNetworkBehaviour> {
        let identify = identify::Behaviour::new(
            identify::Config::new("/rollup/header-sync/1.0.0".into(), local_key.public())
                .with_agent_version(format!("rollup-node/{}", env!("CARGO_PKG_VERSION"))),
        );

        let gossipsub = gossipsub::GossipsubBehaviour::new_with_transform(
            MessageAuthenticity::Anonymous,
            cfg.gossipsub_config.config.clone(),
            Compressor,
        )
        .map_err(|err| anyhow!("Failed to create gossipsub behaviour: {err:?}"))?;

        let header_ex = req_resp::build(&cfg.network);

        let connection_limits = connection_limits::Behaviour::new(
            ConnectionLimits::default()
                .with_max_pending_incoming(Some(5))
                .with_max_pending_outgoing(Some(16))
                .with_max_established_per_peer(Some(2)),
        );

        Ok(HeaderNetworkBehaviour {
            identify,
            gossipsub,
            header_ex,
            connection_limits,
        })
    }
}

fn seed_peer_id(addr: &Multiaddr) -> Option<PeerId> {
    addr.iter().find_map(|protocol| match protocol {
        Protocol::P2p(peer_id) => Some(peer_id),
        _ => None,
    })
}

/// Decodes a gossiped header and checks it in isolation.
fn decode_gossip_header(message: &Message) -> Result<SignedHeader, String> {
    HeaderTopic::from_string(message.topic.as_str())?;
    let header = SignedHeader::from_bytes(&message.data).map_err(|err| format!("decode failed: {err}"))?;
    header
        .validate_basic()
        .map_err(|err| format!("invalid header {}: {err}", header.height()))?;
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use containers::testing::{TEST_CHAIN_ID, TestProposer};
    use libp2p::gossipsub::TopicHash;
    use pretty_assertions::assert_eq;

    fn message(topic: &str, data: Vec<u8>) -> Message {
        Message {
            source: None,
            data,
            sequence_number: None,
            topic: TopicHash::from_raw(topic),
        }
    }

    #[test]
    fn gossip_header_is_decoded_and_checked() {
        let header = TestProposer::new(1).first_header(TEST_CHAIN_ID, 1);
        let topic = HeaderTopic::new(TEST_CHAIN_ID).to_string();
        assert_eq!(decode_gossip_header(&message(&topic, header.to_bytes())), Ok(header));
    }

    #[test]
    fn tampered_gossip_header_is_rejected() {
        let mut header = TestProposer::new(1).first_header(TEST_CHAIN_ID, 1);
        header.header.app_hash = vec![7; 32];
        let topic = HeaderTopic::new(TEST_CHAIN_ID).to_string();
        assert!(decode_gossip_header(&message(&topic, header.to_bytes())).is_err());
    }

    #[test]
    fn foreign_topic_is_rejected() {
        let header = TestProposer::new(1).first_header(TEST_CHAIN_ID, 1);
        assert!(decode_gossip_header(&message("/other/topic", header.to_bytes())).is_err());
    }

    #[test]
    fn seed_peer_id_requires_p2p_component() {
        let peer = PeerId::random();
        let with_peer: Multiaddr = format!("/ip4/127.0.0.1/tcp/7676/p2p/{peer}").parse().unwrap();
        let without_peer: Multiaddr = "/ip4/127.0.0.1/tcp/7676".parse().unwrap();
        assert_eq!(seed_peer_id(&with_peer), Some(peer));
        assert_eq!(seed_peer_id(&without_peer), None);
    }

    #[test]
    fn invalid_seeds_are_skipped() {
        let seeds = NetworkServiceConfig::parse_seeds(&["not-an-addr".to_string(), "/ip4/10.0.0.1/tcp/1".to_string()]);
        assert_eq!(seeds.len(), 1);
    }
}
