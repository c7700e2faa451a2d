use std::sync::{Arc, OnceLock};
use std::time::Duration;

use containers::{GenesisDoc, Hash, SignedHeader};
use libp2p_identity::PeerId;
use metrics::SharedMetrics;
use parking_lot::Mutex;
use storage::{DEFAULT_STORE_PREFIX, Datastore, HeaderStore, StoreError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::DEFAULT_BLOCK_TIME;
use super::error::{ComponentError, SyncServiceError};
use super::states::ServiceState;
use super::status::SyncerStatus;
use super::syncer::{HeaderSyncer, SyncerOptions};
use crate::header::{Exchange, ExchangeServer, P2pClient, Subscriber};

/// Owns every header sync component of the node.
///
/// The service is built once and shared; `start` and `stop` are its only
/// lifecycle transitions. Components are created during `start` and kept even
/// if a later step fails, so `stop` can release whatever was brought up.
pub struct HeaderSyncService {
    genesis: GenesisDoc,
    p2p: Arc<dyn P2pClient>,
    store: Arc<HeaderStore>,
    trusted_hash: Option<String>,
    block_time: Duration,
    metrics: Option<SharedMetrics>,
    cancel: CancellationToken,
    state: Mutex<ServiceState>,
    subscriber: OnceLock<Arc<dyn Subscriber>>,
    exchange_server: OnceLock<Arc<dyn ExchangeServer>>,
    exchange: OnceLock<Arc<dyn Exchange>>,
    syncer: OnceLock<Arc<HeaderSyncer>>,
    syncer_status: SyncerStatus,
}

impl HeaderSyncService {
    pub fn builder() -> HeaderSyncServiceBuilder {
        HeaderSyncServiceBuilder::default()
    }

    pub fn state(&self) -> ServiceState {
        *self.state.lock()
    }

    pub fn store(&self) -> Arc<HeaderStore> {
        self.store.clone()
    }

    pub fn genesis(&self) -> &GenesisDoc {
        &self.genesis
    }

    pub fn syncer(&self) -> Option<Arc<HeaderSyncer>> {
        self.syncer.get().cloned()
    }

    pub async fn is_syncer_started(&self) -> bool {
        self.syncer_status.is_started().await
    }

    pub async fn start(&self) -> Result<(), SyncServiceError> {
        self.transition(ServiceState::Starting)?;
        let result = self.start_components().await;
        if let Err(err) = &result {
            error!(%err, "Header sync service failed to start");
            self.force_state(ServiceState::Failed);
        }
        result
    }

    async fn start_components(&self) -> Result<(), SyncServiceError> {
        let chain_id = self.genesis.chain_id.as_str();

        let subscriber = self
            .p2p
            .new_subscriber(chain_id)
            .map_err(ComponentError::Subscriber)?;
        let subscriber = install(&self.subscriber, subscriber, "gossip subscriber")?;
        subscriber.start().await.map_err(ComponentError::Subscriber)?;
        let subscription = subscriber.subscribe().map_err(ComponentError::Subscriber)?;

        self.store.start().map_err(ComponentError::Store)?;

        let network_id = self.p2p.info().network;
        let server = self
            .p2p
            .new_exchange_server(self.store.clone(), &network_id)
            .map_err(ComponentError::ExchangeServer)?;
        let server = install(&self.exchange_server, server, "exchange server")?;
        server.start().await.map_err(ComponentError::ExchangeServer)?;

        let peers = self.p2p.peer_ids();
        let exchange = self
            .p2p
            .new_exchange(peers.clone(), &network_id, chain_id, self.p2p.connection_gater())
            .map_err(ComponentError::Exchange)?;
        let exchange = install(&self.exchange, exchange, "exchange")?.clone();
        exchange.start().await.map_err(ComponentError::Exchange)?;

        let syncer = HeaderSyncer::new(
            exchange.clone(),
            self.store.clone(),
            subscription,
            SyncerOptions::new(self.block_time),
            self.cancel.child_token(),
        )
        .with_metrics(self.metrics.clone());
        install(&self.syncer, Arc::new(syncer), "syncer")?;

        info!(
            chain_id,
            network = %network_id,
            peers = peers.len(),
            height = self.store.height(),
            "Header sync components started"
        );

        if self.store.height() > 0 {
            self.transition(ServiceState::Running)?;
            return self.start_syncer().await;
        }

        self.transition(ServiceState::Bootstrapping)?;
        self.bootstrap(exchange.as_ref(), &peers).await?;
        self.transition(ServiceState::Running)
    }

    /// Gives an empty store its first header.
    async fn bootstrap(&self, exchange: &dyn Exchange, peers: &[PeerId]) -> Result<(), SyncServiceError> {
        if peers.is_empty() {
            info!("No peers known, waiting for the first locally produced header");
            return Ok(());
        }

        let header = match &self.trusted_hash {
            Some(value) => {
                let hash: Hash = value
                    .parse()
                    .map_err(|err: containers::types::ParseBytesError| SyncServiceError::InvalidTrustedHash {
                        value: value.clone(),
                        reason: err.to_string(),
                    })?;
                exchange
                    .get(&hash)
                    .await
                    .map_err(|source| SyncServiceError::TrustedHeaderFetch { hash, source })?
            }
            None => {
                let height = self.genesis.initial_height;
                exchange
                    .get_by_height(height)
                    .await
                    .map_err(|source| SyncServiceError::GenesisHeaderUnavailable { height, source })?
            }
        };

        self.init_store(&header)?;
        self.start_syncer().await
    }

    fn init_store(&self, header: &SignedHeader) -> Result<(), SyncServiceError> {
        match self.store.init(header) {
            Ok(()) => {
                info!(height = header.height(), hash = %header.hash(), "Initialized header store");
                if let Some(metrics) = &self.metrics {
                    metrics.set_header_store_height(header.height());
                }
                Ok(())
            }
            // Startup bootstrap and broadcast-and-init may race for the first header.
            Err(StoreError::AlreadyInitialized(height)) => {
                debug!(height, "Header store already initialized");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Starts the syncer if it exists and has not been started yet.
    ///
    /// Before `start` has built the syncer this does nothing; `start` starts it
    /// once it finds the store initialized.
    pub async fn start_syncer(&self) -> Result<(), SyncServiceError> {
        let Some(syncer) = self.syncer.get() else {
            debug!("Syncer not built yet, deferring start");
            return Ok(());
        };

        let started = self
            .syncer_status
            .start_once(|| syncer.start())
            .await
            .map_err(ComponentError::Syncer)?;
        if started {
            info!(height = self.store.height(), "Started header syncer");
            if let Some(metrics) = &self.metrics {
                metrics.set_syncer_started();
            }
        } else {
            debug!("Header syncer already started");
        }
        Ok(())
    }

    /// Stores a locally produced header when it starts the chain, then gossips it.
    ///
    /// Broadcast failures are logged and counted but not returned; failing to
    /// initialize the store is.
    pub async fn write_to_store_and_broadcast(&self, header: &SignedHeader) -> Result<(), SyncServiceError> {
        if header.height() == self.genesis.initial_height && !self.store.is_initialized() {
            self.init_store(header)?;
            self.start_syncer().await?;
        }

        let Some(subscriber) = self.subscriber.get() else {
            warn!(height = header.height(), "Gossip subscriber not started, header not broadcast");
            return Ok(());
        };
        if let Err(err) = subscriber.broadcast(header).await {
            error!(height = header.height(), %err, "Failed to broadcast header");
            if let Some(metrics) = &self.metrics {
                metrics.inc_header_broadcast_failures();
            }
        }
        Ok(())
    }

    /// Stops every component that was brought up and reports all failures together.
    pub async fn stop(&self) -> Result<(), SyncServiceError> {
        let mut errors = Vec::new();

        if let Err(err) = self.store.stop() {
            errors.push(ComponentError::Store(err));
        }
        if let Some(server) = self.exchange_server.get()
            && let Err(err) = server.stop().await
        {
            errors.push(ComponentError::ExchangeServer(err));
        }
        if let Some(exchange) = self.exchange.get()
            && let Err(err) = exchange.stop().await
        {
            errors.push(ComponentError::Exchange(err));
        }
        if let Some(subscriber) = self.subscriber.get()
            && let Err(err) = subscriber.stop().await
        {
            errors.push(ComponentError::Subscriber(err));
        }
        if self.syncer_status.is_started().await
            && let Some(syncer) = self.syncer.get()
            && let Err(err) = syncer.stop().await
        {
            errors.push(ComponentError::Syncer(err));
        }

        self.force_state(ServiceState::Stopped);

        if errors.is_empty() {
            info!("Header sync service stopped");
            Ok(())
        } else {
            for err in &errors {
                warn!(%err, "Header sync component failed to stop");
            }
            Err(SyncServiceError::Shutdown(errors))
        }
    }

    fn transition(&self, to: ServiceState) -> Result<(), SyncServiceError> {
        let mut state = self.state.lock();
        if !state.can_transition_to(to) {
            return Err(SyncServiceError::InvalidTransition { from: *state, to });
        }
        debug!(from = ?*state, ?to, "Header sync service state change");
        *state = to;
        Ok(())
    }

    fn force_state(&self, to: ServiceState) {
        *self.state.lock() = to;
    }
}

/// Stores a freshly built component; a slot is filled at most once per service.
pub(super) fn install<'a, T>(slot: &'a OnceLock<T>, value: T, component: &'static str) -> Result<&'a T, SyncServiceError> {
    slot.set(value)
        .map_err(|_| SyncServiceError::ComponentAlreadySet(component))?;
    slot.get().ok_or(SyncServiceError::ComponentAlreadySet(component))
}

#[derive(Default)]
pub struct HeaderSyncServiceBuilder {
    genesis: Option<GenesisDoc>,
    p2p: Option<Arc<dyn P2pClient>>,
    datastore: Option<Arc<dyn Datastore>>,
    store_prefix: Option<String>,
    trusted_hash: Option<String>,
    block_time: Option<Duration>,
    metrics: Option<SharedMetrics>,
    cancel: Option<CancellationToken>,
}

impl HeaderSyncServiceBuilder {
    pub fn genesis(mut self, genesis: GenesisDoc) -> Self {
        self.genesis = Some(genesis);
        self
    }

    pub fn p2p_client(mut self, p2p: Arc<dyn P2pClient>) -> Self {
        self.p2p = Some(p2p);
        self
    }

    pub fn datastore(mut self, datastore: Arc<dyn Datastore>) -> Self {
        self.datastore = Some(datastore);
        self
    }

    pub fn store_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.store_prefix = Some(prefix.into());
        self
    }

    /// Hex hash of the header to bootstrap from. Empty means none.
    pub fn trusted_hash(mut self, hash: impl Into<String>) -> Self {
        let hash = hash.into();
        self.trusted_hash = (!hash.is_empty()).then_some(hash);
        self
    }

    pub fn block_time(mut self, block_time: Duration) -> Self {
        self.block_time = Some(block_time);
        self
    }

    pub fn metrics(mut self, metrics: Option<SharedMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn build(self) -> Result<HeaderSyncService, SyncServiceError> {
        let genesis = self.genesis.ok_or(SyncServiceError::MissingGenesis)?;
        let p2p = self.p2p.ok_or(SyncServiceError::MissingP2pClient)?;
        let datastore = self.datastore.ok_or(SyncServiceError::MissingDatastore)?;
        let prefix = self.store_prefix.as_deref().unwrap_or(DEFAULT_STORE_PREFIX);
        let store = HeaderStore::with_prefix(datastore, prefix)?;

        Ok(HeaderSyncService {
            genesis,
            p2p,
            store: Arc::new(store),
            trusted_hash: self.trusted_hash,
            block_time: self.block_time.unwrap_or(DEFAULT_BLOCK_TIME),
            metrics: self.metrics,
            cancel: self.cancel.unwrap_or_default(),
            state: Mutex::new(ServiceState::Created),
            subscriber: OnceLock::new(),
            exchange_server: OnceLock::new(),
            exchange: OnceLock::new(),
            syncer: OnceLock::new(),
            syncer_status: SyncerStatus::new(),
        })
    }
}
