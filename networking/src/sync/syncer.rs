use std::sync::Arc;
use std::time::Duration;

use containers::SignedHeader;
use metrics::SharedMetrics;
use parking_lot::{Mutex, RwLock};
use storage::HeaderStore;
use tokio::select;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::config::MAX_HEADERS_PER_REQUEST;
use super::error::SyncError;
use super::states::SyncState;
use crate::header::{Exchange, P2pError, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncerOptions {
    /// Expected block interval; the network head is polled once per interval.
    pub block_time: Duration,
    pub max_request_size: u64,
}

impl SyncerOptions {
    pub fn new(block_time: Duration) -> Self {
        Self {
            block_time,
            max_request_size: MAX_HEADERS_PER_REQUEST,
        }
    }
}

/// Catch-up syncer: fills the gap between the local head and newer headers
/// seen on gossip or reported by peers.
pub struct HeaderSyncer {
    engine: Mutex<Option<SyncEngine>>,
    state: Arc<RwLock<SyncState>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HeaderSyncer {
    pub fn new(
        exchange: Arc<dyn Exchange>,
        store: Arc<HeaderStore>,
        subscription: Subscription,
        options: SyncerOptions,
        cancel: CancellationToken,
    ) -> Self {
        let state = Arc::new(RwLock::new(SyncState::Idle));
        let engine = SyncEngine {
            exchange,
            store,
            subscription,
            options: SyncerOptions {
                max_request_size: options.max_request_size.clamp(1, MAX_HEADERS_PER_REQUEST),
                ..options
            },
            state: state.clone(),
            metrics: None,
        };
        Self {
            engine: Mutex::new(Some(engine)),
            state,
            cancel,
            task: Mutex::new(None),
        }
    }

    pub fn with_metrics(self, metrics: Option<SharedMetrics>) -> Self {
        if let Some(engine) = self.engine.lock().as_mut() {
            engine.metrics = metrics;
        }
        self
    }

    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Spawns the sync loop. A syncer runs at most once.
    pub fn start(&self) -> Result<(), SyncError> {
        let engine = self.engine.lock().take().ok_or(SyncError::AlreadyStarted)?;
        let task = tokio::spawn(engine.run(self.cancel.clone()));
        *self.task.lock() = Some(task);
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), SyncError> {
        self.cancel.cancel();
        let task = self.task.lock().take().ok_or(SyncError::NotRunning)?;
        task.await.map_err(|err| SyncError::Task(err.to_string()))
    }
}

enum SyncEvent {
    Gossip(SignedHeader),
    Tick,
}

struct SyncEngine {
    exchange: Arc<dyn Exchange>,
    store: Arc<HeaderStore>,
    subscription: Subscription,
    options: SyncerOptions,
    state: Arc<RwLock<SyncState>>,
    metrics: Option<SharedMetrics>,
}

impl SyncEngine {
    async fn run(mut self, cancel: CancellationToken) {
        let mut tick = interval(self.options.block_time);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut gossip_open = true;

        info!(block_time = ?self.options.block_time, "Header syncer started");

        loop {
            let event = select! {
                _ = cancel.cancelled() => break,
                header = self.subscription.next_header(), if gossip_open => match header {
                    Some(header) => SyncEvent::Gossip(header),
                    None => {
                        warn!("Header gossip closed, relying on peer polling");
                        gossip_open = false;
                        continue;
                    }
                },
                _ = tick.tick() => SyncEvent::Tick,
            };

            let step = async {
                match event {
                    SyncEvent::Gossip(header) => self.on_gossip_header(header).await,
                    SyncEvent::Tick => self.poll_network_head().await,
                }
            };

            select! {
                _ = cancel.cancelled() => break,
                _ = step => {}
            }
        }

        info!("Header syncer stopped");
    }

    async fn on_gossip_header(&mut self, header: SignedHeader) {
        let Ok(head) = self.store.head() else {
            trace!(height = header.height(), "Store not initialized, ignoring gossiped header");
            return;
        };
        if header.height() <= head.height() {
            trace!(height = header.height(), head = head.height(), "Ignoring known header");
            return;
        }
        self.verify_and_sync(head, header, "gossip").await;
    }

    async fn poll_network_head(&mut self) {
        let network_head = match self.exchange.head().await {
            Ok(head) => head,
            Err(P2pError::NoPeers) => {
                trace!("No peers to poll for the network head");
                return;
            }
            Err(err) => {
                debug!(%err, "Failed to fetch network head");
                return;
            }
        };
        let Ok(head) = self.store.head() else {
            return;
        };
        if network_head.height() <= head.height() {
            self.set_state(SyncState::Synced);
            return;
        }
        self.verify_and_sync(head, network_head, "exchange").await;
    }

    async fn verify_and_sync(&mut self, head: SignedHeader, target: SignedHeader, source: &str) {
        if let Err(err) = head.verify(&target) {
            warn!(height = target.height(), source, %err, "Rejected header");
            if let Some(metrics) = &self.metrics {
                metrics.inc_headers_rejected(err.kind());
            }
            return;
        }
        self.sync_to(head.height(), target, source).await;
    }

    /// Appends the headers between `from` and `target`, then `target` itself.
    async fn sync_to(&mut self, from: u64, target: SignedHeader, source: &str) {
        self.set_state(SyncState::Syncing);

        let mut current = from;
        while current + 1 < target.height() {
            let amount = (target.height() - current - 1).min(self.options.max_request_size);
            let headers = match self.exchange.get_range_by_height(current + 1, amount).await {
                Ok(headers) => headers,
                Err(err) => {
                    warn!(from = current + 1, amount, %err, "Failed to fetch missing headers");
                    break;
                }
            };
            self.append(&headers, "exchange");

            let height = self.store.height();
            if height <= current {
                warn!(height, target = target.height(), "Catch-up made no progress");
                break;
            }
            current = height;
        }

        if target.height() > self.store.height() {
            self.append(std::slice::from_ref(&target), source);
        }

        let height = self.store.height();
        if height >= target.height() {
            debug!(height, "Caught up");
            self.set_state(SyncState::Synced);
        } else {
            self.set_state(SyncState::Idle);
        }
    }

    fn append(&self, headers: &[SignedHeader], source: &str) {
        match self.store.append(headers) {
            Ok(count) => {
                if count > 0 {
                    debug!(count, height = self.store.height(), source, "Appended headers");
                }
                if let Some(metrics) = &self.metrics {
                    metrics.inc_headers_appended(source, count);
                }
            }
            Err(err) => {
                warn!(source, %err, height = self.store.height(), "Failed to append headers");
                if let (Some(metrics), storage::StoreError::Verify(err)) = (&self.metrics, &err) {
                    metrics.inc_headers_rejected(err.kind());
                }
            }
        }
        if let Some(metrics) = &self.metrics {
            metrics.set_header_store_height(self.store.height());
        }
    }

    fn set_state(&self, next: SyncState) {
        let mut state = self.state.write();
        if *state != next && state.can_transition_to(next) {
            trace!(from = ?*state, to = ?next, "Sync state change");
            *state = next;
        }
    }
}
