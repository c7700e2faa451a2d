use std::future::Future;
use std::sync::Arc;

use containers::{Block, NamespaceId};
use metrics::SharedMetrics;
use storage::Datastore;
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::avail::AvailClient;
use crate::error::DaError;
use crate::mock::MockDataAvailabilityLayerClient;
use crate::types::{BaseResult, ResultCheckBlock, ResultRetrieveBlocks, ResultSubmitBlock, StatusCode};
use crate::{BlockRetriever, DataAvailabilityLayerClient};

/// Supported data availability backends.
pub enum DaLayer {
    Mock(MockDataAvailabilityLayerClient),
    Avail(AvailClient),
}

impl DaLayer {
    pub fn from_name(name: &str) -> Result<Self, DaError> {
        match name {
            "mock" => Ok(DaLayer::Mock(MockDataAvailabilityLayerClient::new())),
            "avail" => Ok(DaLayer::Avail(AvailClient::new())),
            other => Err(DaError::UnknownLayer(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DaLayer::Mock(_) => "mock",
            DaLayer::Avail(_) => "avail",
        }
    }

    fn client(&self) -> &dyn DataAvailabilityLayerClient {
        match self {
            DaLayer::Mock(client) => client,
            DaLayer::Avail(client) => client,
        }
    }

    fn client_mut(&mut self) -> &mut dyn DataAvailabilityLayerClient {
        match self {
            DaLayer::Mock(client) => client,
            DaLayer::Avail(client) => client,
        }
    }

    fn retriever(&self) -> &dyn BlockRetriever {
        match self {
            DaLayer::Mock(client) => client,
            DaLayer::Avail(client) => client,
        }
    }
}

/// The node's data availability client.
///
/// Every request takes a deadline; a request still pending at the deadline
/// is abandoned and reported as [`StatusCode::Error`].
pub struct DataAvailabilityClient {
    layer: DaLayer,
    metrics: Option<SharedMetrics>,
}

impl DataAvailabilityClient {
    pub fn new(layer: DaLayer) -> Self {
        Self { layer, metrics: None }
    }

    pub fn from_name(name: &str) -> Result<Self, DaError> {
        DaLayer::from_name(name).map(Self::new)
    }

    pub fn with_metrics(mut self, metrics: Option<SharedMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Lets shutdown interrupt backend waits that outlive a single request.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        match &mut self.layer {
            DaLayer::Avail(client) => client.set_cancellation(cancel),
            DaLayer::Mock(_) => {}
        }
        self
    }

    pub fn name(&self) -> &'static str {
        self.layer.name()
    }

    pub fn layer(&self) -> &DaLayer {
        &self.layer
    }

    pub fn init(&mut self, namespace: NamespaceId, config: &[u8], store: Arc<dyn Datastore>) -> Result<(), DaError> {
        self.layer.client_mut().init(namespace, config, store)
    }

    pub async fn start(&self) -> Result<(), DaError> {
        self.layer.client().start().await
    }

    pub async fn stop(&self) -> Result<(), DaError> {
        self.layer.client().stop().await
    }

    pub async fn submit_block(&self, block: &Block, deadline: Instant) -> ResultSubmitBlock {
        let result = self
            .bounded("submit_block", deadline, self.layer.client().submit_block(block), |r| &r.base)
            .await;
        result.unwrap_or_else(ResultSubmitBlock::from)
    }

    pub async fn check_block_availability(&self, da_height: u64, deadline: Instant) -> ResultCheckBlock {
        let result = self
            .bounded(
                "check_block_availability",
                deadline,
                self.layer.client().check_block_availability(da_height),
                |r| &r.base,
            )
            .await;
        result.unwrap_or_else(ResultCheckBlock::from)
    }

    pub async fn retrieve_blocks(&self, da_height: u64, deadline: Instant) -> ResultRetrieveBlocks {
        let result = self
            .bounded(
                "retrieve_blocks",
                deadline,
                self.layer.retriever().retrieve_blocks(da_height),
                |r| &r.base,
            )
            .await;
        result.unwrap_or_else(ResultRetrieveBlocks::from)
    }

    /// Runs `request` until `deadline`, recording its outcome.
    async fn bounded<T>(
        &self,
        operation: &str,
        deadline: Instant,
        request: impl Future<Output = T>,
        base: impl Fn(&T) -> &BaseResult,
    ) -> Result<T, BaseResult> {
        let started = Instant::now();
        let outcome = match timeout_at(deadline, request).await {
            Ok(result) => Ok(result),
            Err(_) => {
                warn!(layer = self.name(), operation, "Data availability request hit its deadline");
                Err(BaseResult::error(format!("{operation}: deadline exceeded")))
            }
        };

        if let Some(metrics) = &self.metrics {
            let code = match &outcome {
                Ok(result) => base(result).code,
                Err(_) => StatusCode::Error,
            };
            metrics.observe_da_request(operation, code.as_str(), started.elapsed());
        }
        outcome
    }
}
