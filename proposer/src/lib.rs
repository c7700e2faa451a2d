//! Block production for aggregator nodes.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use containers::header::unix_nanos;
use containers::{Block, Data, GenesisDoc, Header, SignedHeader, ValidatorSet};
use da::{DataAvailabilityClient, StatusCode};
use ed25519_dalek::SigningKey;
use networking::HeaderSyncService;
use networking::sync::SyncServiceError;
use storage::{HeaderStore, StoreError};
use thiserror::Error;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub mod keys;

pub use keys::{load_or_generate_seed, load_signing_key, KeyError};

pub const DEFAULT_DA_SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ProposerError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("DA rejected block {height}: {message}")]
    DaSubmit { height: u64, message: String },
    #[error("failed to publish header: {0}")]
    Publish(#[from] SyncServiceError),
}

/// Where produced headers go once their block is on the DA layer.
#[async_trait]
pub trait HeaderPublisher: Send + Sync {
    async fn publish(&self, header: &SignedHeader) -> Result<(), SyncServiceError>;
}

#[async_trait]
impl HeaderPublisher for HeaderSyncService {
    async fn publish(&self, header: &SignedHeader) -> Result<(), SyncServiceError> {
        self.write_to_store_and_broadcast(header).await
    }
}

/// Signs blocks for a single-sequencer chain.
pub struct Proposer {
    key: SigningKey,
    validators: ValidatorSet,
    chain_id: String,
    initial_height: u64,
}

impl Proposer {
    pub fn new(key: SigningKey, genesis: &GenesisDoc) -> Self {
        let validators = ValidatorSet::single(&key.verifying_key());
        Self {
            key,
            validators,
            chain_id: genesis.chain_id.clone(),
            initial_height: genesis.initial_height,
        }
    }

    pub fn validators(&self) -> &ValidatorSet {
        &self.validators
    }

    pub fn address(&self) -> Vec<u8> {
        self.validators
            .proposer()
            .map(|validator| validator.address.clone())
            .unwrap_or_default()
    }

    /// Next block on top of `parent`, or the first block of the chain.
    pub fn build_block(&self, parent: Option<&SignedHeader>, txs: Vec<Vec<u8>>, now: SystemTime) -> Block {
        let address = self.address();
        let mut header = match parent {
            Some(parent) => Header::child_of(parent, &address),
            None => Header {
                height: self.initial_height,
                chain_id: self.chain_id.clone(),
                proposer_address: address,
                ..Default::default()
            },
        };
        // Time never goes backwards, even if the local clock does.
        header.time = match parent {
            Some(parent) => unix_nanos(now).max(parent.header.time + 1),
            None => unix_nanos(now),
        };

        let data = Data::new(txs);
        header.data_hash = data.hash().to_vec();
        header.aggregators_hash = self.validators.hash().to_vec();
        let signed = SignedHeader::sign(header, &self.key, Some(self.validators.clone()));
        Block::new(signed, data)
    }
}

/// Produces one block per block time: DA first, then the header network.
pub struct Aggregator<P: HeaderPublisher> {
    proposer: Proposer,
    store: Arc<HeaderStore>,
    da: Arc<DataAvailabilityClient>,
    publisher: Arc<P>,
    block_time: Duration,
    da_submit_timeout: Duration,
    initial_height: u64,
}

impl<P: HeaderPublisher> Aggregator<P> {
    pub fn new(
        proposer: Proposer,
        store: Arc<HeaderStore>,
        da: Arc<DataAvailabilityClient>,
        publisher: Arc<P>,
        block_time: Duration,
    ) -> Self {
        let initial_height = proposer.initial_height;
        Self {
            proposer,
            store,
            da,
            publisher,
            block_time,
            da_submit_timeout: DEFAULT_DA_SUBMIT_TIMEOUT,
            initial_height,
        }
    }

    pub fn with_da_submit_timeout(mut self, timeout: Duration) -> Self {
        self.da_submit_timeout = timeout;
        self
    }

    /// Builds, submits and publishes the next block.
    ///
    /// Nothing is published or stored unless the DA layer accepted the block.
    pub async fn produce_block(&self) -> Result<Block, ProposerError> {
        let parent = if self.store.is_initialized() {
            Some(self.store.head()?)
        } else {
            None
        };
        let block = self.proposer.build_block(parent.as_ref(), Vec::new(), SystemTime::now());
        let height = block.height();

        let submitted = self
            .da
            .submit_block(&block, Instant::now() + self.da_submit_timeout)
            .await;
        if submitted.base.code != StatusCode::Success {
            return Err(ProposerError::DaSubmit {
                height,
                message: submitted.base.message,
            });
        }
        debug!(height, da_height = submitted.base.da_height, "Block accepted by DA layer");

        let header = &block.signed_header;
        if height > self.initial_height {
            self.store.append(std::slice::from_ref(header))?;
        }
        self.publisher.publish(header).await?;

        info!(height, hash = %block.hash(), "Produced block");
        Ok(block)
    }

    pub async fn run(self, cancel: CancellationToken) {
        info!(block_time = ?self.block_time, "Starting aggregator");
        let mut interval = tokio::time::interval(self.block_time);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.produce_block() => {
                    if let Err(err) = result {
                        warn!(%err, "Block production failed, retrying next block time");
                    }
                }
            }
        }
        info!("Aggregator stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use containers::testing::TEST_CHAIN_ID;
    use da::DaLayer;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use storage::{Datastore, MemoryDatastore};

    /// Records headers and initializes the store the way broadcast-and-init does.
    struct RecordingPublisher {
        store: Arc<HeaderStore>,
        initial_height: u64,
        published: Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl HeaderPublisher for RecordingPublisher {
        async fn publish(&self, header: &SignedHeader) -> Result<(), SyncServiceError> {
            if header.height() == self.initial_height && !self.store.is_initialized() {
                self.store.init(header)?;
            }
            self.published.lock().push(header.height());
            Ok(())
        }
    }

    fn proposer(initial_height: u64) -> Proposer {
        Proposer::new(
            SigningKey::from_bytes(&[7; 32]),
            &GenesisDoc::new(TEST_CHAIN_ID, initial_height),
        )
    }

    fn aggregator(da: DataAvailabilityClient, initial_height: u64) -> (Aggregator<RecordingPublisher>, Arc<RecordingPublisher>) {
        let datastore: Arc<dyn Datastore> = Arc::new(MemoryDatastore::new());
        let store = Arc::new(HeaderStore::new(datastore).unwrap());
        store.start().unwrap();
        let publisher = Arc::new(RecordingPublisher {
            store: store.clone(),
            initial_height,
            published: Mutex::new(Vec::new()),
        });
        let aggregator = Aggregator::new(
            proposer(initial_height),
            store,
            Arc::new(da),
            publisher.clone(),
            Duration::from_millis(10),
        );
        (aggregator, publisher)
    }

    fn mock_da() -> DataAvailabilityClient {
        let mut da = DataAvailabilityClient::from_name("mock").unwrap();
        da.init(Default::default(), &[], Arc::new(MemoryDatastore::new()))
            .unwrap();
        da
    }

    #[test]
    fn blocks_chain_onto_their_parent() {
        let proposer = proposer(1);
        let now = SystemTime::now();
        let first = proposer.build_block(None, vec![b"tx".to_vec()], now);
        let second = proposer.build_block(Some(&first.signed_header), Vec::new(), now);

        assert_eq!(first.height(), 1);
        assert_eq!(second.height(), 2);
        assert!(first.validate_basic().is_ok());
        assert!(second.signed_header.header.time > first.signed_header.header.time);
        assert!(first.signed_header.verify_at(&second.signed_header, now).is_ok());
    }

    #[test]
    fn first_block_starts_at_initial_height() {
        let block = proposer(7).build_block(None, Vec::new(), SystemTime::now());
        assert_eq!(block.height(), 7);
        assert_eq!(block.signed_header.chain_id(), TEST_CHAIN_ID);
        assert!(block.signed_header.header.last_header_hash.is_empty());
    }

    #[tokio::test]
    async fn produced_blocks_extend_the_store() {
        let (aggregator, publisher) = aggregator(mock_da(), 1);

        for _ in 0..3 {
            aggregator.produce_block().await.unwrap();
        }

        assert_eq!(aggregator.store.height(), 3);
        assert_eq!(*publisher.published.lock(), vec![1, 2, 3]);
        let retrieved = aggregator
            .da
            .retrieve_blocks(2, Instant::now() + Duration::from_secs(1))
            .await;
        assert_eq!(retrieved.blocks[0].height(), 2);
    }

    #[tokio::test]
    async fn rejected_submission_publishes_nothing() {
        // Uninitialized mock DA has no datastore and refuses every block.
        let da = DataAvailabilityClient::new(DaLayer::from_name("mock").unwrap());
        let (aggregator, publisher) = aggregator(da, 1);

        let result = aggregator.produce_block().await;

        assert!(matches!(result, Err(ProposerError::DaSubmit { height: 1, .. })));
        assert!(publisher.published.lock().is_empty());
        assert!(!aggregator.store.is_initialized());
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let (aggregator, publisher) = aggregator(mock_da(), 1);
        let store = aggregator.store.clone();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(aggregator.run(cancel.clone()));

        tokio::time::timeout(Duration::from_secs(5), async {
            while store.height() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();

        assert!(publisher.published.lock().len() >= 2);
    }
}
