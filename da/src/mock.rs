use std::sync::Arc;

use async_trait::async_trait;
use containers::{Block, Hash, NamespaceId};
use parking_lot::Mutex;
use storage::{Batch, Batching, Datastore, StoreError};
use tracing::debug;

use crate::error::DaError;
use crate::types::{BaseResult, ResultCheckBlock, ResultRetrieveBlocks, ResultSubmitBlock};
use crate::{BlockRetriever, DataAvailabilityLayerClient};

const MOCK_PREFIX: &str = "/da/mock";
const NEXT_HEIGHT_KEY: &[u8] = b"/da/mock/next_height";
const FIRST_DA_HEIGHT: u64 = 1;

/// In-process data availability layer for tests and local networks.
///
/// Each submitted block gets the next DA height, starting at 1. Blocks and
/// the height counter live in the datastore given to `init`, so a client
/// re-created over the same store continues where the last one stopped.
pub struct MockDataAvailabilityLayerClient {
    store: Option<Arc<dyn Batching>>,
    namespace: NamespaceId,
    next_height: Mutex<u64>,
}

impl MockDataAvailabilityLayerClient {
    pub fn new() -> Self {
        Self {
            store: None,
            namespace: NamespaceId::default(),
            next_height: Mutex::new(FIRST_DA_HEIGHT),
        }
    }

    fn height_key(da_height: u64) -> Vec<u8> {
        format!("{MOCK_PREFIX}/height/{da_height}").into_bytes()
    }

    fn block_key(hash: &Hash) -> Vec<u8> {
        format!("{MOCK_PREFIX}/block/{hash}").into_bytes()
    }

    fn store(&self) -> Result<&Arc<dyn Batching>, DaError> {
        self.store.as_ref().ok_or(DaError::NotInitialized)
    }

    fn load_next_height(store: &dyn Batching) -> Result<u64, DaError> {
        let Some(raw) = store.get(NEXT_HEIGHT_KEY)? else {
            return Ok(FIRST_DA_HEIGHT);
        };
        let bytes: [u8; 8] = raw
            .as_slice()
            .try_into()
            .map_err(|_| DaError::InvalidData(format!("next DA height is {} bytes", raw.len())))?;
        Ok(u64::from_be_bytes(bytes))
    }

    /// Writes the block, its height entry and the advanced counter in one batch.
    fn put_block(&self, block: &Block) -> Result<u64, DaError> {
        let store = self.store()?;
        let hash = block.hash();

        let mut next_height = self.next_height.lock();
        let da_height = *next_height;
        let mut batch = Batch::new();
        batch.put(Self::block_key(&hash), block.to_bytes());
        batch.put(Self::height_key(da_height), hash.to_vec());
        batch.put(NEXT_HEIGHT_KEY, (da_height + 1).to_be_bytes().to_vec());
        store.write_batch(batch)?;
        *next_height = da_height + 1;

        Ok(da_height)
    }

    fn get_blocks(&self, da_height: u64) -> Result<Vec<Block>, DaError> {
        let store = self.store()?;
        let Some(raw_hash) = store.get(&Self::height_key(da_height))? else {
            return Ok(Vec::new());
        };
        let hash = Hash::try_from(raw_hash.as_slice())
            .map_err(|err| DaError::InvalidData(format!("hash at DA height {da_height}: {err}")))?;
        let raw = store
            .get(&Self::block_key(&hash))?
            .ok_or_else(|| DaError::InvalidData(format!("missing block {hash}")))?;
        let block = Block::from_bytes(&raw).map_err(|err| DaError::InvalidData(err.to_string()))?;
        Ok(vec![block])
    }
}

impl Default for MockDataAvailabilityLayerClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataAvailabilityLayerClient for MockDataAvailabilityLayerClient {
    fn init(&mut self, namespace: NamespaceId, _config: &[u8], store: Arc<dyn Datastore>) -> Result<(), DaError> {
        let store = store.into_batching().ok_or(StoreError::NotBatching)?;
        let next_height = Self::load_next_height(store.as_ref())?;
        debug!(next_height, "Mock data availability layer initialized");
        *self.next_height.get_mut() = next_height;
        self.namespace = namespace;
        self.store = Some(store);
        Ok(())
    }

    async fn start(&self) -> Result<(), DaError> {
        debug!(namespace = %self.namespace, "Mock data availability layer starting");
        Ok(())
    }

    async fn stop(&self) -> Result<(), DaError> {
        debug!("Mock data availability layer stopped");
        Ok(())
    }

    async fn submit_block(&self, block: &Block) -> ResultSubmitBlock {
        debug!(height = block.height(), "Submitting block to mock DA layer");
        match self.put_block(block) {
            Ok(da_height) => BaseResult::success(da_height).with_message("OK").into(),
            Err(err) => BaseResult::error(err.to_string()).into(),
        }
    }

    async fn check_block_availability(&self, da_height: u64) -> ResultCheckBlock {
        let available = self
            .store()
            .and_then(|store| store.has(&Self::height_key(da_height)).map_err(DaError::from));
        match available {
            Ok(data_available) => ResultCheckBlock {
                base: BaseResult::success(da_height),
                data_available,
            },
            Err(err) => BaseResult::error(err.to_string()).into(),
        }
    }
}

#[async_trait]
impl BlockRetriever for MockDataAvailabilityLayerClient {
    async fn retrieve_blocks(&self, da_height: u64) -> ResultRetrieveBlocks {
        match self.get_blocks(da_height) {
            Ok(blocks) => ResultRetrieveBlocks {
                base: BaseResult::success(da_height),
                blocks,
            },
            Err(err) => BaseResult::error(err.to_string()).into(),
        }
    }
}
