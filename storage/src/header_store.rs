use crate::datastore::{Batch, Batching, Datastore};
use crate::error::StoreError;
use containers::{Hash, SignedHeader, VerifyError};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_STORE_PREFIX: &str = "headerSync";

/// Append-only store of verified headers, indexed by height and by hash.
///
/// Layout under `/{prefix}`: `/height/{n}` holds the header hash, `/hash/{hex}`
/// the encoded header and `/head` the hash of the highest header.
pub struct HeaderStore {
    ds: Arc<dyn Batching>,
    prefix: String,
    head: RwLock<Option<SignedHeader>>,
    write_lock: Mutex<()>,
    started: AtomicBool,
}

impl HeaderStore {
    pub fn new(ds: Arc<dyn Datastore>) -> Result<Self, StoreError> {
        Self::with_prefix(ds, DEFAULT_STORE_PREFIX)
    }

    pub fn with_prefix(ds: Arc<dyn Datastore>, prefix: &str) -> Result<Self, StoreError> {
        let ds = ds.into_batching().ok_or(StoreError::NotBatching)?;
        Ok(Self {
            ds,
            prefix: prefix.to_string(),
            head: RwLock::new(None),
            write_lock: Mutex::new(()),
            started: AtomicBool::new(false),
        })
    }

    fn key(&self, suffix: &str) -> Vec<u8> {
        format!("/{}/{}", self.prefix, suffix).into_bytes()
    }

    fn head_key(&self) -> Vec<u8> {
        self.key("head")
    }

    fn height_key(&self, height: u64) -> Vec<u8> {
        self.key(&format!("height/{height}"))
    }

    fn hash_key(&self, hash: &Hash) -> Vec<u8> {
        self.key(&format!("hash/{hash}"))
    }

    /// Loads a previously persisted head, if any.
    pub fn start(&self) -> Result<(), StoreError> {
        if let Some(head) = self.load_head()? {
            info!(height = head.height(), hash = %head.hash(), "Loaded header store head");
            *self.head.write() = Some(head);
        }
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn stop(&self) -> Result<(), StoreError> {
        self.started.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Height of the head; 0 while the store is uninitialized.
    pub fn height(&self) -> u64 {
        self.head.read().as_ref().map_or(0, SignedHeader::height)
    }

    pub fn is_initialized(&self) -> bool {
        self.head.read().is_some()
    }

    pub fn head(&self) -> Result<SignedHeader, StoreError> {
        self.head.read().clone().ok_or(StoreError::NotInitialized)
    }

    /// Initializes an empty store with its first, trusted header.
    pub fn init(&self, initial: &SignedHeader) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();

        let current = self.height();
        if current > 0 {
            return Err(StoreError::AlreadyInitialized(current));
        }
        if let Some(persisted) = self.load_head()? {
            return Err(StoreError::AlreadyInitialized(persisted.height()));
        }

        initial
            .validate_basic()
            .map_err(|err| VerifyError::new(initial.height(), err))?;
        self.write(std::slice::from_ref(initial))?;
        *self.head.write() = Some(initial.clone());

        info!(height = initial.height(), hash = %initial.hash(), "Initialized header store");
        Ok(())
    }

    /// Appends headers in height order and returns how many were added.
    ///
    /// Headers at or below the head are skipped, so the first header written at
    /// a height wins. Every other header must follow the head directly and
    /// verify against it. On failure the headers accepted before the offending
    /// one are still persisted.
    pub fn append(&self, headers: &[SignedHeader]) -> Result<usize, StoreError> {
        let _guard = self.write_lock.lock();

        let mut head = self.head()?;
        let mut accepted = Vec::with_capacity(headers.len());
        let mut failure = None;

        for header in headers {
            if header.height() <= head.height() {
                debug!(height = header.height(), head = head.height(), "Skipping known header");
                continue;
            }
            if header.height() != head.height() + 1 {
                failure = Some(StoreError::NonAdjacent {
                    head: head.height(),
                    height: header.height(),
                });
                break;
            }
            if let Err(err) = head.verify(header) {
                failure = Some(err.into());
                break;
            }
            accepted.push(header.clone());
            head = header.clone();
        }

        if !accepted.is_empty() {
            self.write(&accepted)?;
            *self.head.write() = Some(head);
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(accepted.len()),
        }
    }

    pub fn has(&self, hash: &Hash) -> Result<bool, StoreError> {
        self.ds.has(&self.hash_key(hash))
    }

    pub fn get(&self, hash: &Hash) -> Result<SignedHeader, StoreError> {
        let raw = self
            .ds
            .get(&self.hash_key(hash))?
            .ok_or(StoreError::NotFound)?;
        Ok(SignedHeader::from_bytes(&raw)?)
    }

    pub fn get_by_height(&self, height: u64) -> Result<SignedHeader, StoreError> {
        let key = self.height_key(height);
        let raw = self.ds.get(&key)?.ok_or(StoreError::NotFound)?;
        let hash = self.decode_hash(&key, &raw)?;
        self.get(&hash)
    }

    /// Headers in `[from, to)`. Fails with `NotFound` if any is missing.
    pub fn get_range_by_height(&self, from: u64, to: u64) -> Result<Vec<SignedHeader>, StoreError> {
        (from..to).map(|height| self.get_by_height(height)).collect()
    }

    fn load_head(&self) -> Result<Option<SignedHeader>, StoreError> {
        let key = self.head_key();
        match self.ds.get(&key)? {
            Some(raw) => {
                let hash = self.decode_hash(&key, &raw)?;
                self.get(&hash).map(Some)
            }
            None => Ok(None),
        }
    }

    fn decode_hash(&self, key: &[u8], raw: &[u8]) -> Result<Hash, StoreError> {
        Hash::try_from(raw).map_err(|_| StoreError::Corrupted {
            key: String::from_utf8_lossy(key).into_owned(),
        })
    }

    fn write(&self, headers: &[SignedHeader]) -> Result<(), StoreError> {
        let Some(last) = headers.last() else {
            return Ok(());
        };

        let mut batch = Batch::new();
        for header in headers {
            let hash = header.hash();
            batch.put(self.hash_key(&hash), header.to_bytes());
            batch.put(self.height_key(header.height()), hash.to_vec());
        }
        batch.put(self.head_key(), last.hash().to_vec());

        self.ds.write_batch(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDatastore;
    use containers::testing::{TestProposer, TEST_CHAIN_ID};
    use pretty_assertions::assert_eq;

    /// Datastore without batch support.
    struct PlainDatastore;

    impl Datastore for PlainDatastore {
        fn get(&self, _key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
            Ok(None)
        }

        fn put(&self, _key: &[u8], _value: Vec<u8>) -> Result<(), StoreError> {
            Ok(())
        }

        fn delete(&self, _key: &[u8]) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn store() -> (Arc<MemoryDatastore>, HeaderStore) {
        let ds = Arc::new(MemoryDatastore::new());
        let store = HeaderStore::new(ds.clone()).unwrap();
        store.start().unwrap();
        (ds, store)
    }

    #[test]
    fn rejects_non_batching_datastore() {
        assert!(matches!(
            HeaderStore::new(Arc::new(PlainDatastore)),
            Err(StoreError::NotBatching)
        ));
    }

    #[test]
    fn starts_uninitialized() {
        let (_, store) = store();
        assert_eq!(store.height(), 0);
        assert!(matches!(store.head(), Err(StoreError::NotInitialized)));
        assert!(matches!(store.append(&[]), Err(StoreError::NotInitialized)));
    }

    #[test]
    fn init_only_once() {
        let (_, store) = store();
        let chain = TestProposer::new(1).chain(TEST_CHAIN_ID, 1, 2);

        store.init(&chain[0]).unwrap();
        assert_eq!(store.height(), 1);
        assert_eq!(store.head().unwrap(), chain[0]);
        assert!(matches!(
            store.init(&chain[1]),
            Err(StoreError::AlreadyInitialized(1))
        ));
    }

    #[test]
    fn appends_and_indexes_headers() {
        let (_, store) = store();
        let chain = TestProposer::new(1).chain(TEST_CHAIN_ID, 1, 5);
        store.init(&chain[0]).unwrap();

        assert_eq!(store.append(&chain[1..]).unwrap(), 4);
        assert_eq!(store.height(), 5);
        assert_eq!(store.get_by_height(3).unwrap(), chain[2]);
        assert_eq!(store.get(&chain[4].hash()).unwrap(), chain[4]);
        assert!(store.has(&chain[1].hash()).unwrap());
        assert_eq!(store.get_range_by_height(2, 5).unwrap(), chain[1..4].to_vec());
        assert!(matches!(store.get_by_height(6), Err(StoreError::NotFound)));
    }

    #[test]
    fn first_writer_wins_at_a_height() {
        let (_, store) = store();
        let proposer = TestProposer::new(1);
        let chain = proposer.chain(TEST_CHAIN_ID, 1, 3);
        store.init(&chain[0]).unwrap();
        store.append(&chain[1..2]).unwrap();

        let mut rival = chain[1].clone();
        rival.header.time += 1;
        let rival = proposer.resign(&rival);

        assert_eq!(store.append(&[rival]).unwrap(), 0);
        assert_eq!(store.get_by_height(2).unwrap(), chain[1]);
        assert_eq!(store.append(&chain[1..]).unwrap(), 1);
        assert_eq!(store.height(), 3);
    }

    #[test]
    fn rejects_gap_but_keeps_verified_prefix() {
        let (_, store) = store();
        let chain = TestProposer::new(1).chain(TEST_CHAIN_ID, 1, 5);
        store.init(&chain[0]).unwrap();

        let batch = vec![chain[1].clone(), chain[3].clone()];
        assert!(matches!(
            store.append(&batch),
            Err(StoreError::NonAdjacent { head: 2, height: 4 })
        ));
        assert_eq!(store.height(), 2);
    }

    #[test]
    fn rejects_header_that_fails_verification() {
        let (_, store) = store();
        let proposer = TestProposer::new(1);
        let chain = proposer.chain(TEST_CHAIN_ID, 1, 2);
        store.init(&chain[0]).unwrap();

        let mut forged = chain[1].clone();
        forged.header.last_header_hash = vec![0; 32];
        let forged = proposer.resign(&forged);

        assert!(matches!(store.append(&[forged]), Err(StoreError::Verify(_))));
        assert_eq!(store.height(), 1);
    }

    #[test]
    fn restart_reloads_head() {
        let (ds, store) = store();
        let chain = TestProposer::new(1).chain(TEST_CHAIN_ID, 10, 3);
        store.init(&chain[0]).unwrap();
        store.append(&chain[1..]).unwrap();
        store.stop().unwrap();

        let reopened = HeaderStore::new(ds).unwrap();
        assert_eq!(reopened.height(), 0);
        reopened.start().unwrap();
        assert_eq!(reopened.height(), 12);
        assert_eq!(reopened.head().unwrap(), chain[2]);
        assert!(matches!(
            reopened.init(&chain[0]),
            Err(StoreError::AlreadyInitialized(12))
        ));
    }

    #[test]
    fn prefixes_isolate_stores() {
        let ds = Arc::new(MemoryDatastore::new());
        let a = HeaderStore::with_prefix(ds.clone(), "a").unwrap();
        let b = HeaderStore::with_prefix(ds.clone(), "b").unwrap();
        let header = TestProposer::new(1).first_header(TEST_CHAIN_ID, 1);

        a.init(&header).unwrap();
        b.start().unwrap();
        assert_eq!(b.height(), 0);
        assert!(!b.has(&header.hash()).unwrap());
        assert_eq!(ds.keys_with_prefix(b"/a/").len(), 3);
    }
}
