use crate::datastore::{Batch, BatchOp, Batching, Datastore};
use crate::error::StoreError;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// In-memory `Datastore`; batches are applied under a single write lock.
#[derive(Debug, Default)]
pub struct MemoryDatastore {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Keys starting with `prefix`, in order.
    pub fn keys_with_prefix(&self, prefix: &[u8]) -> Vec<Vec<u8>> {
        self.entries
            .read()
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect()
    }
}

impl Datastore for MemoryDatastore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), StoreError> {
        self.entries.write().insert(key.to_vec(), value);
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn into_batching(self: Arc<Self>) -> Option<Arc<dyn Batching>> {
        Some(self)
    }
}

impl Batching for MemoryDatastore {
    fn write_batch(&self, batch: Batch) -> Result<(), StoreError> {
        let mut entries = self.entries.write();
        for op in batch.into_ops() {
            match op {
                BatchOp::Put(key, value) => {
                    entries.insert(key, value);
                }
                BatchOp::Delete(key) => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn batch_applies_puts_and_deletes() {
        let store = MemoryDatastore::new();
        store.put(b"/a/1", vec![1]).unwrap();

        let mut batch = Batch::new();
        batch.put(b"/a/2".to_vec(), vec![2]);
        batch.delete(b"/a/1".to_vec());
        store.write_batch(batch).unwrap();

        assert_eq!(store.get(b"/a/1").unwrap(), None);
        assert_eq!(store.get(b"/a/2").unwrap(), Some(vec![2]));
        assert!(store.has(b"/a/2").unwrap());
    }

    #[test]
    fn keys_with_prefix_stops_at_prefix_boundary() {
        let store = MemoryDatastore::new();
        store.put(b"/a/1", vec![]).unwrap();
        store.put(b"/a/2", vec![]).unwrap();
        store.put(b"/b/1", vec![]).unwrap();

        assert_eq!(
            store.keys_with_prefix(b"/a/"),
            vec![b"/a/1".to_vec(), b"/a/2".to_vec()]
        );
    }

    #[test]
    fn memory_store_is_batching() {
        let store: Arc<dyn Datastore> = Arc::new(MemoryDatastore::new());
        assert!(store.into_batching().is_some());
    }
}
