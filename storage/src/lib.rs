pub mod datastore;
pub mod error;
pub mod header_store;
pub mod memory;

pub use datastore::{Batch, Batching, Datastore};
pub use error::StoreError;
pub use header_store::{HeaderStore, DEFAULT_STORE_PREFIX};
pub use memory::MemoryDatastore;
