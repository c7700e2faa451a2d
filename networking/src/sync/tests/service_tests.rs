use std::sync::{Arc, OnceLock};
use std::sync::atomic::Ordering;
use std::time::Duration;

use containers::GenesisDoc;
use containers::testing::{TEST_CHAIN_ID, TestProposer};
use pretty_assertions::assert_eq;
use storage::{Datastore, HeaderStore, MemoryDatastore, StoreError};

use super::mocks::{MockExchange, MockP2pClient, wait_for_height};
use crate::header::P2pClient;
use crate::sync::service::install;
use crate::sync::{ComponentError, HeaderSyncService, ServiceState, SyncError, SyncServiceError};

const BLOCK_TIME: Duration = Duration::from_millis(20);

fn genesis() -> GenesisDoc {
    GenesisDoc::new(TEST_CHAIN_ID, 1)
}

fn service_with(p2p: Arc<MockP2pClient>, datastore: Arc<dyn Datastore>, trusted_hash: &str) -> HeaderSyncService {
    HeaderSyncService::builder()
        .genesis(genesis())
        .p2p_client(p2p)
        .datastore(datastore)
        .trusted_hash(trusted_hash)
        .block_time(BLOCK_TIME)
        .build()
        .unwrap()
}

fn service(p2p: Arc<MockP2pClient>) -> HeaderSyncService {
    service_with(p2p, Arc::new(MemoryDatastore::new()), "")
}

/// Keyed store without batch support.
#[derive(Default)]
struct PlainDatastore(MemoryDatastore);

impl Datastore for PlainDatastore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.0.get(key)
    }

    fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), StoreError> {
        self.0.put(key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.0.delete(key)
    }
}

#[test]
fn test_builder_requires_dependencies() {
    let p2p: Arc<dyn P2pClient> = MockP2pClient::new(TEST_CHAIN_ID, 0, MockExchange::with_headers(Vec::new()));

    let missing_genesis = HeaderSyncService::builder()
        .p2p_client(p2p.clone())
        .datastore(Arc::new(MemoryDatastore::new()))
        .build();
    assert!(matches!(missing_genesis, Err(SyncServiceError::MissingGenesis)));

    let missing_p2p = HeaderSyncService::builder()
        .genesis(genesis())
        .datastore(Arc::new(MemoryDatastore::new()))
        .build();
    assert!(matches!(missing_p2p, Err(SyncServiceError::MissingP2pClient)));

    let not_batching = HeaderSyncService::builder()
        .genesis(genesis())
        .p2p_client(p2p)
        .datastore(Arc::new(PlainDatastore::default()))
        .build();
    assert!(matches!(
        not_batching,
        Err(SyncServiceError::Store(StoreError::NotBatching))
    ));
}

#[tokio::test]
async fn test_start_without_peers_then_self_initialize() {
    let p2p = MockP2pClient::new(TEST_CHAIN_ID, 0, MockExchange::with_headers(Vec::new()));
    let service = service(p2p.clone());

    service.start().await.unwrap();
    assert_eq!(service.state(), ServiceState::Running);
    assert_eq!(service.store().height(), 0);
    assert!(!service.is_syncer_started().await);

    let first = TestProposer::new(1).first_header(TEST_CHAIN_ID, 1);
    service.write_to_store_and_broadcast(&first).await.unwrap();

    assert_eq!(service.store().height(), 1);
    assert!(service.is_syncer_started().await);
    assert_eq!(p2p.subscriber.broadcast_heights(), vec![1]);

    service.stop().await.unwrap();
    assert_eq!(service.state(), ServiceState::Stopped);
}

#[tokio::test]
async fn test_start_from_trusted_hash_then_catch_up() {
    let chain = TestProposer::new(1).chain(TEST_CHAIN_ID, 1, 60);
    let exchange = MockExchange::with_headers(chain[..50].to_vec());
    let p2p = MockP2pClient::new(TEST_CHAIN_ID, 2, exchange.clone());
    let trusted = chain[49].hash().to_string();
    let service = service_with(p2p, Arc::new(MemoryDatastore::new()), &trusted);

    service.start().await.unwrap();

    let store = service.store();
    assert_eq!(store.get_by_height(50).unwrap(), chain[49]);
    assert!(matches!(store.get_by_height(49), Err(StoreError::NotFound)));
    assert!(service.is_syncer_started().await);

    for header in &chain[50..] {
        exchange.push(header.clone());
    }
    wait_for_height(&store, 60).await;
    assert_eq!(store.head().unwrap(), chain[59]);

    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_start_with_peers_fetches_genesis_header() {
    let chain = TestProposer::new(1).chain(TEST_CHAIN_ID, 1, 3);
    let p2p = MockP2pClient::new(TEST_CHAIN_ID, 1, MockExchange::with_headers(chain.clone()));
    let service = service(p2p);

    service.start().await.unwrap();

    let store = service.store();
    assert_eq!(store.get_by_height(1).unwrap(), chain[0]);
    assert!(service.is_syncer_started().await);
    wait_for_height(&store, 3).await;

    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_missing_genesis_header_fails_startup() {
    let p2p = MockP2pClient::new(TEST_CHAIN_ID, 2, MockExchange::with_headers(Vec::new()));
    let service = service(p2p.clone());

    let err = service.start().await.unwrap_err();
    assert!(matches!(
        err,
        SyncServiceError::GenesisHeaderUnavailable { height: 1, .. }
    ));
    assert!(err.to_string().contains("proposer"));
    assert_eq!(service.state(), ServiceState::Failed);
    assert_eq!(service.store().height(), 0);

    // Everything brought up before the failure is still released.
    service.stop().await.unwrap();
    assert_eq!(p2p.subscriber.stops.load(Ordering::SeqCst), 1);
    assert_eq!(p2p.server.stops.load(Ordering::SeqCst), 1);
    assert_eq!(p2p.exchange.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_invalid_trusted_hash_fails_startup() {
    let p2p = MockP2pClient::new(TEST_CHAIN_ID, 1, MockExchange::with_headers(Vec::new()));
    let service = service_with(p2p, Arc::new(MemoryDatastore::new()), "not-hex");

    let err = service.start().await.unwrap_err();
    assert!(matches!(err, SyncServiceError::InvalidTrustedHash { .. }));
}

#[tokio::test]
async fn test_unknown_trusted_hash_fails_startup() {
    let p2p = MockP2pClient::new(TEST_CHAIN_ID, 1, MockExchange::with_headers(Vec::new()));
    let trusted = containers::Hash::digest(b"unknown").to_string();
    let service = service_with(p2p, Arc::new(MemoryDatastore::new()), &trusted);

    let err = service.start().await.unwrap_err();
    assert!(matches!(err, SyncServiceError::TrustedHeaderFetch { .. }));
}

#[tokio::test]
async fn test_initialized_store_starts_syncer_directly() {
    let chain = TestProposer::new(1).chain(TEST_CHAIN_ID, 1, 2);
    let datastore = Arc::new(MemoryDatastore::new());
    {
        let store = HeaderStore::new(datastore.clone()).unwrap();
        store.init(&chain[0]).unwrap();
        store.append(&chain[1..]).unwrap();
    }

    // Peers without headers: bootstrap would fail if it ran.
    let p2p = MockP2pClient::new(TEST_CHAIN_ID, 1, MockExchange::with_headers(Vec::new()));
    let service = service_with(p2p, datastore, "");

    service.start().await.unwrap();
    assert_eq!(service.state(), ServiceState::Running);
    assert_eq!(service.store().height(), 2);
    assert!(service.is_syncer_started().await);

    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_header_written_before_start_is_picked_up() {
    let p2p = MockP2pClient::new(TEST_CHAIN_ID, 0, MockExchange::with_headers(Vec::new()));
    let service = service(p2p.clone());
    let first = TestProposer::new(1).first_header(TEST_CHAIN_ID, 1);

    service.write_to_store_and_broadcast(&first).await.unwrap();
    assert_eq!(service.store().height(), 1);
    assert!(!service.is_syncer_started().await);
    assert!(p2p.subscriber.broadcast_heights().is_empty());

    service.start().await.unwrap();
    assert!(service.is_syncer_started().await);

    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_syncer_starts_run_once() {
    let p2p = MockP2pClient::new(TEST_CHAIN_ID, 0, MockExchange::with_headers(Vec::new()));
    let service = service(p2p);
    service.start().await.unwrap();
    service
        .store()
        .init(&TestProposer::new(1).first_header(TEST_CHAIN_ID, 1))
        .unwrap();

    let (first, second) = tokio::join!(service.start_syncer(), service.start_syncer());
    first.unwrap();
    second.unwrap();
    service.start_syncer().await.unwrap();

    let syncer = service.syncer().unwrap();
    assert!(matches!(syncer.start(), Err(SyncError::AlreadyStarted)));

    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_broadcast_failure_is_not_returned() {
    let p2p = MockP2pClient::new(TEST_CHAIN_ID, 0, MockExchange::with_headers(Vec::new()));
    p2p.subscriber.fail_broadcast.store(true, Ordering::SeqCst);
    let service = service(p2p.clone());
    service.start().await.unwrap();

    let chain = TestProposer::new(1).chain(TEST_CHAIN_ID, 1, 2);
    service.write_to_store_and_broadcast(&chain[0]).await.unwrap();
    service.write_to_store_and_broadcast(&chain[1]).await.unwrap();

    assert_eq!(service.store().height(), 1);
    assert!(p2p.subscriber.broadcast_heights().is_empty());

    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_aggregates_component_errors() {
    let p2p = MockP2pClient::new(TEST_CHAIN_ID, 0, MockExchange::with_headers(Vec::new()));
    p2p.subscriber.fail_stop.store(true, Ordering::SeqCst);
    p2p.exchange.fail_stop.store(true, Ordering::SeqCst);
    let service = service(p2p.clone());
    service.start().await.unwrap();

    let errors = match service.stop().await {
        Err(SyncServiceError::Shutdown(errors)) => errors,
        other => panic!("expected shutdown error, got {other:?}"),
    };
    assert_eq!(errors.len(), 2);
    assert!(matches!(errors[0], ComponentError::Exchange(_)));
    assert!(matches!(errors[1], ComponentError::Subscriber(_)));
    assert_eq!(p2p.server.stops.load(Ordering::SeqCst), 1);
    assert_eq!(service.state(), ServiceState::Stopped);
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let p2p = MockP2pClient::new(TEST_CHAIN_ID, 0, MockExchange::with_headers(Vec::new()));
    let service = service(p2p);
    service.start().await.unwrap();

    assert!(matches!(
        service.start().await,
        Err(SyncServiceError::InvalidTransition { .. })
    ));
    service.stop().await.unwrap();
}

#[test]
fn component_slots_are_filled_once() {
    let slot = OnceLock::new();
    assert_eq!(*install(&slot, 1, "exchange").unwrap(), 1);
    assert!(matches!(
        install(&slot, 2, "exchange"),
        Err(SyncServiceError::ComponentAlreadySet("exchange"))
    ));
    assert_eq!(slot.get(), Some(&1));
}
