use std::sync::Arc;

use async_trait::async_trait;
use storage::{HeaderStore, StoreError};
use tracing::{debug, info, warn};

use super::{ExchangeServer, P2pClient, P2pError};
use crate::network::NetworkHandle;
use crate::req_resp::{HeaderRequest, HeaderResponse, MAX_REQUEST_HEADERS};

/// Answers inbound header requests. Runs on the swarm task, so it must not block.
pub trait RequestHandler: Send + Sync {
    fn handle(&self, request: HeaderRequest) -> HeaderResponse;
}

pub struct StoreRequestHandler {
    store: Arc<HeaderStore>,
}

impl StoreRequestHandler {
    pub fn new(store: Arc<HeaderStore>) -> Self {
        Self { store }
    }
}

impl RequestHandler for StoreRequestHandler {
    fn handle(&self, request: HeaderRequest) -> HeaderResponse {
        serve_request(&self.store, &request)
    }
}

pub fn serve_request(store: &HeaderStore, request: &HeaderRequest) -> HeaderResponse {
    let result = match request {
        HeaderRequest::Head => store.head().map(|head| vec![head]),
        HeaderRequest::ByHash(hash) => store.get(hash).map(|header| vec![header]),
        HeaderRequest::Range { from, amount } => {
            if *amount == 0 || *amount > MAX_REQUEST_HEADERS {
                return HeaderResponse::Invalid;
            }
            let head = store.height();
            if *from == 0 || *from > head {
                return HeaderResponse::NotFound;
            }
            let to = from.saturating_add(*amount).min(head + 1);
            store.get_range_by_height(*from, to)
        }
    };

    match result {
        Ok(headers) => HeaderResponse::Headers(headers),
        Err(StoreError::NotFound | StoreError::NotInitialized) => HeaderResponse::NotFound,
        Err(err) => {
            warn!(?request, %err, "Failed to serve header request");
            HeaderResponse::NotFound
        }
    }
}

/// Serves the local header store to peers over the header exchange protocol.
pub struct P2pExchangeServer {
    network: NetworkHandle,
    store: Arc<HeaderStore>,
}

impl P2pExchangeServer {
    pub fn new(network: NetworkHandle, store: Arc<HeaderStore>) -> Self {
        Self { network, store }
    }
}

#[async_trait]
impl ExchangeServer for P2pExchangeServer {
    async fn start(&self) -> Result<(), P2pError> {
        let handler = Arc::new(StoreRequestHandler::new(self.store.clone()));
        self.network.set_request_handler(Some(handler)).await?;
        info!(network = %self.network.info().network, "Header exchange server started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), P2pError> {
        self.network.set_request_handler(None).await?;
        debug!("Header exchange server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use containers::testing::{TEST_CHAIN_ID, TestProposer};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use storage::MemoryDatastore;

    fn store_with(count: usize) -> (Arc<HeaderStore>, Vec<containers::SignedHeader>) {
        let store = Arc::new(HeaderStore::new(Arc::new(MemoryDatastore::new())).unwrap());
        store.start().unwrap();
        let chain = TestProposer::new(1).chain(TEST_CHAIN_ID, 1, count);
        store.init(&chain[0]).unwrap();
        store.append(&chain[1..]).unwrap();
        (store, chain)
    }

    #[test]
    fn head_request_returns_store_head() {
        let (store, chain) = store_with(4);
        assert_eq!(
            serve_request(&store, &HeaderRequest::Head),
            HeaderResponse::Headers(vec![chain[3].clone()])
        );
    }

    #[test]
    fn by_hash_request_finds_header() {
        let (store, chain) = store_with(3);
        assert_eq!(
            serve_request(&store, &HeaderRequest::ByHash(chain[1].hash())),
            HeaderResponse::Headers(vec![chain[1].clone()])
        );

        let unknown = containers::Hash::digest(b"unknown");
        assert_eq!(serve_request(&store, &HeaderRequest::ByHash(unknown)), HeaderResponse::NotFound);
    }

    #[test]
    fn range_is_clamped_to_head() {
        let (store, chain) = store_with(5);
        let response = serve_request(&store, &HeaderRequest::Range { from: 3, amount: 10 });
        assert_eq!(response, HeaderResponse::Headers(chain[2..].to_vec()));
    }

    #[rstest]
    #[case::above_head(HeaderRequest::Range { from: 6, amount: 1 }, HeaderResponse::NotFound)]
    #[case::height_zero(HeaderRequest::Range { from: 0, amount: 1 }, HeaderResponse::NotFound)]
    #[case::empty(HeaderRequest::Range { from: 1, amount: 0 }, HeaderResponse::Invalid)]
    #[case::too_large(HeaderRequest::Range { from: 1, amount: MAX_REQUEST_HEADERS + 1 }, HeaderResponse::Invalid)]
    fn bad_ranges(#[case] request: HeaderRequest, #[case] expected: HeaderResponse) {
        let (store, _) = store_with(5);
        assert_eq!(serve_request(&store, &request), expected);
    }

    #[test]
    fn uninitialized_store_has_no_head() {
        let store = HeaderStore::new(Arc::new(MemoryDatastore::new())).unwrap();
        assert_eq!(serve_request(&store, &HeaderRequest::Head), HeaderResponse::NotFound);
    }
}
