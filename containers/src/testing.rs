//! Deterministic signed header chains for tests.

use crate::block::{Block, Data};
use crate::header::{unix_nanos, Header};
use crate::signed_header::SignedHeader;
use crate::validator::ValidatorSet;
use ed25519_dalek::SigningKey;
use std::time::{Duration, SystemTime};

pub const TEST_CHAIN_ID: &str = "test-rollup";

const BLOCK_INTERVAL: Duration = Duration::from_secs(1);

/// Start of test chains: a day in the past, so that long chains never drift
/// into the future.
pub fn base_time() -> u64 {
    unix_nanos(SystemTime::now() - Duration::from_secs(24 * 60 * 60))
}

pub struct TestProposer {
    key: SigningKey,
    validators: ValidatorSet,
}

impl TestProposer {
    pub fn new(seed: u8) -> Self {
        let key = SigningKey::from_bytes(&[seed; 32]);
        let validators = ValidatorSet::single(&key.verifying_key());
        Self { key, validators }
    }

    pub fn key(&self) -> &SigningKey {
        &self.key
    }

    pub fn validators(&self) -> &ValidatorSet {
        &self.validators
    }

    pub fn address(&self) -> Vec<u8> {
        self.validators.validators[0].address.clone()
    }

    pub fn first_block(&self, chain_id: &str, height: u64, txs: Vec<Vec<u8>>) -> Block {
        let header = Header {
            height,
            chain_id: chain_id.to_string(),
            time: base_time(),
            proposer_address: self.address(),
            ..Default::default()
        };
        self.seal(header, Data::new(txs))
    }

    pub fn next_block(&self, parent: &SignedHeader, txs: Vec<Vec<u8>>) -> Block {
        let mut header = Header::child_of(parent, &self.address());
        header.time = parent.header.time + BLOCK_INTERVAL.as_nanos() as u64;
        self.seal(header, Data::new(txs))
    }

    pub fn first_header(&self, chain_id: &str, height: u64) -> SignedHeader {
        self.first_block(chain_id, height, Vec::new()).signed_header
    }

    pub fn next_header(&self, parent: &SignedHeader) -> SignedHeader {
        self.next_block(parent, Vec::new()).signed_header
    }

    /// `count` linked headers starting at `from_height`.
    pub fn chain(&self, chain_id: &str, from_height: u64, count: usize) -> Vec<SignedHeader> {
        let mut headers = Vec::with_capacity(count);
        if count == 0 {
            return headers;
        }
        headers.push(self.first_header(chain_id, from_height));
        while headers.len() < count {
            let next = self.next_header(&headers[headers.len() - 1]);
            headers.push(next);
        }
        headers
    }

    /// Re-signs a header after a test tampered with it.
    pub fn resign(&self, signed: &SignedHeader) -> SignedHeader {
        SignedHeader::sign(signed.header.clone(), &self.key, signed.validators.clone())
    }

    fn seal(&self, mut header: Header, data: Data) -> Block {
        header.aggregators_hash = self.validators.hash().to_vec();
        header.data_hash = data.hash().to_vec();
        let signed = SignedHeader::sign(header, &self.key, Some(self.validators.clone()));
        Block::new(signed, data)
    }
}
