use crate::error::ValidationError;
use crate::header::Header;
use crate::types::Hash;
use ed25519_dalek::SIGNATURE_LENGTH;
use prost::Message;

/// Signatures of the block producer over a header.
#[derive(Clone, PartialEq, Eq, Message)]
pub struct Commit {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub signatures: Vec<Vec<u8>>,
}

/// What `commit_hash` digests. Never sent over the wire.
#[derive(Clone, PartialEq, Message)]
struct CommitDigest {
    #[prost(uint64, tag = "1")]
    height: u64,
    #[prost(bytes = "vec", tag = "2")]
    header_hash: Vec<u8>,
    #[prost(uint64, tag = "3")]
    time: u64,
    #[prost(bytes = "vec", tag = "4")]
    proposer_address: Vec<u8>,
    #[prost(bytes = "vec", repeated, tag = "5")]
    signatures: Vec<Vec<u8>>,
}

impl Commit {
    pub fn new(signatures: Vec<Vec<u8>>) -> Self {
        Self { signatures }
    }

    pub fn validate_basic(&self) -> Result<(), ValidationError> {
        for (index, signature) in self.signatures.iter().enumerate() {
            if signature.len() != SIGNATURE_LENGTH {
                return Err(ValidationError::InvalidSignatureLength {
                    index,
                    len: signature.len(),
                });
            }
        }
        Ok(())
    }

    /// Hash binding this commit to `header` and to the proposer of the next block.
    pub fn commit_hash(&self, header: &Header, proposer_address: &[u8]) -> Hash {
        let digest = CommitDigest {
            height: header.height,
            header_hash: header.hash().to_vec(),
            time: header.time,
            proposer_address: proposer_address.to_vec(),
            signatures: self.signatures.clone(),
        };
        Hash::digest(&digest.encode_to_vec())
    }
}
