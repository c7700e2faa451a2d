use crate::error::ValidationError;
use crate::signed_header::SignedHeader;
use crate::types::Hash;
use prost::Message;

/// Opaque application transactions of a block.
#[derive(Clone, PartialEq, Eq, Message)]
pub struct Data {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub txs: Vec<Vec<u8>>,
}

impl Data {
    pub fn new(txs: Vec<Vec<u8>>) -> Self {
        Self { txs }
    }

    pub fn hash(&self) -> Hash {
        Hash::digest(&self.encode_to_vec())
    }
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct Block {
    #[prost(message, required, tag = "1")]
    pub signed_header: SignedHeader,
    #[prost(message, required, tag = "2")]
    pub data: Data,
}

impl Block {
    pub fn new(signed_header: SignedHeader, data: Data) -> Self {
        Self {
            signed_header,
            data,
        }
    }

    pub fn height(&self) -> u64 {
        self.signed_header.height()
    }

    pub fn hash(&self) -> Hash {
        self.signed_header.hash()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, prost::DecodeError> {
        Self::decode(bytes)
    }

    pub fn validate_basic(&self) -> Result<(), ValidationError> {
        self.signed_header.validate_basic()?;
        let data_hash = &self.signed_header.header.data_hash;
        if !data_hash.is_empty() && !self.data.hash().matches(data_hash) {
            return Err(ValidationError::DataHashMismatch);
        }
        Ok(())
    }
}
