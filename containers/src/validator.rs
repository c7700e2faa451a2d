use crate::error::ValidationError;
use crate::types::Hash;
use ed25519_dalek::{VerifyingKey, PUBLIC_KEY_LENGTH};
use prost::Message;

pub const ADDRESS_LENGTH: usize = 20;

/// Address of a validator: the first 20 bytes of SHA-256 of its public key.
pub fn address_from_pub_key(pub_key: &[u8]) -> Vec<u8> {
    Hash::digest(pub_key).as_bytes()[..ADDRESS_LENGTH].to_vec()
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct Validator {
    #[prost(bytes = "vec", tag = "1")]
    pub address: Vec<u8>,
    /// Raw ed25519 public key.
    #[prost(bytes = "vec", tag = "2")]
    pub pub_key: Vec<u8>,
    #[prost(int64, tag = "3")]
    pub voting_power: i64,
}

impl Validator {
    pub fn new(key: &VerifyingKey, voting_power: i64) -> Self {
        let pub_key = key.as_bytes().to_vec();
        Self {
            address: address_from_pub_key(&pub_key),
            pub_key,
            voting_power,
        }
    }

    pub fn verifying_key(&self) -> Result<VerifyingKey, ValidationError> {
        let bytes: [u8; PUBLIC_KEY_LENGTH] = self
            .pub_key
            .as_slice()
            .try_into()
            .map_err(|_| ValidationError::InvalidPublicKey)?;
        VerifyingKey::from_bytes(&bytes).map_err(|_| ValidationError::InvalidPublicKey)
    }

    fn validate_basic(&self) -> Result<(), String> {
        if self.pub_key.len() != PUBLIC_KEY_LENGTH {
            return Err(format!("public key has length {}", self.pub_key.len()));
        }
        if self.address != address_from_pub_key(&self.pub_key) {
            return Err("address does not match public key".into());
        }
        if self.voting_power < 0 {
            return Err(format!("negative voting power {}", self.voting_power));
        }
        Ok(())
    }
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct ValidatorSet {
    #[prost(message, repeated, tag = "1")]
    pub validators: Vec<Validator>,
    #[prost(message, optional, tag = "2")]
    pub proposer: Option<Validator>,
}

impl ValidatorSet {
    pub fn new(validators: Vec<Validator>) -> Self {
        let proposer = validators.first().cloned();
        Self { validators, proposer }
    }

    pub fn single(key: &VerifyingKey) -> Self {
        Self::new(vec![Validator::new(key, 1)])
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// The designated proposer, falling back to the first validator.
    pub fn proposer(&self) -> Option<&Validator> {
        self.proposer.as_ref().or_else(|| self.validators.first())
    }

    /// Hash over the member list; the proposer choice does not affect it.
    pub fn hash(&self) -> Hash {
        let members = ValidatorSet {
            validators: self.validators.clone(),
            proposer: None,
        };
        Hash::digest(&members.encode_to_vec())
    }

    pub fn validate_basic(&self) -> Result<(), ValidationError> {
        if self.is_empty() {
            return Err(ValidationError::EmptyValidatorSet);
        }
        for (index, validator) in self.validators.iter().enumerate() {
            validator
                .validate_basic()
                .map_err(|reason| ValidationError::InvalidValidator { index, reason })?;
        }
        if let Some(proposer) = &self.proposer {
            if !self.validators.contains(proposer) {
                return Err(ValidationError::ProposerNotInSet);
            }
        }
        Ok(())
    }
}
