use crate::validator::{Validator, ValidatorSet, address_from_pub_key};
use ed25519_dalek::PUBLIC_KEY_LENGTH;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenesisError {
    #[error("failed to read genesis file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse genesis file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("genesis chain id is empty")]
    EmptyChainId,
    #[error("genesis validator {index}: {reason}")]
    InvalidValidator { index: usize, reason: String },
}

fn default_initial_height() -> u64 {
    1
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisValidator {
    /// Hex encoded ed25519 public key.
    pub pub_key: String,
    #[serde(default = "default_power")]
    pub power: i64,
    #[serde(default)]
    pub name: String,
}

fn default_power() -> i64 {
    1
}

/// Trust anchor of the chain. Loaded once at startup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisDoc {
    pub chain_id: String,
    #[serde(default = "default_initial_height", with = "crate::serde_helpers::quoted_u64")]
    pub initial_height: u64,
    /// Unix seconds.
    #[serde(default)]
    pub genesis_time: u64,
    #[serde(default)]
    pub validators: Vec<GenesisValidator>,
    #[serde(default)]
    pub app_hash: String,
}

impl GenesisDoc {
    pub fn new(chain_id: impl Into<String>, initial_height: u64) -> Self {
        Self {
            chain_id: chain_id.into(),
            initial_height,
            genesis_time: 0,
            validators: Vec::new(),
            app_hash: String::new(),
        }
    }

    /// Reads a YAML or JSON genesis file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, GenesisError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut genesis: GenesisDoc = serde_yaml::from_reader(reader)?;
        genesis.validate_and_complete()?;
        Ok(genesis)
    }

    pub fn validate_and_complete(&mut self) -> Result<(), GenesisError> {
        if self.chain_id.is_empty() {
            return Err(GenesisError::EmptyChainId);
        }
        if self.initial_height == 0 {
            self.initial_height = 1;
        }
        self.validator_set().map(|_| ())
    }

    /// `None` for a based rollup without genesis validators.
    pub fn validator_set(&self) -> Result<Option<ValidatorSet>, GenesisError> {
        if self.validators.is_empty() {
            return Ok(None);
        }

        let mut validators = Vec::with_capacity(self.validators.len());
        for (index, validator) in self.validators.iter().enumerate() {
            let pub_key = hex::decode(validator.pub_key.trim_start_matches("0x")).map_err(|err| {
                GenesisError::InvalidValidator {
                    index,
                    reason: err.to_string(),
                }
            })?;
            if pub_key.len() != PUBLIC_KEY_LENGTH {
                return Err(GenesisError::InvalidValidator {
                    index,
                    reason: format!("public key has length {}", pub_key.len()),
                });
            }
            validators.push(Validator {
                address: address_from_pub_key(&pub_key),
                pub_key,
                voting_power: validator.power,
            });
        }

        Ok(Some(ValidatorSet::new(validators)))
    }
}
