use hex::FromHex;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const HASH_LENGTH: usize = 32;
pub const NAMESPACE_ID_LENGTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseBytesError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
}

/// SHA-256 digest used for header, commit and validator set hashes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash(pub [u8; HASH_LENGTH]);

impl Hash {
    pub fn digest(bytes: &[u8]) -> Self {
        let mut out = [0u8; HASH_LENGTH];
        out.copy_from_slice(&Sha256::digest(bytes));
        Hash(out)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// Compares against a raw hash field as carried in a header.
    pub fn matches(&self, raw: &[u8]) -> bool {
        self.0.as_slice() == raw
    }
}

impl TryFrom<&[u8]> for Hash {
    type Error = ParseBytesError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let array: [u8; HASH_LENGTH] = bytes.try_into().map_err(|_| ParseBytesError::Length {
            expected: HASH_LENGTH,
            actual: bytes.len(),
        })?;
        Ok(Hash(array))
    }
}

impl FromStr for Hash {
    type Err = ParseBytesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim_start_matches("0x");
        if s.len() != HASH_LENGTH * 2 {
            return Err(ParseBytesError::Length {
                expected: HASH_LENGTH,
                actual: s.len() / 2,
            });
        }
        Ok(Hash(<[u8; HASH_LENGTH]>::from_hex(s)?))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", hex::encode(self.0))
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(D::Error::custom)
    }
}

/// Identifies the rollup's data inside a shared DA layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct NamespaceId(pub [u8; NAMESPACE_ID_LENGTH]);

impl FromStr for NamespaceId {
    type Err = ParseBytesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim_start_matches("0x");
        if s.len() != NAMESPACE_ID_LENGTH * 2 {
            return Err(ParseBytesError::Length {
                expected: NAMESPACE_ID_LENGTH,
                actual: s.len() / 2,
            });
        }
        Ok(NamespaceId(<[u8; NAMESPACE_ID_LENGTH]>::from_hex(s)?))
    }
}

impl fmt::Display for NamespaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Serialize for NamespaceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for NamespaceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(D::Error::custom)
    }
}
