use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use ed25519_dalek::SigningKey;
use thiserror::Error;
use tracing::info;

pub const SEED_LENGTH: usize = 32;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("failed to read key file {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to write key file {path:?}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("key file {path:?} is not hex: {source}")]
    Hex { path: PathBuf, source: hex::FromHexError },
    #[error("key file {path:?} holds {actual} bytes, expected {SEED_LENGTH}")]
    Length { path: PathBuf, actual: usize },
}

/// Reads a hex-encoded 32-byte seed, creating the file with a fresh seed if
/// it does not exist yet.
pub fn load_or_generate_seed(path: impl AsRef<Path>) -> Result<[u8; SEED_LENGTH], KeyError> {
    let path = path.as_ref();
    if !path.exists() {
        let seed: [u8; SEED_LENGTH] = rand::random();
        write_seed(path, &seed)?;
        info!(path = ?path, "Generated new key");
        return Ok(seed);
    }

    let contents = fs::read_to_string(path).map_err(|source| KeyError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let bytes = hex::decode(contents.trim().trim_start_matches("0x")).map_err(|source| KeyError::Hex {
        path: path.to_path_buf(),
        source,
    })?;
    let actual = bytes.len();
    let seed: [u8; SEED_LENGTH] = bytes.try_into().map_err(|_| KeyError::Length {
        path: path.to_path_buf(),
        actual,
    })?;
    info!(path = ?path, "Loaded key");
    Ok(seed)
}

/// Block signing key kept in a seed file.
pub fn load_signing_key(path: impl AsRef<Path>) -> Result<SigningKey, KeyError> {
    load_or_generate_seed(path).map(|seed| SigningKey::from_bytes(&seed))
}

fn write_seed(path: &Path, seed: &[u8; SEED_LENGTH]) -> Result<(), KeyError> {
    let write_err = |source| KeyError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    fs::write(path, hex::encode(seed)).map_err(write_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn generated_seed_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("proposer.key");

        let first = load_signing_key(&path).unwrap();
        let second = load_signing_key(&path).unwrap();

        assert_eq!(first.to_bytes(), second.to_bytes());
        assert_eq!(fs::read_to_string(&path).unwrap(), hex::encode(first.to_bytes()));
    }

    #[test]
    fn existing_seed_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.key");
        fs::write(&path, format!("0x{}\n", "ab".repeat(SEED_LENGTH))).unwrap();

        assert_eq!(load_or_generate_seed(&path).unwrap(), [0xab; SEED_LENGTH]);
    }

    #[test]
    fn short_seed_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.key");
        fs::write(&path, "abcd").unwrap();

        assert!(matches!(
            load_or_generate_seed(&path),
            Err(KeyError::Length { actual: 2, .. })
        ));
    }

    #[test]
    fn non_hex_seed_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.key");
        fs::write(&path, "not a key").unwrap();

        assert!(matches!(load_or_generate_seed(&path), Err(KeyError::Hex { .. })));
    }
}
