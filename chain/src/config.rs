use containers::NamespaceId;
use serde::{Deserialize, Deserializer, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_LISTEN_ADDRESS: &str = "/ip4/0.0.0.0/tcp/7676";
pub const DEFAULT_BLOCK_TIME_MS: u64 = 1_000;
pub const DEFAULT_DA_BLOCK_TIME_MS: u64 = 15_000;
pub const DEFAULT_DA_START_HEIGHT: u64 = 1;
pub const DEFAULT_DA_LAYER: &str = "mock";
pub const DEFAULT_METRICS_ADDRESS: &str = "127.0.0.1";
pub const DEFAULT_METRICS_PORT: u16 = 26660;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("block_time_ms must be positive")]
    ZeroBlockTime,
    #[error("da_block_time_ms must be positive")]
    ZeroDaBlockTime,
}

/// Peer lists may be given as YAML lists or as comma separated strings.
fn peer_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ListOrString {
        List(Vec<String>),
        String(String),
    }

    Ok(match ListOrString::deserialize(deserializer)? {
        ListOrString::List(list) => list,
        ListOrString::String(value) => parse_peer_list(&value),
    })
}

pub fn parse_peer_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct P2PConfig {
    pub listen_address: String,
    /// Multiaddrs of trusted peers, each ending in `/p2p/<peer id>`.
    #[serde(deserialize_with = "peer_list")]
    pub seeds: Vec<String>,
    /// Peer ids.
    #[serde(deserialize_with = "peer_list")]
    pub blocked_peers: Vec<String>,
    /// Peer ids. When non-empty only these peers may connect.
    #[serde(deserialize_with = "peer_list")]
    pub allowed_peers: Vec<String>,
}

impl Default for P2PConfig {
    fn default() -> Self {
        Self {
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
            seeds: Vec::new(),
            blocked_peers: Vec::new(),
            allowed_peers: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockManagerConfig {
    /// Target interval between produced blocks; also paces the header syncer.
    pub block_time_ms: u64,
    pub da_block_time_ms: u64,
    pub da_start_height: u64,
    pub namespace_id: NamespaceId,
}

impl Default for BlockManagerConfig {
    fn default() -> Self {
        Self {
            block_time_ms: DEFAULT_BLOCK_TIME_MS,
            da_block_time_ms: DEFAULT_DA_BLOCK_TIME_MS,
            da_start_height: DEFAULT_DA_START_HEIGHT,
            namespace_id: NamespaceId::default(),
        }
    }
}

impl BlockManagerConfig {
    pub fn block_time(&self) -> Duration {
        Duration::from_millis(self.block_time_ms)
    }

    pub fn da_block_time(&self) -> Duration {
        Duration::from_millis(self.da_block_time_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub address: String,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: DEFAULT_METRICS_ADDRESS.to_string(),
            port: DEFAULT_METRICS_PORT,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Whether this node produces blocks.
    pub aggregator: bool,
    pub p2p: P2PConfig,
    pub block_manager: BlockManagerConfig,
    /// Name of the DA backend, `mock` or `avail`.
    pub da_layer: String,
    /// Backend specific configuration, JSON.
    pub da_config: String,
    /// Hex encoded hash of the header to start syncing from.
    pub trusted_hash: String,
    pub metrics: MetricsConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            aggregator: false,
            p2p: P2PConfig::default(),
            block_manager: BlockManagerConfig::default(),
            da_layer: DEFAULT_DA_LAYER.to_string(),
            da_config: String::new(),
            trusted_hash: String::new(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl NodeConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let config: NodeConfig = serde_yaml::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_manager.block_time_ms == 0 {
            return Err(ConfigError::ZeroBlockTime);
        }
        if self.block_manager.da_block_time_ms == 0 {
            return Err(ConfigError::ZeroDaBlockTime);
        }
        Ok(())
    }

    pub fn block_time(&self) -> Duration {
        self.block_manager.block_time()
    }
}
