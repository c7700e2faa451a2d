pub mod config;

pub use config::{BlockManagerConfig, ConfigError, MetricsConfig, NodeConfig, P2PConfig};
