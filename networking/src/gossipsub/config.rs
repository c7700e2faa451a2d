use anyhow::{Result, anyhow};
use libp2p::gossipsub::{Config, ConfigBuilder, Message, MessageId, ValidationMode};
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::compressor::MAX_GOSSIP_SIZE;

#[derive(Debug, Clone)]
pub struct GossipsubConfig {
    pub config: Config,
}

impl GossipsubConfig {
    pub fn new() -> Result<Self> {
        let config = ConfigBuilder::default()
            .heartbeat_interval(Duration::from_millis(700))
            .fanout_ttl(Duration::from_secs(60))
            .history_length(6)
            .history_gossip(3)
            .duplicate_cache_time(Duration::from_secs(120))
            .max_transmit_size(MAX_GOSSIP_SIZE)
            .validation_mode(ValidationMode::Anonymous)
            // Inbound headers are reported accepted or rejected after decoding.
            .validate_messages()
            .message_id_fn(compute_message_id)
            .build()
            .map_err(|err| anyhow!("invalid gossipsub config: {err}"))?;

        Ok(GossipsubConfig { config })
    }
}

/// First 20 bytes of SHA-256 of the decompressed payload.
pub fn compute_message_id(message: &Message) -> MessageId {
    let hash = Sha256::digest(&message.data);
    MessageId::from(&hash[..20])
}
