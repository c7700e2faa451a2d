//! Gossip topic for signed headers: `/{network}/header-sub/{version}`.

use libp2p::gossipsub::{IdentTopic, TopicHash};
use std::fmt;

pub const HEADER_SUB_TOPIC: &str = "header-sub";
pub const HEADER_SUB_VERSION: &str = "v0.0.1";

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct HeaderTopic {
    pub network: String,
}

impl HeaderTopic {
    pub fn new(network: impl Into<String>) -> Self {
        Self {
            network: network.into(),
        }
    }

    pub fn from_string(topic: &str) -> Result<Self, String> {
        let parts: Vec<&str> = topic.trim_start_matches('/').split('/').collect();
        match parts.as_slice() {
            [network, HEADER_SUB_TOPIC, HEADER_SUB_VERSION] if !network.is_empty() => {
                Ok(Self::new(*network))
            }
            _ => Err(format!("not a header topic: {topic}")),
        }
    }
}

impl fmt::Display for HeaderTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{HEADER_SUB_TOPIC}/{HEADER_SUB_VERSION}", self.network)
    }
}

impl From<HeaderTopic> for IdentTopic {
    fn from(topic: HeaderTopic) -> IdentTopic {
        IdentTopic::new(topic.to_string())
    }
}

impl From<&HeaderTopic> for TopicHash {
    fn from(topic: &HeaderTopic) -> TopicHash {
        TopicHash::from_raw(topic.to_string())
    }
}
