pub mod config;
pub mod topic;

use crate::compressor::Compressor;
use libp2p::gossipsub::{AllowAllSubscriptionFilter, Behaviour};

pub type GossipsubBehaviour = Behaviour<Compressor, AllowAllSubscriptionFilter>;

pub use config::{GossipsubConfig, compute_message_id};
pub use topic::{HEADER_SUB_TOPIC, HEADER_SUB_VERSION, HeaderTopic};
