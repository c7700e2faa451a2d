use async_trait::async_trait;
use containers::SignedHeader;
use tracing::{debug, info};

use super::{P2pError, Subscriber, Subscription};
use crate::gossipsub::HeaderTopic;
use crate::network::NetworkHandle;

/// Header gossip on the `/{network}/header-sub/...` topic.
pub struct GossipSubscriber {
    network: NetworkHandle,
    topic: HeaderTopic,
}

impl GossipSubscriber {
    pub fn new(network: NetworkHandle, network_id: &str) -> Self {
        Self {
            network,
            topic: HeaderTopic::new(network_id),
        }
    }

    pub fn topic(&self) -> &HeaderTopic {
        &self.topic
    }
}

#[async_trait]
impl Subscriber for GossipSubscriber {
    async fn start(&self) -> Result<(), P2pError> {
        self.network.subscribe(self.topic.clone()).await?;
        info!(topic = %self.topic, "Subscribed to header gossip");
        Ok(())
    }

    async fn stop(&self) -> Result<(), P2pError> {
        self.network.unsubscribe(self.topic.clone()).await?;
        debug!(topic = %self.topic, "Unsubscribed from header gossip");
        Ok(())
    }

    fn subscribe(&self) -> Result<Subscription, P2pError> {
        Ok(Subscription::new(self.network.header_receiver()))
    }

    async fn broadcast(&self, header: &SignedHeader) -> Result<(), P2pError> {
        self.network.publish(self.topic.clone(), header.to_bytes()).await?;
        debug!(height = header.height(), hash = %header.hash(), "Broadcast header");
        Ok(())
    }
}
