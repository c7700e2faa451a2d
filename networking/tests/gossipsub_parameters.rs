use networking::compressor::MAX_GOSSIP_SIZE;
use networking::gossipsub::GossipsubConfig;
use networking::gossipsub::HeaderTopic;

#[test]
fn test_default_parameters() {
    let params = GossipsubConfig::new().unwrap();

    assert!(
        params.config.mesh_n_low() < params.config.mesh_n() && params.config.mesh_n() < params.config.mesh_n_high()
    );
    assert!(params.config.gossip_lazy() <= params.config.mesh_n());
    assert!(params.config.history_gossip() <= params.config.history_length());
    assert!(params.config.heartbeat_interval().as_millis() > 0);
    assert!(params.config.fanout_ttl().as_secs() > 0);
    assert_eq!(params.config.max_transmit_size(), MAX_GOSSIP_SIZE);
    assert!(params.config.validate_messages());
}

#[test]
fn test_topic_is_scoped_by_network() {
    assert_ne!(
        HeaderTopic::new("rollup-a").to_string(),
        HeaderTopic::new("rollup-b").to_string()
    );
}
