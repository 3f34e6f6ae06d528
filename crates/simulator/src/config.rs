//! Scenario configuration.

use p2psim_network_memory::NetworkConfig;
use p2psim_services::{ConnectionManagerConfig, GossipConfig};
use p2psim_simulation::PeerTypeConfig;
use std::time::Duration;

/// A bootstrap-seeded gossip network: `bootstrap_servers` servers, `peers`
/// ordinary peers that discover each other and disseminate messages.
#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    /// Random seed for deterministic simulation.
    pub seed: u64,

    pub bootstrap_servers: usize,

    /// Number of ordinary peers.
    pub peers: usize,

    /// Simulated time to run for.
    pub duration: Duration,

    pub network: NetworkConfig,

    /// Bandwidth and locations of ordinary peers.
    pub peer_type: PeerTypeConfig,

    /// Bandwidth of bootstrap servers.
    pub bootstrap_type: PeerTypeConfig,

    pub connection_manager: ConnectionManagerConfig,

    /// Gossip settings of ordinary peers. Bootstrap servers only relay.
    pub gossip: GossipConfig,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            seed: 12345,
            bootstrap_servers: 1,
            peers: 20,
            duration: Duration::from_secs(30),
            network: NetworkConfig::default()
                .with_latency("eu", "us", Duration::from_millis(80))
                .with_latency("eu", "asia", Duration::from_millis(150))
                .with_latency("us", "asia", Duration::from_millis(120)),
            peer_type: PeerTypeConfig::default().with_locations(["eu", "us", "asia"]),
            bootstrap_type: PeerTypeConfig::default()
                .with_bandwidth(100.0, 100.0)
                .with_locations(["eu"]),
            connection_manager: ConnectionManagerConfig::default(),
            gossip: GossipConfig::default().with_produce_interval(Duration::from_secs(2)),
        }
    }
}

impl ScenarioConfig {
    pub fn new(bootstrap_servers: usize, peers: usize) -> Self {
        Self {
            bootstrap_servers,
            peers,
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_network(mut self, network: NetworkConfig) -> Self {
        self.network = network;
        self
    }

    pub fn with_peer_type(mut self, peer_type: PeerTypeConfig) -> Self {
        self.peer_type = peer_type;
        self
    }

    pub fn with_connection_manager(mut self, config: ConnectionManagerConfig) -> Self {
        self.connection_manager = config;
        self
    }

    pub fn with_gossip(mut self, gossip: GossipConfig) -> Self {
        self.gossip = gossip;
        self
    }
}
