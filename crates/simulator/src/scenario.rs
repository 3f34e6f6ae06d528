//! Scenario runner: builds the population, drives the clock, gathers a report.

use crate::{ScenarioConfig, ScenarioReport};
use p2psim_core::MessageStore;
use p2psim_services::{ConnectionManager, GossipConfig, GossipService, MESSAGES_STORAGE};
use p2psim_simulation::{
    PeerFactory, Simulation, SimulationConfig, SimulationError, BOOTSTRAP_PEER_TYPE,
};
use p2psim_types::PeerId;
use petgraph::algo::connected_components;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::info;

/// Peer type of ordinary peers.
pub const PEER_TYPE: &str = "peer";

/// A populated, started simulation.
#[derive(Debug)]
pub struct Scenario {
    config: ScenarioConfig,
    simulation: Simulation,
}

impl Scenario {
    /// Create bootstrap servers and peers and start every runner.
    pub fn new(config: ScenarioConfig) -> Result<Self, SimulationError> {
        let mut simulation = Simulation::new(
            SimulationConfig::new(config.seed).with_network(config.network.clone()),
            Self::factory(&config),
        );
        simulation.init_bootstrap_servers(config.bootstrap_servers)?;
        simulation.add_peers(config.peers, PEER_TYPE)?;
        simulation.start_all_peers()?;
        info!(
            bootstrap_servers = config.bootstrap_servers,
            peers = config.peers,
            seed = config.seed,
            "Scenario initialized"
        );
        Ok(Self { config, simulation })
    }

    fn factory(config: &ScenarioConfig) -> PeerFactory {
        // Bootstrap servers only answer discovery and relay gossip.
        let bootstrap_manager = config.connection_manager.clone().with_min_peers(0);
        let bootstrap_gossip = GossipConfig {
            produce_interval: None,
            ..config.gossip.clone()
        };
        let manager = config.connection_manager.clone();
        let gossip = config.gossip.clone();

        PeerFactory::new()
            .with_peer_type(BOOTSTRAP_PEER_TYPE, config.bootstrap_type.clone())
            .with_service(BOOTSTRAP_PEER_TYPE, move |_, _| {
                Box::new(ConnectionManager::new(bootstrap_manager.clone()))
            })
            .with_service(BOOTSTRAP_PEER_TYPE, move |_, _| {
                Box::new(GossipService::new(bootstrap_gossip.clone()))
            })
            .with_storage(BOOTSTRAP_PEER_TYPE, MESSAGES_STORAGE, || Box::new(MessageStore::new()))
            .with_peer_type(PEER_TYPE, config.peer_type.clone())
            .with_service(PEER_TYPE, move |_, _| {
                Box::new(ConnectionManager::new(manager.clone()))
            })
            .with_service(PEER_TYPE, move |_, _| Box::new(GossipService::new(gossip.clone())))
            .with_storage(PEER_TYPE, MESSAGES_STORAGE, || Box::new(MessageStore::new()))
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    pub fn simulation_mut(&mut self) -> &mut Simulation {
        &mut self.simulation
    }

    /// Run for the configured duration and report.
    pub fn run(&mut self) -> Result<ScenarioReport, SimulationError> {
        self.run_for(self.config.duration)
    }

    pub fn run_for(&mut self, duration: Duration) -> Result<ScenarioReport, SimulationError> {
        info!(duration_secs = duration.as_secs_f64(), "Running scenario");
        self.simulation.run_for(duration)?;
        let report = self.report();
        info!(
            now = ?report.simulated_time,
            messages = report.messages_produced,
            avg_coverage = report.avg_coverage,
            "Scenario finished"
        );
        Ok(report)
    }

    /// Messages stored by each ordinary peer.
    fn stored(&self, id: PeerId) -> Vec<&str> {
        self.simulation
            .peer(id)
            .and_then(|p| p.storage(MESSAGES_STORAGE))
            .and_then(|s| s.as_any().downcast_ref::<MessageStore>())
            .map(|s| s.ids().collect())
            .unwrap_or_default()
    }

    pub fn report(&self) -> ScenarioReport {
        let sim = &self.simulation;
        let peers = sim.peers_of_type(PEER_TYPE);

        // message id -> ordinary peers that stored it
        let mut reach: BTreeMap<&str, usize> = BTreeMap::new();
        for &id in peers {
            for message in self.stored(id) {
                *reach.entry(message).or_default() += 1;
            }
        }
        let coverage: Vec<f64> = reach
            .values()
            .map(|&n| n as f64 / peers.len() as f64)
            .collect();
        let avg_coverage = if coverage.is_empty() {
            0.0
        } else {
            coverage.iter().sum::<f64>() / coverage.len() as f64
        };
        let fully_covered = reach.values().filter(|&&n| n == peers.len()).count();

        let graph = sim.connection_graph(false);
        let degrees: Vec<usize> = peers
            .iter()
            .filter_map(|id| sim.peer(*id))
            .map(|p| p.connection_count())
            .collect();

        ScenarioReport {
            seed: self.config.seed,
            simulated_time: sim.now(),
            bootstrap_servers: sim.bootstrap_peers().len(),
            peers: peers.len(),
            edges: graph.edge_count(),
            components: connected_components(&graph),
            min_degree: degrees.iter().copied().min().unwrap_or(0),
            max_degree: degrees.iter().copied().max().unwrap_or(0),
            avg_bandwidth: sim.avg_bandwidth(),
            median_bandwidth: sim.median_bandwidth(),
            messages_produced: reach.len(),
            avg_coverage,
            fully_covered,
            stats: sim.stats().clone(),
        }
    }

    /// The live topology in Graphviz DOT format, bootstrap servers included.
    pub fn dot(&self) -> String {
        self.simulation.connection_graph_dot(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn small() -> ScenarioConfig {
        ScenarioConfig::new(1, 12)
            .with_seed(7)
            .with_duration(Duration::from_secs(6))
    }

    #[traced_test]
    #[test]
    fn test_scenario_builds_mesh_and_spreads_gossip() {
        let mut scenario = Scenario::new(small()).unwrap();
        let report = scenario.run().unwrap();

        assert_eq!(report.peers, 12);
        assert_eq!(report.simulated_time, Duration::from_secs(6));
        assert!(report.edges > 0);
        assert!(report.messages_produced > 0);
        assert!(report.avg_coverage > 0.0 && report.avg_coverage <= 1.0);
        assert!(report.avg_bandwidth.is_some());
        assert!(logs_contain("Scenario finished"));
    }

    #[test]
    fn test_same_seed_same_report() {
        let a = Scenario::new(small()).unwrap().run().unwrap();
        let b = Scenario::new(small()).unwrap().run().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_dot_lists_every_peer() {
        let mut scenario = Scenario::new(ScenarioConfig::new(2, 5).with_seed(3)).unwrap();
        scenario.run_for(Duration::from_secs(2)).unwrap();
        let dot = scenario.dot();
        for name in ["bootstrap_0", "bootstrap_1", "peer_0", "peer_4"] {
            assert!(dot.contains(name), "{name} missing from {dot}");
        }
    }

    #[test]
    fn test_no_bootstrap_servers_is_an_error() {
        let err = Scenario::new(ScenarioConfig::new(0, 3)).unwrap_err();
        assert_eq!(err, SimulationError::NoBootstrapPeers);
    }
}
