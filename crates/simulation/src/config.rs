//! Simulation configuration.

use p2psim_network_memory::NetworkConfig;

/// Configuration for a [`Simulation`](crate::Simulation).
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Seed for the single random source shared by the whole run.
    pub seed: u64,
    pub network: NetworkConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            network: NetworkConfig::default(),
        }
    }
}

impl SimulationConfig {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            ..Default::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_network(mut self, network: NetworkConfig) -> Self {
        self.network = network;
        self
    }
}
