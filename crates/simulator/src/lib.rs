//! Peer-to-peer network scenarios.
//!
//! Builds a bootstrap-seeded gossip network on top of `p2psim-simulation`
//! and `p2psim-services`:
//!
//! - **Population**: bootstrap servers plus ordinary peers spread over
//!   locations, each running a `ConnectionManager` and a `GossipService`
//! - **Report**: topology (links, components, degrees, bandwidth), gossip
//!   coverage and traffic counters
//!
//! # Example
//!
//! ```ignore
//! use p2psim_simulator::{Scenario, ScenarioConfig};
//! use std::time::Duration;
//!
//! let config = ScenarioConfig::new(1, 50)
//!     .with_seed(42)
//!     .with_duration(Duration::from_secs(60));
//!
//! let mut scenario = Scenario::new(config)?;
//! let report = scenario.run()?;
//! report.print_summary();
//! ```

mod config;
mod report;
mod scenario;

pub use config::ScenarioConfig;
pub use report::ScenarioReport;
pub use scenario::{Scenario, PEER_TYPE};
