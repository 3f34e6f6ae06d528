//! Deterministic peer-to-peer network simulation.
//!
//! This crate provides the discrete-event clock and the population/topology
//! layer on top of the peer runtime in `p2psim-core`. Given the same seed and
//! the same driver calls, it produces identical results every run.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                      Simulation                         │
//! │                                                         │
//! │  ┌────────────────────────────────────────────────────┐ │
//! │  │     Event Queue (BTreeMap<EventKey, Event>)        │ │
//! │  │     Ordered by: time, priority, peer, sequence     │ │
//! │  └────────────────────────┬───────────────────────────┘ │
//! │                           │                             │
//! │                           ▼                             │
//! │  ┌────────────────────────────────────────────────────┐ │
//! │  │     peers: Peers                                   │ │
//! │  │     Each drains its inbound queue sequentially     │ │
//! │  └────────────────────────┬───────────────────────────┘ │
//! │                           │                             │
//! │                           ▼                             │
//! │  ┌────────────────────────────────────────────────────┐ │
//! │  │     Outbox → SimulatedNetwork → schedule events    │ │
//! │  └────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────┘
//! ```

mod config;
mod error;
mod event_queue;
mod factory;
mod runner;
mod topology;

pub use config::SimulationConfig;
pub use error::SimulationError;
pub use event_queue::{Event, EventKey, EventPriority};
pub use factory::{PeerFactory, PeerTypeConfig, ServiceBuilder, StorageBuilder};
pub use runner::{Simulation, SimulationStats, BOOTSTRAP_PEER_TYPE};
