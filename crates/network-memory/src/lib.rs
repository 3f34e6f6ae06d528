//! Deterministic in-memory link model for simulation.
//!
//! Provides [`SimulatedNetwork`] with per-location latency, jitter, packet
//! loss and bandwidth-bound transmission delay, all driven by a seeded RNG for
//! reproducibility. The simulation asks it how long a message takes to cross a
//! link; it never holds messages itself.

mod network;

pub use network::{NetworkConfig, SimulatedNetwork};
