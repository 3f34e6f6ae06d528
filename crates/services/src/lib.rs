//! Reusable protocol services for simulated peers.
//!
//! - [`ConnectionManager`]: accepts `Hello`s and discovers new neighbours
//!   through `RequestPeers`/`PeerList` exchanges.
//! - [`GossipService`]: TTL-bounded dissemination with per-peer deduplication,
//!   optionally producing new messages on a fixed interval.
//!
//! Both are plain [`Service`](p2psim_core::Service)s; register them on a peer
//! type through the simulation's `PeerFactory`.

mod connection_manager;
mod gossip;
mod messages;

pub use connection_manager::{ConnectionManager, ConnectionManagerConfig};
pub use gossip::{GossipConfig, GossipService, MESSAGES_STORAGE};
pub use messages::{GossipMessage, PeerList, RequestPeers};
