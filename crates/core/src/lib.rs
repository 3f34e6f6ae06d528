//! Peer runtime and messaging substrate.
//!
//! This crate contains everything a simulated peer does on its own logical
//! thread of control:
//!
//! - [`Peer`]: identity, connections, inbound queue, services and storage
//! - [`Peers`]: the arena owning every peer; connect/disconnect update both
//!   sides in one step, and the receive loop drains each peer's queue
//! - [`PeerContext`]: what a service uses to act as its peer
//!   (send/gossip/broadcast, connect, storage, timers)
//! - [`Service`], [`Handler`], [`Runner`]: the capability interfaces
//!
//! No clock lives here. Sends and timers are buffered in an [`Outbox`] and the
//! simulation decides when they happen, keeping every step synchronous and
//! deterministic.

mod connection;
mod context;
mod error;
mod peer;
mod service;
mod storage;

pub use connection::{Connection, OutboundMessage, Outbox, TimerRequest};
pub use context::PeerContext;
pub use error::PeerError;
pub use peer::{DisconnectCallback, Peer, Peers};
pub use service::{Handler, HelloAcceptor, Runner, Service, ServiceRegistry};
pub use storage::{MessageStore, Storage};
