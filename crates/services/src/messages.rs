//! Wire messages exchanged by the protocol services.

use p2psim_types::{Message, PeerId};
use std::any::Any;

/// Fixed per-message overhead, in bytes.
const HEADER_SIZE: u64 = 16;

/// Ask a neighbour for some of its own neighbours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPeers {
    pub sender: PeerId,
}

impl RequestPeers {
    pub fn new(sender: PeerId) -> Self {
        Self { sender }
    }
}

impl Message for RequestPeers {
    fn message_type_id() -> &'static str {
        "peers.request"
    }

    fn message_type(&self) -> &'static str {
        Self::message_type_id()
    }

    fn sender(&self) -> PeerId {
        self.sender
    }

    fn size_bytes(&self) -> u64 {
        HEADER_SIZE
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Reply to [`RequestPeers`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerList {
    pub sender: PeerId,
    pub peers: Vec<PeerId>,
}

impl PeerList {
    pub fn new(sender: PeerId, peers: Vec<PeerId>) -> Self {
        Self { sender, peers }
    }
}

impl Message for PeerList {
    fn message_type_id() -> &'static str {
        "peers.list"
    }

    fn message_type(&self) -> &'static str {
        Self::message_type_id()
    }

    fn sender(&self) -> PeerId {
        self.sender
    }

    fn size_bytes(&self) -> u64 {
        HEADER_SIZE + 4 * self.peers.len() as u64
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A message disseminated by [`GossipService`](crate::GossipService).
///
/// `sender` is the hop that relayed it, `origin` the peer that produced it.
/// Relays forward while `ttl > 0`, decrementing it on every hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GossipMessage {
    pub id: String,
    pub origin: PeerId,
    pub sender: PeerId,
    pub ttl: u32,
    pub payload_size: u64,
}

impl GossipMessage {
    /// A fresh message produced by `origin`.
    pub fn new(id: impl Into<String>, origin: PeerId, ttl: u32, payload_size: u64) -> Self {
        Self {
            id: id.into(),
            origin,
            sender: origin,
            ttl,
            payload_size,
        }
    }

    /// The copy `relay` forwards, one hop further.
    pub fn relayed_by(&self, relay: PeerId) -> Self {
        Self {
            sender: relay,
            ttl: self.ttl.saturating_sub(1),
            ..self.clone()
        }
    }
}

impl Message for GossipMessage {
    fn message_type_id() -> &'static str {
        "gossip"
    }

    fn message_type(&self) -> &'static str {
        Self::message_type_id()
    }

    fn sender(&self) -> PeerId {
        self.sender
    }

    fn size_bytes(&self) -> u64 {
        HEADER_SIZE + self.id.len() as u64 + self.payload_size
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
