//! Connections and the peer-side outbox.
//!
//! A [`Connection`] never delivers anything itself. `send` buffers an
//! [`OutboundMessage`] in the [`Outbox`]; after each step the simulation
//! drains the outbox, samples latency and transmission delay, and schedules
//! delivery into the destination peer's inbound queue.

use crate::Peer;
use p2psim_types::{MessageRef, PeerId, TimerId};
use std::time::Duration;

/// A bandwidth-rated link from one peer to another.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    from: PeerId,
    to: PeerId,
    /// Effective bandwidth in Mbit/s.
    bandwidth: f64,
}

impl Connection {
    /// Create a link limited by the sender's upload and the receiver's download capacity.
    pub fn new(from: &Peer, to: &Peer) -> Self {
        Self {
            from: from.id(),
            to: to.id(),
            bandwidth: from.bandwidth_ul().min(to.bandwidth_dl()),
        }
    }

    pub fn from(&self) -> PeerId {
        self.from
    }

    pub fn to(&self) -> PeerId {
        self.to
    }

    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    /// Hand a message to the link for eventual delivery.
    ///
    /// `initial` marks a bootstrap announcement, which is delivered even though
    /// the destination has no reciprocal link to the sender.
    pub fn send(&self, outbox: &mut Outbox, message: MessageRef, initial: bool) {
        outbox.messages.push(OutboundMessage {
            from: self.from,
            to: self.to,
            bandwidth: self.bandwidth,
            message,
            initial,
        });
    }
}

/// A message buffered for delivery by the simulation.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub from: PeerId,
    pub to: PeerId,
    pub bandwidth: f64,
    pub message: MessageRef,
    pub initial: bool,
}

/// A timer requested by a running service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerRequest {
    pub peer: PeerId,
    pub service: &'static str,
    pub delay: Duration,
    pub timer: TimerId,
}

/// Effects produced while a peer acts, awaiting the simulation.
///
/// The simulation drains the outbox after every step so effects are
/// scheduled in the order they were produced.
#[derive(Debug, Default)]
pub struct Outbox {
    messages: Vec<OutboundMessage>,
    timers: Vec<TimerRequest>,
    stop_requested: bool,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_timer(&mut self, request: TimerRequest) {
        self.timers.push(request);
    }

    pub(crate) fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    /// Drain all buffered outgoing messages.
    pub fn drain_messages(&mut self) -> Vec<OutboundMessage> {
        std::mem::take(&mut self.messages)
    }

    /// Drain all buffered timer requests.
    pub fn drain_timers(&mut self) -> Vec<TimerRequest> {
        std::mem::take(&mut self.timers)
    }

    /// Whether a stop was requested since the last call, clearing the flag.
    pub fn take_stop_request(&mut self) -> bool {
        std::mem::take(&mut self.stop_requested)
    }

    /// Buffered messages, oldest first.
    pub fn messages(&self) -> &[OutboundMessage] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.timers.is_empty() && !self.stop_requested
    }
}
