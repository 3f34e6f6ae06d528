//! Event queue with deterministic ordering.

use p2psim_types::{MessageRef, PeerId, TimerId};
use std::cmp::Ordering;
use std::time::Duration;

/// Priority levels for event ordering within the same timestamp.
///
/// Lower values are processed first: a peer's own timers run before
/// network deliveries that land on the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum EventPriority {
    Timer = 0,
    Network = 1,
}

/// Something that happens to one peer at one instant.
#[derive(Debug, Clone)]
pub enum Event {
    /// A message finished crossing its link and lands in the peer's queue.
    MessageDelivered {
        from: PeerId,
        message: MessageRef,
        initial: bool,
    },
    /// A timer scheduled by one of the peer's runners fired.
    TimerFired {
        service: &'static str,
        timer: TimerId,
    },
}

impl Event {
    pub fn priority(&self) -> EventPriority {
        match self {
            Event::MessageDelivered { .. } => EventPriority::Network,
            Event::TimerFired { .. } => EventPriority::Timer,
        }
    }
}

/// Key for ordering events in the queue.
///
/// Events are ordered by:
/// 1. Time (earlier first)
/// 2. Priority (timers before network)
/// 3. Peer id (deterministic ordering)
/// 4. Sequence number (FIFO for same time/priority/peer)
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct EventKey {
    /// When this event should be processed.
    pub time: Duration,
    /// Priority for ordering at same time.
    pub priority: EventPriority,
    /// Which peer receives this event.
    pub peer: PeerId,
    /// Sequence number for deterministic FIFO ordering.
    pub sequence: u64,
}

impl EventKey {
    pub fn new(time: Duration, event: &Event, peer: PeerId, sequence: u64) -> Self {
        Self {
            time,
            priority: event.priority(),
            peer,
            sequence,
        }
    }
}

impl Ord for EventKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.priority.cmp(&other.priority))
            .then_with(|| self.peer.cmp(&other.peer))
            .then_with(|| self.sequence.cmp(&other.sequence))
    }
}

impl PartialOrd for EventKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
