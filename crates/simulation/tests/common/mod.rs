//! Test messages and services shared by the simulation integration tests.

#![allow(dead_code)]

use p2psim_core::{Handler, PeerContext, PeerError, Runner, Service};
use p2psim_types::{Message, MessageRef, PeerId, TimerId};
use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ping {
    pub sender: PeerId,
    pub seq: u64,
}

impl Ping {
    pub fn new(sender: PeerId, seq: u64) -> MessageRef {
        Arc::new(Self { sender, seq })
    }
}

impl Message for Ping {
    fn message_type_id() -> &'static str {
        "ping"
    }

    fn message_type(&self) -> &'static str {
        Self::message_type_id()
    }

    fn sender(&self) -> PeerId {
        self.sender
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// One received message: (time, receiver, sender, seq).
pub type Received = (Duration, PeerId, PeerId, u64);

pub type ReceiveLog = Rc<RefCell<Vec<Received>>>;

/// Handles `Ping` by appending to a shared log.
pub struct PingRecorder {
    pub log: ReceiveLog,
    pub messages: Rc<RefCell<Vec<MessageRef>>>,
}

impl PingRecorder {
    pub fn new(log: &ReceiveLog) -> Self {
        Self {
            log: Rc::clone(log),
            messages: Rc::default(),
        }
    }
}

impl Service for PingRecorder {
    fn name(&self) -> &'static str {
        "PingRecorder"
    }

    fn as_handler(&mut self) -> Option<&mut dyn Handler> {
        Some(self)
    }
}

impl Handler for PingRecorder {
    fn messages(&self) -> Vec<&'static str> {
        vec![Ping::message_type_id()]
    }

    fn handle_message(
        &mut self,
        ctx: &mut PeerContext<'_>,
        message: &MessageRef,
    ) -> Result<(), PeerError> {
        if let Some(ping) = message.downcast_ref::<Ping>() {
            self.log
                .borrow_mut()
                .push((ctx.now(), ctx.id(), ping.sender, ping.seq));
            self.messages.borrow_mut().push(Arc::clone(message));
        }
        Ok(())
    }
}

/// Runner that gossips a fresh `Ping` every `interval`, and re-gossips
/// every ping it has not seen before.
pub struct PingFlood {
    pub interval: Duration,
    pub fanout: usize,
    pub produced: u64,
    pub seen: BTreeSet<u64>,
    pub log: ReceiveLog,
}

impl PingFlood {
    pub fn new(interval: Duration, fanout: usize, log: &ReceiveLog) -> Self {
        Self {
            interval,
            fanout,
            produced: 0,
            seen: BTreeSet::new(),
            log: Rc::clone(log),
        }
    }
}

impl Service for PingFlood {
    fn name(&self) -> &'static str {
        "PingFlood"
    }

    fn as_handler(&mut self) -> Option<&mut dyn Handler> {
        Some(self)
    }

    fn as_runner(&mut self) -> Option<&mut dyn Runner> {
        Some(self)
    }
}

impl Handler for PingFlood {
    fn messages(&self) -> Vec<&'static str> {
        vec![Ping::message_type_id()]
    }

    fn handle_message(
        &mut self,
        ctx: &mut PeerContext<'_>,
        message: &MessageRef,
    ) -> Result<(), PeerError> {
        let Some(ping) = message.downcast_ref::<Ping>() else {
            return Ok(());
        };
        self.log
            .borrow_mut()
            .push((ctx.now(), ctx.id(), ping.sender, ping.seq));
        // Relays keep the sequence number but sign as themselves.
        if self.seen.insert(ping.seq) {
            let except: BTreeSet<PeerId> = [ping.sender].into_iter().collect();
            ctx.gossip(Ping::new(ctx.id(), ping.seq), self.fanout, &except)?;
        }
        Ok(())
    }
}

impl Runner for PingFlood {
    fn start(&mut self, ctx: &mut PeerContext<'_>) -> Result<(), PeerError> {
        ctx.schedule_timer(self.interval, TimerId(0))
    }

    fn on_timer(&mut self, ctx: &mut PeerContext<'_>, _timer: TimerId) -> Result<(), PeerError> {
        self.produced += 1;
        let seq = u64::from(ctx.id().0) * 1_000 + self.produced;
        self.seen.insert(seq);
        ctx.gossip(Ping::new(ctx.id(), seq), self.fanout, &BTreeSet::new())?;
        ctx.schedule_timer(self.interval, TimerId(0))
    }
}
