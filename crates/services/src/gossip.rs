//! TTL-bounded gossip dissemination.
//!
//! Every peer keeps the messages it has seen in its `"messages"` storage. A
//! message is relayed only the first time it is seen, so a flood terminates
//! even on cyclic topologies.

use crate::messages::GossipMessage;
use p2psim_core::{Handler, MessageStore, PeerContext, PeerError, Runner, Service};
use p2psim_types::{Message, MessageRef, TimerId};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Storage the gossip service records seen messages in.
pub const MESSAGES_STORAGE: &str = "messages";

const PRODUCE_TIMER: TimerId = TimerId(0);

/// Gossip configuration.
#[derive(Debug, Clone)]
pub struct GossipConfig {
    /// Neighbours each message is forwarded to.
    pub fanout: usize,

    /// Hops a produced message may travel.
    pub ttl: u32,

    /// Payload bytes of a produced message.
    pub payload_size: u64,

    /// Produce a new message this often. `None` or zero only relays.
    pub produce_interval: Option<Duration>,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            fanout: 3,
            ttl: 4,
            payload_size: 256,
            produce_interval: None,
        }
    }
}

impl GossipConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fanout(mut self, fanout: usize) -> Self {
        self.fanout = fanout;
        self
    }

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_payload_size(mut self, payload_size: u64) -> Self {
        self.payload_size = payload_size;
        self
    }

    pub fn with_produce_interval(mut self, interval: Duration) -> Self {
        self.produce_interval = Some(interval);
        self
    }
}

/// Relays unseen [`GossipMessage`]s and optionally produces new ones.
#[derive(Debug, Default)]
pub struct GossipService {
    config: GossipConfig,
    produced: u64,
}

impl GossipService {
    pub fn new(config: GossipConfig) -> Self {
        Self {
            config,
            produced: 0,
        }
    }

    pub fn config(&self) -> &GossipConfig {
        &self.config
    }

    /// Record `message` and forward it unless it was seen before.
    ///
    /// Returns whether the message was new.
    fn accept(
        &mut self,
        ctx: &mut PeerContext<'_>,
        message: &GossipMessage,
        stored: MessageRef,
    ) -> Result<bool, PeerError> {
        if ctx.storage(MESSAGES_STORAGE).is_none() {
            ctx.add_storage(MESSAGES_STORAGE, Box::new(MessageStore::new()));
        }
        let seen = ctx
            .storage(MESSAGES_STORAGE)
            .is_some_and(|s| s.contains(&message.id));
        if seen {
            trace!(peer = %ctx.name(), id = %message.id, "Duplicate gossip");
            return Ok(false);
        }
        ctx.store(MESSAGES_STORAGE, &message.id, stored)?;

        if message.ttl == 0 {
            return Ok(true);
        }
        let except: BTreeSet<_> = [message.sender, message.origin].into_iter().collect();
        let relay = message.relayed_by(ctx.id());
        let targets = ctx.gossip(Arc::new(relay), self.config.fanout, &except)?;
        trace!(
            peer = %ctx.name(),
            id = %message.id,
            ttl = message.ttl,
            targets = targets.len(),
            "Relayed gossip"
        );
        Ok(true)
    }

    fn produce(&mut self, ctx: &mut PeerContext<'_>) -> Result<(), PeerError> {
        let id = format!("{}-{}", ctx.name(), self.produced);
        self.produced += 1;
        let message = GossipMessage::new(id, ctx.id(), self.config.ttl, self.config.payload_size);
        debug!(peer = %ctx.name(), now = ?ctx.now(), id = %message.id, "Producing gossip");
        let stored: MessageRef = Arc::new(message.clone());
        self.accept(ctx, &message, stored)?;
        Ok(())
    }
}

impl Service for GossipService {
    fn name(&self) -> &'static str {
        "GossipService"
    }

    fn as_handler(&mut self) -> Option<&mut dyn Handler> {
        Some(self)
    }

    fn as_runner(&mut self) -> Option<&mut dyn Runner> {
        Some(self)
    }
}

impl Handler for GossipService {
    fn messages(&self) -> Vec<&'static str> {
        vec![GossipMessage::message_type_id()]
    }

    fn handle_message(
        &mut self,
        ctx: &mut PeerContext<'_>,
        message: &MessageRef,
    ) -> Result<(), PeerError> {
        let Some(gossip) = message.downcast_ref::<GossipMessage>() else {
            return Ok(());
        };
        self.accept(ctx, gossip, Arc::clone(message))?;
        Ok(())
    }
}

impl Runner for GossipService {
    fn start(&mut self, ctx: &mut PeerContext<'_>) -> Result<(), PeerError> {
        match self.config.produce_interval {
            Some(interval) if !interval.is_zero() => ctx.schedule_timer(interval, PRODUCE_TIMER),
            _ => Ok(()),
        }
    }

    fn on_timer(&mut self, ctx: &mut PeerContext<'_>, _timer: TimerId) -> Result<(), PeerError> {
        self.produce(ctx)?;
        self.start(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p2psim_core::HelloAcceptor;
    use p2psim_simulation::{
        PeerFactory, PeerTypeConfig, Simulation, SimulationConfig, BOOTSTRAP_PEER_TYPE,
    };
    use p2psim_types::PeerId;

    fn factory(basic: GossipConfig) -> PeerFactory {
        PeerFactory::new()
            .with_peer_type(BOOTSTRAP_PEER_TYPE, PeerTypeConfig::default())
            .with_service(BOOTSTRAP_PEER_TYPE, |_, _| Box::new(HelloAcceptor))
            .with_service(BOOTSTRAP_PEER_TYPE, |_, _| Box::new(GossipService::default()))
            .with_peer_type("basic", PeerTypeConfig::default())
            .with_service("basic", move |_, _| Box::new(GossipService::new(basic.clone())))
    }

    fn stored_ids(sim: &Simulation, id: PeerId) -> Vec<String> {
        sim.peer(id)
            .and_then(|p| p.storage(MESSAGES_STORAGE))
            .and_then(|s| s.as_any().downcast_ref::<MessageStore>())
            .map(|s| s.ids().map(str::to_string).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_relay_stores_once_and_skips_sender() {
        let mut sim = Simulation::new(SimulationConfig::new(3), factory(GossipConfig::default()));
        sim.init_bootstrap_servers(1).unwrap();
        let ids = sim.add_peers(3, "basic").unwrap();
        sim.run_until(Duration::from_millis(500)).unwrap();

        // Triangle a - b - c plus the bootstrap star.
        let (a, b, c) = (ids[0], ids[1], ids[2]);
        sim.connect(a, b).unwrap();
        sim.connect(b, c).unwrap();
        sim.connect(c, a).unwrap();

        let message = GossipMessage::new("x", a, 3, 10);
        sim.with_peer(a, |ctx| {
            ctx.broadcast(Arc::new(message.clone())).map(|_| ())
        })
        .unwrap();
        sim.run_for(Duration::from_secs(2)).unwrap();

        for id in [b, c] {
            assert_eq!(stored_ids(&sim, id), vec!["x".to_string()]);
        }
        // Relays skip the origin, so a never hears its own message back.
        assert!(stored_ids(&sim, a).is_empty());
        assert!(sim.stats().messages_by_type["gossip"] >= 3);
    }

    #[test]
    fn test_zero_ttl_is_not_relayed() {
        let mut sim = Simulation::new(SimulationConfig::new(4), factory(GossipConfig::default()));
        sim.init_bootstrap_servers(1).unwrap();
        let ids = sim.add_peers(3, "basic").unwrap();
        sim.run_until(Duration::from_millis(500)).unwrap();
        let (a, b, c) = (ids[0], ids[1], ids[2]);
        sim.connect(a, b).unwrap();
        sim.connect(b, c).unwrap();

        sim.with_peer(a, |ctx| ctx.send(b, Arc::new(GossipMessage::new("y", a, 0, 10))))
            .unwrap();
        sim.run_for(Duration::from_secs(1)).unwrap();

        assert_eq!(stored_ids(&sim, b), vec!["y".to_string()]);
        assert!(stored_ids(&sim, c).is_empty());
        assert_eq!(sim.stats().messages_by_type["gossip"], 1);
    }

    #[test]
    fn test_producer_stores_and_reschedules() {
        let config = GossipConfig::default()
            .with_fanout(2)
            .with_produce_interval(Duration::from_millis(250));
        let mut sim = Simulation::new(SimulationConfig::new(5), factory(config));
        sim.init_bootstrap_servers(1).unwrap();
        let ids = sim.add_peers(1, "basic").unwrap();
        sim.start_all_peers().unwrap();
        sim.run_until(Duration::from_secs(1)).unwrap();

        let produced = stored_ids(&sim, ids[0]);
        assert_eq!(produced.len(), 4);
        assert!(produced.iter().all(|id| id.starts_with("basic_0-")));
        // Relayed to the bootstrap server, which has nobody else to tell.
        assert!(!stored_ids(&sim, sim.bootstrap_peers()[0]).is_empty());
    }
}
