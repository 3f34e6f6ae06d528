//! Deterministic simulation runner.
//!
//! Owns the logical clock, the event queue, every peer and the single random
//! source. Peers never run on their own: a delivery or timer event wakes one
//! peer, which drains its inbound queue synchronously, and the effects it
//! buffered are scheduled before the next event is popped.

use crate::event_queue::{Event, EventKey};
use crate::{PeerFactory, PeerTypeConfig, SimulationConfig, SimulationError};
use p2psim_core::{Outbox, Peer, PeerContext, PeerError, Peers, Service};
use p2psim_network_memory::SimulatedNetwork;
use p2psim_types::PeerId;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error, info, trace};

/// Peer type used for bootstrap servers.
pub const BOOTSTRAP_PEER_TYPE: &str = "bootstrap";

/// Statistics collected during simulation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SimulationStats {
    /// Total events processed.
    pub events_processed: u64,
    /// Messages handed to a connection.
    pub messages_sent: u64,
    /// Payload bytes handed to a connection.
    pub bytes_sent: u64,
    /// Messages that reached a peer's inbound queue.
    pub messages_delivered: u64,
    /// Messages dropped due to packet loss.
    pub messages_dropped_loss: u64,
    /// Messages dropped because the link was torn down while in flight.
    pub messages_dropped_disconnected: u64,
    /// Messages sent, by message type.
    pub messages_by_type: BTreeMap<&'static str, u64>,
    /// Timers set.
    pub timers_set: u64,
    /// Timers fired.
    pub timers_fired: u64,
}

impl SimulationStats {
    /// Total messages dropped (loss + disconnected).
    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped_loss + self.messages_dropped_disconnected
    }
}

/// A peer-to-peer network simulation under one logical clock.
///
/// Given the same seed and the same sequence of driver calls, every run
/// produces identical results.
pub struct Simulation {
    /// Every peer, indexed by `PeerId`.
    peers: Peers,

    /// Non-bootstrap peers by type, creation order.
    peers_by_type: BTreeMap<String, Vec<PeerId>>,

    bootstrap_peers: Vec<PeerId>,

    factory: PeerFactory,

    /// Global event queue, ordered deterministically.
    event_queue: BTreeMap<EventKey, Event>,

    /// Sequence counter for deterministic ordering.
    sequence: u64,

    /// Current simulation time.
    now: Duration,

    network: SimulatedNetwork,

    /// Shared by peers, topology and the network (seeded for determinism).
    rng: ChaCha8Rng,

    /// Effects produced by the step in progress.
    outbox: Outbox,

    /// Set once the clock was stopped; no further events are processed.
    stopped: bool,

    stats: SimulationStats,
}

impl Simulation {
    pub fn new(config: SimulationConfig, factory: PeerFactory) -> Self {
        info!(seed = config.seed, "Created simulation");
        Self {
            peers: Peers::new(),
            peers_by_type: BTreeMap::new(),
            bootstrap_peers: Vec::new(),
            factory,
            event_queue: BTreeMap::new(),
            sequence: 0,
            now: Duration::ZERO,
            network: SimulatedNetwork::new(config.network),
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            outbox: Outbox::new(),
            stopped: false,
            stats: SimulationStats::default(),
        }
    }

    // ─── Accessors ───

    /// Get current simulation time.
    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Events scheduled but not yet processed.
    pub fn pending_events(&self) -> usize {
        self.event_queue.len()
    }

    pub fn peer(&self, id: PeerId) -> Option<&Peer> {
        self.peers.get(id)
    }

    pub fn peer_by_name(&self, name: &str) -> Option<&Peer> {
        self.peers.by_name(name).and_then(|id| self.peers.get(id))
    }

    /// Every peer, bootstrap peers included, in creation order.
    pub fn peers(&self) -> &Peers {
        &self.peers
    }

    pub fn peers_of_type(&self, peer_type: &str) -> &[PeerId] {
        self.peers_by_type
            .get(peer_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Names of the peers of `peer_type`, or `None` for a type with no peers.
    pub fn peer_names(&self, peer_type: &str) -> Option<Vec<&str>> {
        let ids = self.peers_by_type.get(peer_type)?;
        Some(
            ids.iter()
                .filter_map(|id| self.peers.get(*id))
                .map(Peer::name)
                .collect(),
        )
    }

    pub fn peer_types(&self) -> impl Iterator<Item = &str> {
        self.peers_by_type.keys().map(String::as_str)
    }

    pub fn bootstrap_peers(&self) -> &[PeerId] {
        &self.bootstrap_peers
    }

    pub fn is_bootstrap(&self, id: PeerId) -> bool {
        self.bootstrap_peers.contains(&id)
    }

    pub fn network(&self) -> &SimulatedNetwork {
        &self.network
    }

    /// Get a mutable reference to the network for loss configuration.
    pub fn network_mut(&mut self) -> &mut SimulatedNetwork {
        &mut self.network
    }

    pub fn factory_mut(&mut self) -> &mut PeerFactory {
        &mut self.factory
    }

    /// Add a service to every future peer of `peer_type`.
    pub fn add_peer_service<F>(&mut self, peer_type: &str, builder: F)
    where
        F: Fn(PeerId, &PeerTypeConfig) -> Box<dyn Service> + 'static,
    {
        self.factory.add_service(peer_type, builder);
    }

    // ─── Population ───

    fn create_peer(&mut self, peer_type: &str) -> Result<PeerId, SimulationError> {
        let factory = &mut self.factory;
        let rng = &mut self.rng;
        self.peers
            .insert_with(|id| factory.create_peer(id, peer_type, rng))
    }

    /// Create `num` bootstrap peers and start their runners immediately, so
    /// they are live before ordinary peers try to reach them.
    pub fn init_bootstrap_servers(&mut self, num: usize) -> Result<Vec<PeerId>, SimulationError> {
        info!(num, "Init bootstrap servers");
        let mut created = Vec::with_capacity(num);
        for _ in 0..num {
            let id = self.create_peer(BOOTSTRAP_PEER_TYPE)?;
            self.bootstrap_peers.push(id);
            self.start_peer(id)?;
            created.push(id);
        }
        Ok(created)
    }

    /// Create `num` peers of `peer_type`, each announcing itself to a bootstrap
    /// peer chosen uniformly at random. Their runners are not started.
    pub fn add_peers(
        &mut self,
        num: usize,
        peer_type: &str,
    ) -> Result<Vec<PeerId>, SimulationError> {
        info!(num, peer_type, "Creating peers");
        if num > 0 && self.bootstrap_peers.is_empty() {
            error!(peer_type, "No bootstrap servers to connect to");
            return Err(SimulationError::NoBootstrapPeers);
        }
        let mut created = Vec::with_capacity(num);
        for _ in 0..num {
            let id = self.create_peer(peer_type)?;
            let bootstrap = *self
                .bootstrap_peers
                .choose(&mut self.rng)
                .ok_or(SimulationError::NoBootstrapPeers)?;
            self.with_peer(id, |ctx| ctx.bootstrap_connect(bootstrap))?;
            self.peers_by_type
                .entry(peer_type.to_string())
                .or_default()
                .push(id);
            created.push(id);
        }
        Ok(created)
    }

    /// Start the runners of every non-bootstrap peer, type by type.
    pub fn start_all_peers(&mut self) -> Result<(), SimulationError> {
        let ids: Vec<PeerId> = self.peers_by_type.values().flatten().copied().collect();
        for id in ids {
            self.start_peer(id)?;
        }
        Ok(())
    }

    /// Start the runners of one peer.
    pub fn start_peer(&mut self, id: PeerId) -> Result<(), SimulationError> {
        let result = self
            .peers
            .start_all_runners(id, self.now, &mut self.outbox, &mut self.rng);
        self.flush_outbox();
        self.checked(result)
    }

    // ─── Driving peers from outside ───

    /// Act as peer `id` outside of any service; effects are scheduled on return.
    pub fn with_peer<T>(
        &mut self,
        id: PeerId,
        f: impl FnOnce(&mut PeerContext<'_>) -> Result<T, PeerError>,
    ) -> Result<T, SimulationError> {
        let result = self
            .peers
            .with_context(id, self.now, &mut self.outbox, &mut self.rng, f);
        self.flush_outbox();
        self.checked(result)
    }

    pub fn connect(&mut self, a: PeerId, b: PeerId) -> Result<bool, SimulationError> {
        let result = self.peers.connect(a, b);
        self.checked(result)
    }

    pub fn disconnect(&mut self, a: PeerId, b: PeerId) -> Result<bool, SimulationError> {
        let result = self.peers.disconnect(a, b);
        self.checked(result)
    }

    /// Log an unknown peer id at the current time before surfacing the error.
    fn checked<T>(&self, result: Result<T, PeerError>) -> Result<T, SimulationError> {
        if let Err(PeerError::UnknownPeer(id)) = &result {
            error!(peer = %id, now = ?self.now, "Unknown peer");
        }
        Ok(result?)
    }

    // ─── Clock ───

    /// Stop the clock. No further events are processed by any run.
    pub fn stop(&mut self) {
        info!(now = ?self.now, "Simulation stopped");
        self.stopped = true;
    }

    /// Run until `until`, or until no events remain when `None`.
    pub fn run(&mut self, until: Option<Duration>) -> Result<(), SimulationError> {
        match until {
            Some(end_time) => self.run_until(end_time),
            None => self.process_events(None),
        }
    }

    /// Process every event scheduled at or before `end_time`, then advance the
    /// clock to `end_time`.
    pub fn run_until(&mut self, end_time: Duration) -> Result<(), SimulationError> {
        trace!(end_time_secs = end_time.as_secs_f64(), "Running simulation");
        self.process_events(Some(end_time))?;
        if !self.stopped && end_time > self.now {
            self.now = end_time;
        }
        Ok(())
    }

    /// Advance the clock by `duration`.
    pub fn run_for(&mut self, duration: Duration) -> Result<(), SimulationError> {
        self.run_until(self.now.saturating_add(duration))
    }

    fn process_events(&mut self, end_time: Option<Duration>) -> Result<(), SimulationError> {
        self.flush_outbox();
        while !self.stopped {
            let Some((&key, _)) = self.event_queue.first_key_value() else {
                break;
            };
            if end_time.is_some_and(|end| key.time > end) {
                debug!(remaining_events = self.event_queue.len(), "Time limit reached");
                break;
            }
            let Some((key, event)) = self.event_queue.pop_first() else {
                break;
            };
            self.now = key.time;
            self.stats.events_processed += 1;

            let result = self.process_event(key.peer, event);
            self.flush_outbox();
            if let Err(e) = result {
                error!(
                    now = ?self.now,
                    peer = %self.peers.get(key.peer).map(Peer::name).unwrap_or("unknown"),
                    error = %e,
                    "Simulation aborted"
                );
                return Err(e);
            }
        }
        Ok(())
    }

    fn process_event(&mut self, peer: PeerId, event: Event) -> Result<(), SimulationError> {
        trace!(time = ?self.now, peer = %peer, "Processing event");
        match event {
            Event::MessageDelivered {
                from,
                message,
                initial,
            } => {
                if !initial && !self.peers.is_connected(peer, from) {
                    self.stats.messages_dropped_disconnected += 1;
                    debug!(
                        peer = %peer,
                        from = %from,
                        message_type = message.message_type(),
                        "Dropping message over a closed connection"
                    );
                    return Ok(());
                }
                self.stats.messages_delivered += 1;
                self.peers.enqueue(peer, message)?;
                self.peers
                    .drain_mailbox(peer, self.now, &mut self.outbox, &mut self.rng)?;
            }
            Event::TimerFired { service, timer } => {
                self.stats.timers_fired += 1;
                self.peers.fire_timer(
                    peer,
                    service,
                    timer,
                    self.now,
                    &mut self.outbox,
                    &mut self.rng,
                )?;
            }
        }
        Ok(())
    }

    fn schedule_event(&mut self, peer: PeerId, time: Duration, event: Event) -> EventKey {
        self.sequence += 1;
        let key = EventKey::new(time, &event, peer, self.sequence);
        self.event_queue.insert(key, event);
        key
    }

    /// Schedule everything the last step buffered.
    fn flush_outbox(&mut self) {
        for outbound in self.outbox.drain_messages() {
            let message_type = outbound.message.message_type();
            let size = outbound.message.size_bytes();
            self.stats.messages_sent += 1;
            self.stats.bytes_sent += size;
            *self.stats.messages_by_type.entry(message_type).or_default() += 1;

            let (Some(from), Some(to)) = (
                self.peers.get(outbound.from),
                self.peers.get(outbound.to),
            ) else {
                continue;
            };
            let delay = self.network.should_deliver(
                from.location(),
                to.location(),
                size,
                outbound.bandwidth,
                &mut self.rng,
            );
            match delay {
                Some(delay) => {
                    let time = self.now.saturating_add(delay);
                    self.schedule_event(
                        outbound.to,
                        time,
                        Event::MessageDelivered {
                            from: outbound.from,
                            message: outbound.message,
                            initial: outbound.initial,
                        },
                    );
                }
                None => {
                    self.stats.messages_dropped_loss += 1;
                    trace!(
                        from = %outbound.from,
                        to = %outbound.to,
                        message_type,
                        "Message dropped due to packet loss"
                    );
                }
            }
        }

        for request in self.outbox.drain_timers() {
            self.stats.timers_set += 1;
            let time = self.now.saturating_add(request.delay);
            self.schedule_event(
                request.peer,
                time,
                Event::TimerFired {
                    service: request.service,
                    timer: request.timer,
                },
            );
        }

        if self.outbox.take_stop_request() {
            self.stop();
        }
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("now", &self.now)
            .field("peers", &self.peers.len())
            .field("bootstrap_peers", &self.bootstrap_peers)
            .field("pending_events", &self.event_queue.len())
            .field("stopped", &self.stopped)
            .field("stats", &self.stats)
            .finish()
    }
}
