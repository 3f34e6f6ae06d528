//! End-to-end scenarios driving the simulation through its public API.

mod common;

use common::{Ping, PingFlood, PingRecorder, ReceiveLog};
use p2psim_core::{HelloAcceptor, PeerContext, PeerError, Runner, Service};
use p2psim_network_memory::NetworkConfig;
use p2psim_simulation::{
    PeerFactory, PeerTypeConfig, Simulation, SimulationConfig, SimulationError,
    BOOTSTRAP_PEER_TYPE,
};
use p2psim_types::{PeerId, TimerId};
use std::time::Duration;
use tracing_test::traced_test;

fn bootstrap_factory() -> PeerFactory {
    PeerFactory::new()
        .with_peer_type(BOOTSTRAP_PEER_TYPE, PeerTypeConfig::default())
        .with_service(BOOTSTRAP_PEER_TYPE, |_, _| Box::new(HelloAcceptor))
        .with_peer_type("basic", PeerTypeConfig::default())
}

fn simulation(seed: u64, factory: PeerFactory) -> Simulation {
    Simulation::new(SimulationConfig::new(seed), factory)
}

#[traced_test]
#[test]
fn test_bootstrap_star() {
    let mut sim = simulation(1, bootstrap_factory());
    let bootstrap = sim.init_bootstrap_servers(1).unwrap();
    let basic = sim.add_peers(3, "basic").unwrap();
    sim.start_all_peers().unwrap();
    sim.run_until(Duration::from_secs(1)).unwrap();

    // Every basic peer reached the bootstrap server and got a link back.
    for id in &basic {
        assert!(sim.peers().is_connected(*id, bootstrap[0]));
        assert!(sim.peers().is_connected(bootstrap[0], *id));
    }

    let without = sim.connection_graph(false);
    assert_eq!(without.node_count(), 3);
    assert_eq!(without.edge_count(), 0);

    let with = sim.connection_graph(true);
    assert_eq!(with.node_count(), 4);
    assert_eq!(with.edge_count(), 3);
    for edge in with.edge_indices() {
        let (a, b) = with.edge_endpoints(edge).unwrap();
        assert!(with[a] == "bootstrap_0" || with[b] == "bootstrap_0");
    }

    assert_eq!(sim.stats().messages_by_type.get("hello"), Some(&3));
    assert_eq!(sim.now(), Duration::from_secs(1));
}

#[test]
fn test_peer_names_per_type() {
    let mut sim = simulation(2, bootstrap_factory());
    sim.init_bootstrap_servers(2).unwrap();
    sim.add_peers(3, "basic").unwrap();

    assert_eq!(
        sim.peer_names("basic"),
        Some(vec!["basic_0", "basic_1", "basic_2"])
    );
    assert_eq!(sim.peer_names("missing"), None);
    assert_eq!(sim.bootstrap_peers().len(), 2);
    assert_eq!(sim.peer_by_name("bootstrap_1").unwrap().peer_type(), BOOTSTRAP_PEER_TYPE);
}

#[test]
fn test_add_peers_requires_bootstrap() {
    let mut sim = simulation(3, bootstrap_factory());
    let err = sim.add_peers(1, "basic").unwrap_err();
    assert_eq!(err, SimulationError::NoBootstrapPeers);
    assert!(sim.peers().is_empty());
}

#[test]
fn test_unknown_peer_type() {
    let mut sim = simulation(4, bootstrap_factory());
    sim.init_bootstrap_servers(1).unwrap();
    let err = sim.add_peers(1, "ghost").unwrap_err();
    assert_eq!(err, SimulationError::UnknownPeerType("ghost".to_string()));
}

#[test]
fn test_messages_routed_to_handler() {
    let log = ReceiveLog::default();
    let recorder_log = log.clone();
    let factory = bootstrap_factory()
        .with_service("basic", move |_, _| Box::new(PingRecorder::new(&recorder_log)));
    let config = SimulationConfig::new(5)
        .with_network(NetworkConfig::default().with_jitter_fraction(0.0));
    let mut sim = Simulation::new(config, factory);
    sim.init_bootstrap_servers(1).unwrap();
    let ids = sim.add_peers(2, "basic").unwrap();
    sim.run_until(Duration::from_secs(1)).unwrap();

    let (a, b) = (ids[0], ids[1]);
    sim.connect(a, b).unwrap();
    sim.with_peer(a, |ctx| {
        ctx.send(b, Ping::new(a, 1))?;
        ctx.send(b, Ping::new(a, 2))
    })
    .unwrap();
    sim.run_for(Duration::from_secs(1)).unwrap();

    let received: Vec<(PeerId, PeerId, u64)> = log
        .borrow()
        .iter()
        .map(|(_, to, from, seq)| (*to, *from, *seq))
        .collect();
    // No jitter and equal sizes: arrival order follows send order.
    assert_eq!(received, vec![(b, a, 1), (b, a, 2)]);
    assert_eq!(sim.stats().messages_by_type.get("ping"), Some(&2));
}

#[traced_test]
#[test]
fn test_in_flight_message_dropped_after_disconnect() {
    let log = ReceiveLog::default();
    let recorder_log = log.clone();
    let factory = bootstrap_factory()
        .with_service("basic", move |_, _| Box::new(PingRecorder::new(&recorder_log)));
    let mut sim = simulation(6, factory);
    sim.init_bootstrap_servers(1).unwrap();
    let ids = sim.add_peers(2, "basic").unwrap();
    sim.run_until(Duration::from_secs(1)).unwrap();

    let (a, b) = (ids[0], ids[1]);
    sim.connect(a, b).unwrap();
    sim.with_peer(a, |ctx| ctx.send(b, Ping::new(a, 7))).unwrap();
    sim.disconnect(a, b).unwrap();
    sim.run_for(Duration::from_secs(1)).unwrap();

    assert!(log.borrow().is_empty());
    assert_eq!(sim.stats().messages_dropped_disconnected, 1);
    assert!(logs_contain("Dropping message over a closed connection"));
}

#[traced_test]
#[test]
fn test_unhandled_message_aborts_run() {
    let mut sim = simulation(7, bootstrap_factory());
    sim.init_bootstrap_servers(1).unwrap();
    let ids = sim.add_peers(2, "basic").unwrap();
    let (a, b) = (ids[0], ids[1]);
    sim.connect(a, b).unwrap();
    sim.with_peer(a, |ctx| ctx.send(b, Ping::new(a, 1))).unwrap();

    let err = sim.run_until(Duration::from_secs(1)).unwrap_err();
    assert!(matches!(
        err,
        SimulationError::Peer(PeerError::NoHandler { message_type: "ping", .. })
    ));
    assert!(logs_contain("Simulation aborted"));
}

#[test]
fn test_send_to_unconnected_peer_fails() {
    let mut sim = simulation(8, bootstrap_factory());
    sim.init_bootstrap_servers(1).unwrap();
    let ids = sim.add_peers(2, "basic").unwrap();
    let (a, b) = (ids[0], ids[1]);

    let err = sim.with_peer(a, |ctx| ctx.send(b, Ping::new(a, 1))).unwrap_err();
    assert!(matches!(
        err,
        SimulationError::Peer(PeerError::NotConnected { other, .. }) if other == b
    ));
}

#[traced_test]
#[test]
fn test_unknown_peer_is_logged() {
    let mut sim = simulation(14, bootstrap_factory());
    let hub = sim.init_bootstrap_servers(1).unwrap()[0];
    let ghost = PeerId(42);

    let err = sim.connect(hub, ghost).unwrap_err();
    assert_eq!(err, SimulationError::Peer(PeerError::UnknownPeer(ghost)));
    let err = sim.with_peer(ghost, |_| Ok(())).unwrap_err();
    assert_eq!(err, SimulationError::Peer(PeerError::UnknownPeer(ghost)));
    assert!(logs_contain("Unknown peer"));
}

#[test]
fn test_total_packet_loss_drops_everything() {
    let config = SimulationConfig::new(9)
        .with_network(NetworkConfig::default().with_packet_loss_rate(1.0));
    let mut sim = Simulation::new(config, bootstrap_factory());
    sim.init_bootstrap_servers(1).unwrap();
    sim.add_peers(4, "basic").unwrap();
    sim.run_until(Duration::from_secs(1)).unwrap();

    assert_eq!(sim.stats().messages_sent, 4);
    assert_eq!(sim.stats().messages_dropped_loss, 4);
    assert_eq!(sim.stats().messages_delivered, 0);
    assert_eq!(sim.connection_graph(true).edge_count(), 0);
}

#[test]
fn test_timers_drive_runners() {
    let log = ReceiveLog::default();
    let flood_log = log.clone();
    let bootstrap_log = log.clone();
    let factory = bootstrap_factory()
        .with_service(BOOTSTRAP_PEER_TYPE, move |_, _| {
            Box::new(PingRecorder::new(&bootstrap_log))
        })
        .with_service("basic", move |_, _| {
            Box::new(PingFlood::new(Duration::from_millis(500), 2, &flood_log))
        });
    let mut sim = simulation(10, factory);
    sim.init_bootstrap_servers(1).unwrap();
    sim.add_peers(3, "basic").unwrap();
    sim.start_all_peers().unwrap();

    // Start plus one re-arm per tick at 0.5s, 1.0s, ... 2.0s.
    sim.run_until(Duration::from_millis(2_000)).unwrap();
    assert_eq!(sim.stats().timers_fired, 3 * 4);
    assert_eq!(sim.stats().timers_set, 3 * 5);
    assert!(!log.borrow().is_empty());
}

struct StopAfter(Duration);

impl Service for StopAfter {
    fn name(&self) -> &'static str {
        "StopAfter"
    }

    fn as_runner(&mut self) -> Option<&mut dyn Runner> {
        Some(self)
    }
}

impl Runner for StopAfter {
    fn start(&mut self, ctx: &mut PeerContext<'_>) -> Result<(), PeerError> {
        ctx.schedule_timer(self.0, TimerId(1))
    }

    fn on_timer(&mut self, ctx: &mut PeerContext<'_>, _timer: TimerId) -> Result<(), PeerError> {
        ctx.stop_simulation();
        Ok(())
    }
}

#[test]
fn test_stop_freezes_clock() {
    let factory = bootstrap_factory()
        .with_service("basic", |_, _| Box::new(StopAfter(Duration::from_secs(2))));
    let mut sim = simulation(11, factory);
    sim.init_bootstrap_servers(1).unwrap();
    sim.add_peers(1, "basic").unwrap();
    sim.start_all_peers().unwrap();

    sim.run_until(Duration::from_secs(10)).unwrap();
    assert!(sim.is_stopped());
    assert_eq!(sim.now(), Duration::from_secs(2));

    // A stopped clock stays stopped.
    sim.run_for(Duration::from_secs(5)).unwrap();
    assert_eq!(sim.now(), Duration::from_secs(2));
}

#[test]
fn test_far_future_timer_saturates_clock() {
    let factory =
        bootstrap_factory().with_service("basic", |_, _| Box::new(StopAfter(Duration::MAX)));
    let mut sim = simulation(13, factory);
    sim.init_bootstrap_servers(1).unwrap();
    sim.add_peers(1, "basic").unwrap();
    sim.run_until(Duration::from_secs(1)).unwrap();

    sim.start_all_peers().unwrap();
    assert_eq!(sim.stats().timers_set, 1);

    sim.run_for(Duration::from_secs(1)).unwrap();
    assert!(!sim.is_stopped());
    assert_eq!(sim.now(), Duration::from_secs(2));

    sim.run_for(Duration::MAX).unwrap();
    assert!(sim.is_stopped());
    assert_eq!(sim.now(), Duration::MAX);
}

#[test]
fn test_run_without_limit_drains_queue() {
    let mut sim = simulation(12, bootstrap_factory());
    sim.init_bootstrap_servers(1).unwrap();
    sim.add_peers(5, "basic").unwrap();

    sim.run(None).unwrap();
    assert_eq!(sim.pending_events(), 0);
    assert_eq!(sim.stats().messages_delivered, 5);
    assert!(sim.now() > Duration::ZERO);
}
