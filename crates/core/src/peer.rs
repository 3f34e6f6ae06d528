//! Peers and the arena that owns them.
//!
//! A [`Peer`] owns its connections, inbound queue, services and storage.
//! Operations that touch two peers at once (connect, disconnect) live on
//! [`Peers`] so both sides are updated in the same synchronous step.

use crate::connection::{Connection, Outbox};
use crate::context::PeerContext;
use crate::service::{Service, ServiceRegistry};
use crate::storage::Storage;
use crate::PeerError;
use p2psim_types::{MessageRef, PeerId, TimerId};
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Observer invoked with `(self, other)` after a link is torn down.
pub type DisconnectCallback = Box<dyn FnMut(PeerId, PeerId)>;

/// A simulated network node.
pub struct Peer {
    id: PeerId,
    name: String,
    peer_type: String,
    location: String,
    /// Upload capacity in Mbit/s.
    bandwidth_ul: f64,
    /// Download capacity in Mbit/s.
    bandwidth_dl: f64,

    /// Outgoing links keyed by the remote peer. Symmetric by invariant,
    /// except transiently during bootstrap.
    pub(crate) connections: BTreeMap<PeerId, Connection>,

    /// Inbound messages, drained FIFO by the receive loop.
    pub(crate) msg_queue: VecDeque<MessageRef>,

    pub(crate) services: ServiceRegistry,
    pub(crate) storage: BTreeMap<String, Box<dyn Storage>>,
    pub(crate) disconnect_callbacks: Vec<DisconnectCallback>,
}

impl Peer {
    pub fn new(
        id: PeerId,
        name: impl Into<String>,
        peer_type: impl Into<String>,
        location: impl Into<String>,
        bandwidth_ul: f64,
        bandwidth_dl: f64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            peer_type: peer_type.into(),
            location: location.into(),
            bandwidth_ul,
            bandwidth_dl,
            connections: BTreeMap::new(),
            msg_queue: VecDeque::new(),
            services: ServiceRegistry::default(),
            storage: BTreeMap::new(),
            disconnect_callbacks: Vec::new(),
        }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn peer_type(&self) -> &str {
        &self.peer_type
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn bandwidth_ul(&self) -> f64 {
        self.bandwidth_ul
    }

    pub fn bandwidth_dl(&self) -> f64 {
        self.bandwidth_dl
    }

    pub fn is_connected(&self, other: PeerId) -> bool {
        self.connections.contains_key(&other)
    }

    pub fn connection(&self, other: PeerId) -> Option<&Connection> {
        self.connections.get(&other)
    }

    /// Outgoing links in ascending peer order.
    pub fn connections(&self) -> impl Iterator<Item = (PeerId, &Connection)> {
        self.connections.iter().map(|(id, cnx)| (*id, cnx))
    }

    /// Connected peers in ascending order.
    pub fn connected_peers(&self) -> Vec<PeerId> {
        self.connections.keys().copied().collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Messages delivered but not yet dispatched.
    pub fn pending_messages(&self) -> usize {
        self.msg_queue.len()
    }

    /// Register a service; see [`ServiceRegistry::add`].
    pub fn add_service(&mut self, service: Box<dyn Service>) {
        self.services.add(service);
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    /// Attach a storage object under `name`, replacing any previous one.
    pub fn add_storage(&mut self, name: impl Into<String>, storage: Box<dyn Storage>) {
        self.storage.insert(name.into(), storage);
    }

    pub fn storage(&self, name: &str) -> Option<&dyn Storage> {
        self.storage.get(name).map(|s| s.as_ref())
    }

    /// Delegate to the storage registered under `storage_name`.
    pub(crate) fn store(
        &mut self,
        storage_name: &str,
        id: &str,
        value: MessageRef,
    ) -> Result<(), PeerError> {
        match self.storage.get_mut(storage_name) {
            Some(storage) => {
                storage.add(id, value);
                Ok(())
            }
            None => Err(PeerError::UnknownStorage {
                peer: self.name.clone(),
                storage: storage_name.to_string(),
            }),
        }
    }

    pub fn on_disconnect(&mut self, callback: DisconnectCallback) {
        self.disconnect_callbacks.push(callback);
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("peer_type", &self.peer_type)
            .field("location", &self.location)
            .field("connections", &self.connections.keys().collect::<Vec<_>>())
            .field("msg_queue", &self.msg_queue.len())
            .field("services", &self.services.names())
            .field("storage", &self.storage.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Peer {}", self.name)
    }
}

/// Append-only arena of every peer in a simulation, indexed by [`PeerId`].
#[derive(Debug, Default)]
pub struct Peers {
    pub(crate) peers: Vec<Peer>,
}

impl Peers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id the next inserted peer will receive.
    pub fn next_id(&self) -> PeerId {
        PeerId(self.peers.len() as u32)
    }

    /// Build and insert a peer under the next free id.
    ///
    /// The builder must construct the peer with the id it is given.
    pub fn insert_with<E>(
        &mut self,
        build: impl FnOnce(PeerId) -> Result<Peer, E>,
    ) -> Result<PeerId, E> {
        let id = self.next_id();
        let peer = build(id)?;
        debug_assert_eq!(peer.id(), id, "peer built with a foreign id");
        info!(peer = %peer.name(), id = %id, location = %peer.location(), "Created peer");
        self.peers.push(peer);
        Ok(id)
    }

    pub fn get(&self, id: PeerId) -> Option<&Peer> {
        self.peers.get(id.index())
    }

    pub fn get_mut(&mut self, id: PeerId) -> Option<&mut Peer> {
        self.peers.get_mut(id.index())
    }

    pub(crate) fn require(&self, id: PeerId) -> Result<&Peer, PeerError> {
        self.get(id).ok_or(PeerError::UnknownPeer(id))
    }

    pub(crate) fn require_mut(&mut self, id: PeerId) -> Result<&mut Peer, PeerError> {
        self.get_mut(id).ok_or(PeerError::UnknownPeer(id))
    }

    pub fn by_name(&self, name: &str) -> Option<PeerId> {
        self.peers.iter().find(|p| p.name() == name).map(Peer::id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peer> {
        self.peers.iter()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Display name for logs; falls back to the id for unknown peers.
    pub(crate) fn label(&self, id: PeerId) -> String {
        self.get(id)
            .map(|p| p.name().to_string())
            .unwrap_or_else(|| id.to_string())
    }

    /// Whether `a` lists `b` among its connections.
    pub fn is_connected(&self, a: PeerId, b: PeerId) -> bool {
        self.get(a).is_some_and(|p| p.is_connected(b))
    }

    /// Connect `a` to `b` and, unless already present, `b` back to `a`.
    ///
    /// Returns `Ok(false)` when `a` was already connected to `b`.
    pub fn connect(&mut self, a: PeerId, b: PeerId) -> Result<bool, PeerError> {
        let connection = Connection::new(self.require(a)?, self.require(b)?);
        if a == b {
            debug!(peer = %self.label(a), "Ignoring connection to self");
            return Ok(false);
        }
        if self.is_connected(a, b) {
            return Ok(false);
        }

        info!(
            peer = %self.label(a),
            other = %self.label(b),
            bandwidth = connection.bandwidth(),
            "Connecting"
        );
        self.require_mut(a)?.connections.insert(b, connection);

        // Reciprocal link; the guard stops the recursion on the way back.
        if !self.is_connected(b, a) {
            self.connect(b, a)?;
        }
        Ok(true)
    }

    /// Tear down the link between `a` and `b` on both sides.
    ///
    /// Disconnect callbacks registered on each side fire once, with that
    /// side's id first. Returns `Ok(false)` when `a` was not connected to `b`.
    pub fn disconnect(&mut self, a: PeerId, b: PeerId) -> Result<bool, PeerError> {
        self.require(b)?;
        if !self.require(a)?.is_connected(b) {
            return Ok(false);
        }

        warn!(peer = %self.label(a), other = %self.label(b), "Breaking connection");
        self.require_mut(a)?.connections.remove(&b);
        if self.is_connected(b, a) {
            self.disconnect(b, a)?;
        }

        let peer = self.require_mut(a)?;
        let mut callbacks = std::mem::take(&mut peer.disconnect_callbacks);
        for callback in callbacks.iter_mut() {
            callback(a, b);
        }
        peer.disconnect_callbacks = callbacks;
        Ok(true)
    }

    /// Append a delivered message to `to`'s inbound queue.
    pub fn enqueue(&mut self, to: PeerId, message: MessageRef) -> Result<(), PeerError> {
        let peer = self.require_mut(to)?;
        trace!(
            peer = %peer.name,
            message_type = message.message_type(),
            queued = peer.msg_queue.len() + 1,
            "Message enqueued"
        );
        peer.msg_queue.push_back(message);
        Ok(())
    }

    /// Run `f` as peer `id`, with its services checked out of the arena.
    fn with_services<T>(
        &mut self,
        id: PeerId,
        now: Duration,
        outbox: &mut Outbox,
        rng: &mut ChaCha8Rng,
        f: impl FnOnce(&mut ServiceRegistry, &mut PeerContext<'_>) -> Result<T, PeerError>,
    ) -> Result<T, PeerError> {
        let mut services = std::mem::take(&mut self.require_mut(id)?.services);
        let result = PeerContext::new(id, now, self, outbox, rng)
            .and_then(|mut ctx| f(&mut services, &mut ctx));
        self.require_mut(id)?.services = services;
        result
    }

    /// Act as peer `id` outside of any service.
    pub fn with_context<T>(
        &mut self,
        id: PeerId,
        now: Duration,
        outbox: &mut Outbox,
        rng: &mut ChaCha8Rng,
        f: impl FnOnce(&mut PeerContext<'_>) -> Result<T, PeerError>,
    ) -> Result<T, PeerError> {
        let mut ctx = PeerContext::new(id, now, self, outbox, rng)?;
        f(&mut ctx)
    }

    /// Dispatch one message to every handler routed for its type.
    pub fn receive(
        &mut self,
        id: PeerId,
        message: MessageRef,
        now: Duration,
        outbox: &mut Outbox,
        rng: &mut ChaCha8Rng,
    ) -> Result<(), PeerError> {
        debug!(
            peer = %self.label(id),
            now = ?now,
            message_type = message.message_type(),
            sender = %message.sender(),
            "Received message"
        );
        self.with_services(id, now, outbox, rng, |services, ctx| {
            services.dispatch(ctx, &message)
        })
    }

    /// The receive loop: dispatch queued messages in arrival order until the
    /// queue is empty. Returns the number of messages dispatched.
    pub fn drain_mailbox(
        &mut self,
        id: PeerId,
        now: Duration,
        outbox: &mut Outbox,
        rng: &mut ChaCha8Rng,
    ) -> Result<usize, PeerError> {
        let mut dispatched = 0;
        while let Some(message) = self.require_mut(id)?.msg_queue.pop_front() {
            self.receive(id, message, now, outbox, rng)?;
            dispatched += 1;
        }
        Ok(dispatched)
    }

    /// Invoke the start hook of every runner on `id`, in registration order.
    pub fn start_all_runners(
        &mut self,
        id: PeerId,
        now: Duration,
        outbox: &mut Outbox,
        rng: &mut ChaCha8Rng,
    ) -> Result<(), PeerError> {
        debug!(peer = %self.label(id), now = ?now, "Starting runners");
        self.with_services(id, now, outbox, rng, |services, ctx| {
            services.start_all(ctx)
        })
    }

    /// Deliver a fired timer to the runner that scheduled it.
    pub fn fire_timer(
        &mut self,
        id: PeerId,
        service: &'static str,
        timer: TimerId,
        now: Duration,
        outbox: &mut Outbox,
        rng: &mut ChaCha8Rng,
    ) -> Result<(), PeerError> {
        self.with_services(id, now, outbox, rng, |services, ctx| {
            services.fire_timer(ctx, service, timer)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MessageStore;
    use p2psim_types::Hello;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;

    fn arena(n: usize) -> Peers {
        let mut peers = Peers::new();
        for i in 0..n {
            peers
                .insert_with(|id| {
                    let name = format!("basic_{i}");
                    Ok::<_, PeerError>(Peer::new(id, name, "basic", "eu", 10.0, 20.0))
                })
                .unwrap();
        }
        peers
    }

    #[test]
    fn test_connect_is_symmetric() {
        let mut peers = arena(2);
        assert!(peers.connect(PeerId(0), PeerId(1)).unwrap());
        assert!(peers.is_connected(PeerId(0), PeerId(1)));
        assert!(peers.is_connected(PeerId(1), PeerId(0)));
    }

    #[test]
    fn test_connect_twice_keeps_one_connection_per_side() {
        let mut peers = arena(2);
        assert!(peers.connect(PeerId(0), PeerId(1)).unwrap());
        assert!(!peers.connect(PeerId(0), PeerId(1)).unwrap());
        assert!(!peers.connect(PeerId(1), PeerId(0)).unwrap());
        assert_eq!(peers.get(PeerId(0)).unwrap().connection_count(), 1);
        assert_eq!(peers.get(PeerId(1)).unwrap().connection_count(), 1);
    }

    #[test]
    fn test_connect_to_self_is_ignored() {
        let mut peers = arena(1);
        assert!(!peers.connect(PeerId(0), PeerId(0)).unwrap());
        assert_eq!(peers.get(PeerId(0)).unwrap().connection_count(), 0);
    }

    #[test]
    fn test_connect_unknown_peer_fails() {
        let mut peers = arena(1);
        assert_eq!(
            peers.connect(PeerId(0), PeerId(5)),
            Err(PeerError::UnknownPeer(PeerId(5)))
        );
    }

    #[test]
    fn test_disconnect_is_symmetric_and_fires_callbacks_once() {
        let mut peers = arena(2);
        let seen: Rc<RefCell<Vec<(PeerId, PeerId)>>> = Rc::default();
        for id in [PeerId(0), PeerId(1)] {
            let seen = Rc::clone(&seen);
            peers.get_mut(id).unwrap().on_disconnect(Box::new(
                move |me: PeerId, other: PeerId| seen.borrow_mut().push((me, other)),
            ));
        }
        peers.connect(PeerId(0), PeerId(1)).unwrap();

        assert!(peers.disconnect(PeerId(0), PeerId(1)).unwrap());
        assert!(!peers.is_connected(PeerId(0), PeerId(1)));
        assert!(!peers.is_connected(PeerId(1), PeerId(0)));

        let seen = seen.borrow();
        assert_eq!(seen.iter().filter(|e| **e == (PeerId(0), PeerId(1))).count(), 1);
        assert_eq!(seen.iter().filter(|e| **e == (PeerId(1), PeerId(0))).count(), 1);
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_disconnect_unconnected_is_noop_without_callback() {
        let mut peers = arena(2);
        let fired = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&fired);
        peers
            .get_mut(PeerId(0))
            .unwrap()
            .on_disconnect(Box::new(move |_: PeerId, _: PeerId| *counter.borrow_mut() += 1));

        assert!(!peers.disconnect(PeerId(0), PeerId(1)).unwrap());
        assert_eq!(*fired.borrow(), 0);
    }

    #[test]
    fn test_store_requires_registered_storage() {
        let mut peers = arena(1);
        let peer = peers.get_mut(PeerId(0)).unwrap();
        let msg: MessageRef = Arc::new(Hello::new(PeerId(0)));

        let err = peer.store("messages", "m1", Arc::clone(&msg)).unwrap_err();
        assert!(matches!(err, PeerError::UnknownStorage { .. }));

        peer.add_storage("messages", Box::new(MessageStore::new()));
        peer.store("messages", "m1", msg).unwrap();
        assert!(peer.storage("messages").unwrap().contains("m1"));
    }

    #[test]
    fn test_by_name_lookup() {
        let peers = arena(3);
        assert_eq!(peers.by_name("basic_2"), Some(PeerId(2)));
        assert_eq!(peers.by_name("missing"), None);
    }
}
