//! The handle through which a service acts as its peer.

use crate::connection::{Connection, Outbox, TimerRequest};
use crate::peer::{DisconnectCallback, Peer, Peers};
use crate::storage::Storage;
use crate::PeerError;
use p2psim_types::{Hello, MessageRef, PeerId, TimerId};
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, trace};

/// Acting peer plus everything it may touch during one synchronous step.
///
/// The context borrows the whole [`Peers`] arena: `connect` and `disconnect`
/// update the remote side immediately. Messages and timers are buffered in the
/// [`Outbox`] and scheduled by the simulation once the step completes.
pub struct PeerContext<'a> {
    me: PeerId,
    now: Duration,
    service: Option<&'static str>,
    peers: &'a mut Peers,
    outbox: &'a mut Outbox,
    rng: &'a mut ChaCha8Rng,
}

impl<'a> PeerContext<'a> {
    pub fn new(
        me: PeerId,
        now: Duration,
        peers: &'a mut Peers,
        outbox: &'a mut Outbox,
        rng: &'a mut ChaCha8Rng,
    ) -> Result<Self, PeerError> {
        peers.require(me)?;
        Ok(Self {
            me,
            now,
            service: None,
            peers,
            outbox,
            rng,
        })
    }

    pub fn id(&self) -> PeerId {
        self.me
    }

    /// Current logical time.
    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn peer(&self) -> &Peer {
        // The arena is append-only and `me` was checked on construction.
        &self.peers.peers[self.me.index()]
    }

    fn peer_mut(&mut self) -> &mut Peer {
        &mut self.peers.peers[self.me.index()]
    }

    pub fn name(&self) -> &str {
        self.peer().name()
    }

    /// Read-only view of every peer in the simulation.
    pub fn peers(&self) -> &Peers {
        &*self.peers
    }

    /// Name of the service currently executing, if any.
    pub fn service(&self) -> Option<&'static str> {
        self.service
    }

    pub(crate) fn enter_service(&mut self, service: &'static str) -> Option<&'static str> {
        self.service.replace(service)
    }

    pub(crate) fn exit_service(&mut self, previous: Option<&'static str>) {
        self.service = previous;
    }

    /// The shared deterministic random source.
    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut *self.rng
    }

    /// Connected peers in ascending order.
    pub fn connections(&self) -> Vec<PeerId> {
        self.peer().connected_peers()
    }

    pub fn is_connected(&self, other: PeerId) -> bool {
        self.peer().is_connected(other)
    }

    /// See [`Peers::connect`].
    pub fn connect(&mut self, other: PeerId) -> Result<bool, PeerError> {
        self.peers.connect(self.me, other)
    }

    /// See [`Peers::disconnect`].
    pub fn disconnect(&mut self, other: PeerId) -> Result<bool, PeerError> {
        self.peers.disconnect(self.me, other)
    }

    pub fn on_disconnect(&mut self, callback: DisconnectCallback) {
        self.peer_mut().on_disconnect(callback);
    }

    /// Announce this peer to `other` over an ad-hoc, one-sided link.
    ///
    /// Nothing is recorded in either connection map. The receiving side is
    /// expected to connect back when it handles the [`Hello`].
    pub fn bootstrap_connect(&mut self, other: PeerId) -> Result<(), PeerError> {
        let connection = Connection::new(self.peer(), self.peers.require(other)?);
        trace!(
            peer = %self.name(),
            other = %self.peers.label(other),
            "Bootstrap connect"
        );
        connection.send(self.outbox, Arc::new(Hello::new(self.me)), true);
        Ok(())
    }

    /// Fire-and-forget send to a connected peer.
    pub fn send(&mut self, receiver: PeerId, message: MessageRef) -> Result<(), PeerError> {
        let peer = &self.peers.peers[self.me.index()];
        if message.sender() != self.me {
            error!(
                peer = %peer.name(),
                now = ?self.now,
                sender = %message.sender(),
                message_type = message.message_type(),
                "Sending peer should be the message author"
            );
            return Err(PeerError::SenderMismatch {
                peer: peer.name().to_string(),
                sender: message.sender(),
                message_type: message.message_type(),
            });
        }
        let Some(connection) = peer.connection(receiver) else {
            error!(
                peer = %peer.name(),
                now = ?self.now,
                other = %self.peers.label(receiver),
                message_type = message.message_type(),
                "Sending message to a not connected peer"
            );
            return Err(PeerError::NotConnected {
                peer: peer.name().to_string(),
                other: receiver,
            });
        };
        trace!(
            peer = %peer.name(),
            to = %receiver,
            message_type = message.message_type(),
            "Sending message"
        );
        connection.send(self.outbox, message, false);
        Ok(())
    }

    /// Send to `min(fanout, |candidates|)` neighbours chosen uniformly at
    /// random, where candidates are the connections not in `except`.
    ///
    /// Returns the chosen peers.
    pub fn gossip(
        &mut self,
        message: MessageRef,
        fanout: usize,
        except: &BTreeSet<PeerId>,
    ) -> Result<Vec<PeerId>, PeerError> {
        let candidates: Vec<PeerId> = self
            .connections()
            .into_iter()
            .filter(|p| !except.contains(p))
            .collect();
        let amount = fanout.min(candidates.len());
        let targets: Vec<PeerId> = candidates
            .choose_multiple(&mut *self.rng, amount)
            .copied()
            .collect();
        for &target in &targets {
            self.send(target, Arc::clone(&message))?;
        }
        Ok(targets)
    }

    /// Send to every connected peer. Returns the number of sends.
    pub fn broadcast(&mut self, message: MessageRef) -> Result<usize, PeerError> {
        let targets = self.connections();
        for &target in &targets {
            self.send(target, Arc::clone(&message))?;
        }
        Ok(targets.len())
    }

    pub fn storage(&self, name: &str) -> Option<&dyn Storage> {
        self.peer().storage(name)
    }

    pub fn add_storage(&mut self, name: impl Into<String>, storage: Box<dyn Storage>) {
        self.peer_mut().add_storage(name, storage);
    }

    /// Add `value` under `id` to the storage registered as `storage_name`.
    pub fn store(
        &mut self,
        storage_name: &str,
        id: &str,
        value: MessageRef,
    ) -> Result<(), PeerError> {
        let now = self.now;
        let result = self.peer_mut().store(storage_name, id, value);
        if let Err(PeerError::UnknownStorage { peer, storage }) = &result {
            error!(peer = %peer, now = ?now, storage = %storage, "No storage found");
        }
        result
    }

    /// Schedule `timer` to fire on the calling runner after `delay`.
    pub fn schedule_timer(&mut self, delay: Duration, timer: TimerId) -> Result<(), PeerError> {
        let Some(service) = self.service else {
            error!(
                peer = %self.name(),
                now = ?self.now,
                %timer,
                "Timer scheduled outside of a service"
            );
            return Err(PeerError::NoActiveService {
                peer: self.name().to_string(),
            });
        };
        self.outbox.push_timer(TimerRequest {
            peer: self.me,
            service,
            delay,
            timer,
        });
        Ok(())
    }

    /// Ask the clock to stop once the current step completes.
    pub fn stop_simulation(&mut self) {
        self.outbox.request_stop();
    }
}
