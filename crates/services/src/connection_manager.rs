//! Peer discovery.
//!
//! Completes the reciprocal side of `bootstrap_connect` and keeps every peer
//! above a minimum number of neighbours by asking the current ones for theirs.

use crate::messages::{PeerList, RequestPeers};
use p2psim_core::{Handler, PeerContext, PeerError, Runner, Service};
use p2psim_types::{Hello, Message, MessageRef, PeerId, TimerId};
use rand::seq::SliceRandom;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

const REFRESH_TIMER: TimerId = TimerId(0);

/// Connection manager configuration.
#[derive(Debug, Clone)]
pub struct ConnectionManagerConfig {
    /// Below this many connections the peer asks its neighbours for more.
    pub min_peers: usize,

    /// Discovery stops opening links at this many connections. Inbound
    /// `Hello`s are always accepted.
    pub max_peers: usize,

    /// Maximum number of peers returned in one `PeerList`.
    pub peer_list_size: usize,

    /// Interval between connection count checks. Zero disables the checks.
    pub refresh_interval: Duration,
}

impl Default for ConnectionManagerConfig {
    fn default() -> Self {
        Self {
            min_peers: 4,
            max_peers: 8,
            peer_list_size: 5,
            refresh_interval: Duration::from_secs(1),
        }
    }
}

impl ConnectionManagerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_peers(mut self, min_peers: usize) -> Self {
        self.min_peers = min_peers;
        self
    }

    pub fn with_max_peers(mut self, max_peers: usize) -> Self {
        self.max_peers = max_peers;
        self
    }

    pub fn with_peer_list_size(mut self, peer_list_size: usize) -> Self {
        self.peer_list_size = peer_list_size;
        self
    }

    pub fn with_refresh_interval(mut self, refresh_interval: Duration) -> Self {
        self.refresh_interval = refresh_interval;
        self
    }
}

/// Handles `Hello`, `RequestPeers` and `PeerList`; as a runner, periodically
/// tops up the neighbour set.
#[derive(Debug, Default)]
pub struct ConnectionManager {
    config: ConnectionManagerConfig,

    /// Peers we sent a `Hello` to and that have not connected back yet.
    /// Cleared on every refresh.
    pending: BTreeSet<PeerId>,
}

impl ConnectionManager {
    pub fn new(config: ConnectionManagerConfig) -> Self {
        Self {
            config,
            pending: BTreeSet::new(),
        }
    }

    pub fn config(&self) -> &ConnectionManagerConfig {
        &self.config
    }

    fn on_hello(&mut self, ctx: &mut PeerContext<'_>, hello: &Hello) -> Result<(), PeerError> {
        self.pending.remove(&hello.sender);
        if ctx.connect(hello.sender)? {
            debug!(peer = %ctx.name(), other = %hello.sender, "Accepted new peer");
        }
        Ok(())
    }

    fn on_request_peers(
        &mut self,
        ctx: &mut PeerContext<'_>,
        request: &RequestPeers,
    ) -> Result<(), PeerError> {
        let candidates: Vec<PeerId> = ctx
            .connections()
            .into_iter()
            .filter(|p| *p != request.sender)
            .collect();
        let peers: Vec<PeerId> = candidates
            .choose_multiple(ctx.rng(), self.config.peer_list_size)
            .copied()
            .collect();
        trace!(
            peer = %ctx.name(),
            to = %request.sender,
            count = peers.len(),
            "Sending peer list"
        );
        let reply = PeerList::new(ctx.id(), peers);
        ctx.send(request.sender, Arc::new(reply))
    }

    fn on_peer_list(
        &mut self,
        ctx: &mut PeerContext<'_>,
        list: &PeerList,
    ) -> Result<(), PeerError> {
        self.pending.retain(|p| !ctx.is_connected(*p));
        let me = ctx.id();
        for &candidate in &list.peers {
            if ctx.connections().len() + self.pending.len() >= self.config.max_peers {
                break;
            }
            if candidate == me || ctx.is_connected(candidate) || self.pending.contains(&candidate) {
                continue;
            }
            ctx.bootstrap_connect(candidate)?;
            self.pending.insert(candidate);
        }
        Ok(())
    }

    fn refresh(&mut self, ctx: &mut PeerContext<'_>) -> Result<(), PeerError> {
        self.pending.clear();
        let connected = ctx.connections().len();
        if connected < self.config.min_peers {
            let asked = ctx.broadcast(Arc::new(RequestPeers::new(ctx.id())))?;
            debug!(
                peer = %ctx.name(),
                now = ?ctx.now(),
                connected,
                asked,
                "Below minimum peers, requesting more"
            );
        }
        self.schedule_refresh(ctx)
    }

    /// A zero interval disables periodic refresh.
    fn schedule_refresh(&self, ctx: &mut PeerContext<'_>) -> Result<(), PeerError> {
        if self.config.refresh_interval.is_zero() {
            return Ok(());
        }
        ctx.schedule_timer(self.config.refresh_interval, REFRESH_TIMER)
    }
}

impl Service for ConnectionManager {
    fn name(&self) -> &'static str {
        "ConnectionManager"
    }

    fn as_handler(&mut self) -> Option<&mut dyn Handler> {
        Some(self)
    }

    fn as_runner(&mut self) -> Option<&mut dyn Runner> {
        Some(self)
    }
}

impl Handler for ConnectionManager {
    fn messages(&self) -> Vec<&'static str> {
        vec![
            Hello::message_type_id(),
            RequestPeers::message_type_id(),
            PeerList::message_type_id(),
        ]
    }

    fn handle_message(
        &mut self,
        ctx: &mut PeerContext<'_>,
        message: &MessageRef,
    ) -> Result<(), PeerError> {
        if let Some(hello) = message.downcast_ref::<Hello>() {
            self.on_hello(ctx, hello)
        } else if let Some(request) = message.downcast_ref::<RequestPeers>() {
            self.on_request_peers(ctx, request)
        } else if let Some(list) = message.downcast_ref::<PeerList>() {
            self.on_peer_list(ctx, list)
        } else {
            Ok(())
        }
    }
}

impl Runner for ConnectionManager {
    fn start(&mut self, ctx: &mut PeerContext<'_>) -> Result<(), PeerError> {
        self.schedule_refresh(ctx)
    }

    fn on_timer(&mut self, ctx: &mut PeerContext<'_>, _timer: TimerId) -> Result<(), PeerError> {
        self.refresh(ctx)
    }
}
