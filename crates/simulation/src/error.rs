//! Errors that abort a simulation run.

use p2psim_core::PeerError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Peer(#[from] PeerError),

    #[error("unknown peer type {0}")]
    UnknownPeerType(String),

    #[error("no bootstrap peers to connect to")]
    NoBootstrapPeers,
}
