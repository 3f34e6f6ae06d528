//! Fatal peer-level errors.
//!
//! Every variant is a programming or configuration error: none is retried.
//! They propagate out of the dispatch loop and abort the simulation run.

use p2psim_types::PeerId;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeerError {
    #[error("{peer}: no handler for message type {message_type}")]
    NoHandler {
        peer: String,
        message_type: &'static str,
    },

    #[error("{peer}: message {message_type} was authored by {sender}, not by the sending peer")]
    SenderMismatch {
        peer: String,
        sender: PeerId,
        message_type: &'static str,
    },

    #[error("{peer}: sending to a not connected peer {other}")]
    NotConnected { peer: String, other: PeerId },

    #[error("{peer}: no storage {storage} found")]
    UnknownStorage { peer: String, storage: String },

    #[error("unknown peer {0}")]
    UnknownPeer(PeerId),

    #[error("{peer}: timer scheduled outside of a running service")]
    NoActiveService { peer: String },
}
