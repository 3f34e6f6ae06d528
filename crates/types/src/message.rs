//! Message trait and the built-in bootstrap announcement.

use crate::PeerId;
use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

/// Size assumed for a message that does not override [`Message::size_bytes`].
pub const DEFAULT_MESSAGE_SIZE: u64 = 64;

/// A typed, immutable payload tagged with the peer that authored it.
///
/// `message_type()` is the dispatch key: a peer routes an incoming message to
/// every handler that declared interest in that type id. Implementors return
/// the same string from both `message_type_id()` and `message_type()`.
pub trait Message: Any + Debug + Send + Sync {
    /// Unique message type identifier for routing.
    fn message_type_id() -> &'static str
    where
        Self: Sized;

    /// Type identifier of this instance.
    fn message_type(&self) -> &'static str;

    /// The peer that authored the message.
    fn sender(&self) -> PeerId;

    /// Size on the wire, used for transmission delay.
    fn size_bytes(&self) -> u64 {
        DEFAULT_MESSAGE_SIZE
    }

    fn as_any(&self) -> &dyn Any;
}

/// Shared handle to an immutable message.
///
/// Gossip and broadcast hand the same message to many connections, so messages
/// are reference counted rather than cloned.
pub type MessageRef = Arc<dyn Message>;

impl dyn Message {
    /// Downcast to a concrete message type.
    pub fn downcast_ref<M: Message>(&self) -> Option<&M> {
        self.as_any().downcast_ref::<M>()
    }

    /// Whether this message is of concrete type `M`.
    pub fn is<M: Message>(&self) -> bool {
        self.as_any().is::<M>()
    }
}

/// Announcement a new peer sends to a bootstrap peer over an ad-hoc link.
///
/// The receiving side is expected to connect back to `sender`, which completes
/// the otherwise one-sided bootstrap connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    pub sender: PeerId,
}

impl Hello {
    pub fn new(sender: PeerId) -> Self {
        Self { sender }
    }
}

impl Message for Hello {
    fn message_type_id() -> &'static str {
        "hello"
    }

    fn message_type(&self) -> &'static str {
        Self::message_type_id()
    }

    fn sender(&self) -> PeerId {
        self.sender
    }

    fn size_bytes(&self) -> u64 {
        16
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
