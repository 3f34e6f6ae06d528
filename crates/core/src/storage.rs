//! Named per-peer storage.
//!
//! The peer treats a storage as opaque: it only routes `store(name, id, value)`
//! calls to the storage registered under `name`. Services that need to read
//! back what they stored go through [`Storage::get`]/[`Storage::contains`].

use p2psim_types::MessageRef;
use std::any::Any;
use std::collections::BTreeMap;

/// A storage object attached to a peer under a name.
pub trait Storage {
    /// Record `value` under `id`. Re-adding an id overwrites it.
    fn add(&mut self, id: &str, value: MessageRef);

    fn get(&self, id: &str) -> Option<&MessageRef>;

    fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Number of stored entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn as_any(&self) -> &dyn Any;
}

/// In-memory storage keyed by message id.
///
/// Keys are kept ordered so iteration is reproducible across runs.
#[derive(Debug, Default)]
pub struct MessageStore {
    entries: BTreeMap<String, MessageRef>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl Storage for MessageStore {
    fn add(&mut self, id: &str, value: MessageRef) {
        self.entries.insert(id.to_string(), value);
    }

    fn get(&self, id: &str) -> Option<&MessageRef> {
        self.entries.get(id)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p2psim_types::{Hello, PeerId};
    use std::sync::Arc;

    #[test]
    fn test_add_and_lookup() {
        let mut store = MessageStore::new();
        assert!(store.is_empty());

        store.add("b", Arc::new(Hello::new(PeerId(1))));
        store.add("a", Arc::new(Hello::new(PeerId(2))));

        assert_eq!(store.len(), 2);
        assert!(store.contains("a"));
        assert!(!store.contains("c"));
        assert_eq!(store.get("b").map(|m| m.sender()), Some(PeerId(1)));
        assert_eq!(store.ids().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_readd_overwrites() {
        let mut store = MessageStore::new();
        store.add("a", Arc::new(Hello::new(PeerId(1))));
        store.add("a", Arc::new(Hello::new(PeerId(3))));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("a").map(|m| m.sender()), Some(PeerId(3)));
    }

    #[test]
    fn test_downcast_through_trait_object() {
        let boxed: Box<dyn Storage> = Box::new(MessageStore::new());
        assert!(boxed.as_any().downcast_ref::<MessageStore>().is_some());
    }
}
