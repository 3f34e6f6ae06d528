//! Creates peers of named types, pre-wired with their services and storage.

use crate::SimulationError;
use p2psim_core::{Peer, Service, Storage};
use p2psim_types::PeerId;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::fmt;

/// Builds one service instance for a newly created peer.
pub type ServiceBuilder = Box<dyn Fn(PeerId, &PeerTypeConfig) -> Box<dyn Service>>;

/// Builds one storage instance for a newly created peer.
pub type StorageBuilder = Box<dyn Fn() -> Box<dyn Storage>>;

/// Physical characteristics shared by every peer of a type.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerTypeConfig {
    /// Upload capacity in Mbit/s.
    pub bandwidth_ul: f64,
    /// Download capacity in Mbit/s.
    pub bandwidth_dl: f64,
    /// Locations a new peer is placed in, chosen uniformly.
    pub locations: Vec<String>,
}

impl Default for PeerTypeConfig {
    fn default() -> Self {
        Self {
            bandwidth_ul: 10.0,
            bandwidth_dl: 50.0,
            locations: vec!["default".to_string()],
        }
    }
}

impl PeerTypeConfig {
    pub fn with_bandwidth(mut self, upload: f64, download: f64) -> Self {
        self.bandwidth_ul = upload;
        self.bandwidth_dl = download;
        self
    }

    pub fn with_locations<I, S>(mut self, locations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.locations = locations.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Default)]
struct PeerType {
    config: PeerTypeConfig,
    services: Vec<ServiceBuilder>,
    storages: Vec<(String, StorageBuilder)>,
    created: usize,
}

/// Peer factory keyed by peer type.
#[derive(Default)]
pub struct PeerFactory {
    types: BTreeMap<String, PeerType>,
}

impl fmt::Debug for PeerFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, peer_type) in &self.types {
            map.entry(name, &(&peer_type.config, peer_type.services.len()));
        }
        map.finish()
    }
}

impl PeerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or reconfigure a peer type, keeping its services.
    pub fn add_peer_type(&mut self, peer_type: impl Into<String>, config: PeerTypeConfig) {
        self.types.entry(peer_type.into()).or_default().config = config;
    }

    pub fn with_peer_type(mut self, peer_type: impl Into<String>, config: PeerTypeConfig) -> Self {
        self.add_peer_type(peer_type, config);
        self
    }

    /// Add a service to every future peer of `peer_type`.
    ///
    /// Unknown types are created with the default configuration.
    pub fn add_service<F>(&mut self, peer_type: impl Into<String>, builder: F)
    where
        F: Fn(PeerId, &PeerTypeConfig) -> Box<dyn Service> + 'static,
    {
        self.types
            .entry(peer_type.into())
            .or_default()
            .services
            .push(Box::new(builder));
    }

    pub fn with_service<F>(mut self, peer_type: impl Into<String>, builder: F) -> Self
    where
        F: Fn(PeerId, &PeerTypeConfig) -> Box<dyn Service> + 'static,
    {
        self.add_service(peer_type, builder);
        self
    }

    /// Attach a storage under `name` to every future peer of `peer_type`.
    pub fn add_storage<F>(
        &mut self,
        peer_type: impl Into<String>,
        name: impl Into<String>,
        builder: F,
    ) where
        F: Fn() -> Box<dyn Storage> + 'static,
    {
        self.types
            .entry(peer_type.into())
            .or_default()
            .storages
            .push((name.into(), Box::new(builder)));
    }

    pub fn with_storage<F>(
        mut self,
        peer_type: impl Into<String>,
        name: impl Into<String>,
        builder: F,
    ) -> Self
    where
        F: Fn() -> Box<dyn Storage> + 'static,
    {
        self.add_storage(peer_type, name, builder);
        self
    }

    pub fn peer_types(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    pub fn config(&self, peer_type: &str) -> Option<&PeerTypeConfig> {
        self.types.get(peer_type).map(|t| &t.config)
    }

    /// Create peer `id` of `peer_type`, named `"{peer_type}_{n}"`.
    pub fn create_peer(
        &mut self,
        id: PeerId,
        peer_type: &str,
        rng: &mut ChaCha8Rng,
    ) -> Result<Peer, SimulationError> {
        let entry = self
            .types
            .get_mut(peer_type)
            .ok_or_else(|| SimulationError::UnknownPeerType(peer_type.to_string()))?;

        let name = format!("{peer_type}_{}", entry.created);
        entry.created += 1;
        let location = entry
            .config
            .locations
            .choose(rng)
            .cloned()
            .unwrap_or_else(|| "default".to_string());

        let mut peer = Peer::new(
            id,
            name,
            peer_type,
            location,
            entry.config.bandwidth_ul,
            entry.config.bandwidth_dl,
        );
        for (name, build) in &entry.storages {
            peer.add_storage(name.clone(), build());
        }
        for build in &entry.services {
            peer.add_service(build(id, &entry.config));
        }
        Ok(peer)
    }
}
