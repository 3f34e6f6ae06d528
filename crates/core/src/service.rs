//! Service capabilities and the per-peer registry.
//!
//! A service is a unit of protocol logic attached to a peer. It opts into
//! each capability by returning `Some(self)` from the matching accessor:
//!
//! - [`Handler`]: declares message types and reacts to each delivery
//! - [`Runner`]: has a start hook, plus timers it schedules for itself
//!
//! A service may provide either, both, or neither.

use crate::context::PeerContext;
use crate::PeerError;
use p2psim_types::{Hello, Message, MessageRef, TimerId};
use std::collections::HashMap;
use tracing::{debug, error};

pub trait Service {
    /// Registry key. Registering a second service with the same name
    /// replaces the first.
    fn name(&self) -> &'static str;

    fn as_handler(&mut self) -> Option<&mut dyn Handler> {
        None
    }

    fn as_runner(&mut self) -> Option<&mut dyn Runner> {
        None
    }
}

pub trait Handler {
    /// Message type ids this handler consumes.
    fn messages(&self) -> Vec<&'static str>;

    fn handle_message(
        &mut self,
        ctx: &mut PeerContext<'_>,
        message: &MessageRef,
    ) -> Result<(), PeerError>;
}

pub trait Runner {
    /// Called once the peer goes live.
    fn start(&mut self, ctx: &mut PeerContext<'_>) -> Result<(), PeerError>;

    /// Called when a timer scheduled by this service fires.
    fn on_timer(&mut self, ctx: &mut PeerContext<'_>, timer: TimerId) -> Result<(), PeerError> {
        let _ = (ctx, timer);
        Ok(())
    }
}

/// Services registered on one peer, with the message route table.
#[derive(Default)]
pub struct ServiceRegistry {
    services: Vec<Box<dyn Service>>,
    /// Service name -> index into `services`.
    slots: HashMap<&'static str, usize>,
    /// Handler names, registration order.
    handlers: Vec<&'static str>,
    /// Runner names, registration order.
    runners: Vec<&'static str>,
    /// Message type -> consuming handler names, registration order.
    mh_map: HashMap<&'static str, Vec<&'static str>>,
}

impl ServiceRegistry {
    /// Register `service` under its name according to its capabilities.
    pub fn add(&mut self, mut service: Box<dyn Service>) {
        let name = service.name();
        let slot = match self.slots.get(name).copied() {
            Some(slot) => {
                self.unroute(name);
                slot
            }
            None => self.services.len(),
        };

        if let Some(handler) = service.as_handler() {
            for message_type in handler.messages() {
                let routes = self.mh_map.entry(message_type).or_default();
                if !routes.contains(&name) {
                    routes.push(name);
                }
            }
            self.handlers.push(name);
        }
        if service.as_runner().is_some() {
            self.runners.push(name);
        }

        debug!(service = name, "Service registered");
        if slot == self.services.len() {
            self.services.push(service);
        } else {
            self.services[slot] = service;
        }
        self.slots.insert(name, slot);
    }

    /// Drop every route and capability entry naming `name`.
    fn unroute(&mut self, name: &'static str) {
        self.handlers.retain(|n| *n != name);
        self.runners.retain(|n| *n != name);
        for routes in self.mh_map.values_mut() {
            routes.retain(|n| *n != name);
        }
        self.mh_map.retain(|_, routes| !routes.is_empty());
    }

    /// Registered service names, registration order.
    pub fn names(&self) -> Vec<&'static str> {
        let mut by_slot: Vec<(usize, &'static str)> =
            self.slots.iter().map(|(name, slot)| (*slot, *name)).collect();
        by_slot.sort_unstable();
        by_slot.into_iter().map(|(_, name)| name).collect()
    }

    pub fn handlers(&self) -> &[&'static str] {
        &self.handlers
    }

    pub fn runners(&self) -> &[&'static str] {
        &self.runners
    }

    /// Handlers routed for `message_type`, registration order.
    pub fn routes(&self, message_type: &str) -> &[&'static str] {
        self.mh_map
            .get(message_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn handles(&self, message_type: &str) -> bool {
        self.mh_map.contains_key(message_type)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Pass `message` to every handler routed for its type.
    pub fn dispatch(
        &mut self,
        ctx: &mut PeerContext<'_>,
        message: &MessageRef,
    ) -> Result<(), PeerError> {
        let message_type = message.message_type();
        let Some(routes) = self.mh_map.get(message_type) else {
            error!(
                peer = %ctx.name(),
                now = ?ctx.now(),
                message_type,
                sender = %message.sender(),
                "No handler for the message"
            );
            return Err(PeerError::NoHandler {
                peer: ctx.name().to_string(),
                message_type,
            });
        };

        let targets: Vec<(&'static str, usize)> = routes
            .iter()
            .filter_map(|name| self.slots.get(name).map(|slot| (*name, *slot)))
            .collect();
        for (name, slot) in targets {
            if let Some(handler) = self.services[slot].as_handler() {
                let previous = ctx.enter_service(name);
                let result = handler.handle_message(ctx, message);
                ctx.exit_service(previous);
                result?;
            }
        }
        Ok(())
    }

    /// Invoke every runner's start hook, registration order.
    pub fn start_all(&mut self, ctx: &mut PeerContext<'_>) -> Result<(), PeerError> {
        for name in self.runners.clone() {
            let Some(slot) = self.slots.get(name).copied() else {
                continue;
            };
            if let Some(runner) = self.services[slot].as_runner() {
                let previous = ctx.enter_service(name);
                let result = runner.start(ctx);
                ctx.exit_service(previous);
                result?;
            }
        }
        Ok(())
    }

    /// Deliver a timer to the runner named `service`.
    ///
    /// Timers outliving their service (it was replaced by a non-runner) are
    /// dropped.
    pub fn fire_timer(
        &mut self,
        ctx: &mut PeerContext<'_>,
        service: &'static str,
        timer: TimerId,
    ) -> Result<(), PeerError> {
        let runner = self
            .slots
            .get(service)
            .copied()
            .and_then(|slot| self.services[slot].as_runner());
        let Some(runner) = runner else {
            debug!(peer = %ctx.name(), service, %timer, "Dropping timer without runner");
            return Ok(());
        };
        let previous = ctx.enter_service(service);
        let result = runner.on_timer(ctx, timer);
        ctx.exit_service(previous);
        result
    }
}

/// Completes the bootstrap handshake: connects back to the sender of every
/// [`Hello`].
#[derive(Debug, Default, Clone, Copy)]
pub struct HelloAcceptor;

impl Service for HelloAcceptor {
    fn name(&self) -> &'static str {
        "HelloAcceptor"
    }

    fn as_handler(&mut self) -> Option<&mut dyn Handler> {
        Some(self)
    }
}

impl Handler for HelloAcceptor {
    fn messages(&self) -> Vec<&'static str> {
        vec![Hello::message_type_id()]
    }

    fn handle_message(
        &mut self,
        ctx: &mut PeerContext<'_>,
        message: &MessageRef,
    ) -> Result<(), PeerError> {
        if let Some(hello) = message.downcast_ref::<Hello>() {
            ctx.connect(hello.sender)?;
        }
        Ok(())
    }
}
