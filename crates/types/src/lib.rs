//! Core types for the peer-to-peer simulator.
//!
//! This crate provides the foundational types shared by every layer:
//!
//! - **Identifiers**: [`PeerId`], [`TimerId`]
//! - **Messages**: the [`Message`] trait, [`MessageRef`] and the built-in
//!   [`Hello`] announcement used by bootstrap connections
//!
//! # Design Philosophy
//!
//! This crate has no dependencies, including on other workspace crates, making
//! it the foundation layer.

mod identifiers;
mod message;

pub use identifiers::{PeerId, TimerId};
pub use message::{Hello, Message, MessageRef, DEFAULT_MESSAGE_SIZE};
