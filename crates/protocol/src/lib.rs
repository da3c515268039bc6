//! Wire types for the Beet companion protocol.
//!
//! This crate contains the serde-serializable shapes exchanged with the
//! companion wallet over its local WebSocket endpoint. Every frame is a JSON
//! object; outbound frames are `{type, id, payload}` envelopes and inbound
//! frames echo the `id` of the request they answer.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: No behavior beyond serialization/deserialization and small
//!   accessors
//! * 1:1 with the wire: field names match what the companion sends
//! * Stable: Changes only when the wire protocol changes
//!
//! Session semantics (encryption, correlation, linking) live in
//! `beet-runtime` and `beet-rs`.

pub mod chain;
pub mod message;
pub mod payload;

pub use chain::*;
pub use message::*;
pub use payload::*;
