//! Transport, session cipher, and request correlation for the Beet companion
//! protocol.
//!
//! Layering, bottom up:
//!
//! - [`transport`]: WebSocket channel with a one-shot host fallback
//! - [`otp`] and [`cipher`]: counter-keyed session encryption
//! - [`registry`]: request ids, pending table, id commitment chain
//! - [`connection`]: the receive loop that ties them together
//!
//! Identity handling and the public session API live in `beet-rs`.

pub mod cipher;
pub mod connection;
pub mod error;
pub mod fake_transport;
pub mod otp;
pub mod registry;
pub mod transport;

pub use cipher::SessionCipher;
pub use connection::{Connection, ConnectionObserver};
pub use error::{Error, Result};
pub use fake_transport::{FakeConnector, FakeTransportBuilder, FakeTransportController};
pub use otp::Hotp;
pub use registry::{ChainStep, IdChain, PendingRequest, RequestRegistry, commit, generate_id};
pub use transport::{
	Connector, Endpoints, FallbackPolicy, Transport, TransportEvent, TransportParts, TransportReceiver, WebSocketConnector,
	WebSocketTransport, should_fall_back,
};
