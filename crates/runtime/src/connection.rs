//! Request/response correlation on top of a transport.
//!
//! # Message Flow
//!
//! 1. Caller invokes [`Connection::request`] with a kind, an id, and a payload
//! 2. Api payloads are serialized and sealed under the key for that id
//! 3. A oneshot completion is registered in the [`RequestRegistry`]
//! 4. The frame is written through the transport
//! 5. [`Connection::run`] receives frames and correlates them by id
//! 6. Encrypted replies are opened under the key for their id
//! 7. The registry completes the waiting caller
//!
//! The receive loop is the only place inbound frames are handled, so
//! dispatches never overlap within one connection. Unmatched frames are
//! dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use beet_protocol::{ErrorPayload, InboundMessage, MessageId, OutboundMessage, RequestType};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cipher::SessionCipher;
use crate::error::{Error, Result};
use crate::registry::RequestRegistry;
use crate::transport::{Transport, TransportEvent, TransportParts, TransportReceiver};

/// Session-level hooks invoked from the receive loop.
pub trait ConnectionObserver: Send + Sync {
	fn on_opened(&self, _endpoint: &str) {}

	/// The socket is gone; every pending request has been rejected.
	fn on_closed(&self) {}

	/// The companion revoked the identity while answering `request_id`.
	fn on_revoked(&self, _request_id: u64) {}
}

enum Dispatch {
	Continue,
	Revoked,
}

type Inbound = (Box<dyn TransportReceiver>, mpsc::UnboundedReceiver<TransportEvent>);

/// Correlating connection to the companion.
///
/// Safe to share through `Arc`; any number of requests may be in flight and
/// replies may arrive in any order.
pub struct Connection {
	endpoint: String,
	registry: RequestRegistry,
	sender: tokio::sync::Mutex<Box<dyn Transport>>,
	inbound: Mutex<Option<Inbound>>,
	cipher: RwLock<Option<SessionCipher>>,
	observer: RwLock<Option<Arc<dyn ConnectionObserver>>>,
	request_timeout: Option<Duration>,
	closed: AtomicBool,
}

impl Connection {
	pub fn new(parts: TransportParts) -> Self {
		Self {
			endpoint: parts.endpoint,
			registry: RequestRegistry::new(),
			sender: tokio::sync::Mutex::new(parts.sender),
			inbound: Mutex::new(Some((parts.receiver, parts.events))),
			cipher: RwLock::new(None),
			observer: RwLock::new(None),
			request_timeout: None,
			closed: AtomicBool::new(false),
		}
	}

	/// Bounds how long any single request waits for its reply.
	pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
		self.request_timeout = timeout;
		self
	}

	pub fn endpoint(&self) -> &str {
		&self.endpoint
	}

	pub fn registry(&self) -> &RequestRegistry {
		&self.registry
	}

	pub fn set_cipher(&self, cipher: Option<SessionCipher>) {
		*self.cipher.write() = cipher;
	}

	pub fn has_cipher(&self) -> bool {
		self.cipher.read().is_some()
	}

	pub fn set_observer(&self, observer: Arc<dyn ConnectionObserver>) {
		*self.observer.write() = Some(observer);
	}

	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	/// Sends one request and waits for its correlated reply.
	///
	/// The caller picks `id`: api ids come from the commitment chain, the rest
	/// from [`crate::registry::generate_id`]. Dropping the returned future
	/// removes the request from the table.
	pub async fn request(&self, kind: RequestType, id: u64, payload: Value) -> Result<Value> {
		if self.is_closed() {
			return Err(Error::ConnectionClosed);
		}

		let wire_payload = if kind.is_encrypted() {
			let plaintext = serde_json::to_string(&payload)?;
			let guard = self.cipher.read();
			let cipher = guard.as_ref().ok_or(Error::NoSessionKey)?;
			Value::String(cipher.encrypt(&plaintext, id)?)
		} else {
			payload
		};

		let pending = self.registry.register(id, kind)?;
		let _cleanup = CancelOnDrop {
			registry: &self.registry,
			id,
		};

		let frame = serde_json::to_value(OutboundMessage::new(kind, id, wire_payload))?;
		self.sender.lock().await.send(frame).await?;
		debug!(target = "beet.connection", id, kind = %kind, "request dispatched");

		match self.request_timeout {
			Some(limit) => tokio::time::timeout(limit, pending.wait())
				.await
				.unwrap_or_else(|_| Err(Error::Timeout(format!("{kind} request {id} got no reply")))),
			None => pending.wait().await,
		}
	}

	/// Runs the receive loop until the socket closes or the identity is revoked.
	///
	/// Spawn this once per connection; a second call returns immediately.
	pub async fn run(&self) {
		let Some((receiver, mut events)) = self.inbound.lock().take() else {
			warn!(target = "beet.connection", "receive loop already started");
			return;
		};

		let pump = tokio::spawn(async move {
			if let Err(err) = receiver.run().await {
				debug!(target = "beet.connection", error = %err, "transport receiver ended with error");
			}
		});

		while let Some(event) = events.recv().await {
			match event {
				TransportEvent::Opened { endpoint } => {
					debug!(target = "beet.connection", endpoint = %endpoint, "channel open");
					if let Some(observer) = self.observer() {
						observer.on_opened(&endpoint);
					}
				}
				TransportEvent::Message(value) => {
					if let Dispatch::Revoked = self.handle_frame(value) {
						self.shutdown(|| Error::Revoked).await;
						break;
					}
				}
				TransportEvent::Error(message) => {
					warn!(target = "beet.connection", error = %message, "transport error");
				}
				TransportEvent::Closed => break,
			}
		}

		self.closed.store(true, Ordering::SeqCst);
		let rejected = self.registry.reject_all(|| Error::ConnectionClosed);
		debug!(target = "beet.connection", rejected, "receive loop ended");
		if let Some(observer) = self.observer() {
			observer.on_closed();
		}
		pump.abort();
	}

	/// Closes the transport and rejects everything still pending.
	pub async fn close(&self) {
		self.shutdown(|| Error::ConnectionClosed).await;
	}

	async fn shutdown(&self, error: impl Fn() -> Error) {
		if self.closed.swap(true, Ordering::SeqCst) {
			return;
		}
		if let Err(err) = self.sender.lock().await.close().await {
			debug!(target = "beet.connection", error = %err, "close handshake failed");
		}
		self.registry.reject_all(error);
	}

	fn observer(&self) -> Option<Arc<dyn ConnectionObserver>> {
		self.observer.read().clone()
	}

	fn handle_frame(&self, value: Value) -> Dispatch {
		match serde_json::from_value::<InboundMessage>(value.clone()) {
			Ok(message) => self.dispatch(message),
			Err(err) => {
				let id = value
					.get("id")
					.and_then(|raw| serde_json::from_value::<MessageId>(raw.clone()).ok())
					.and_then(|id| id.as_u64());
				warn!(target = "beet.connection", ?id, error = %err, "malformed frame");
				if let Some(id) = id {
					self.registry.reject(id, Error::Protocol(format!("malformed reply: {err}")));
				}
				Dispatch::Continue
			}
		}
	}

	fn dispatch(&self, message: InboundMessage) -> Dispatch {
		let Some(id) = message.request_id() else {
			debug!(target = "beet.connection", kind = ?message.kind, "dropping frame without id");
			return Dispatch::Continue;
		};
		if !self.registry.contains(id) {
			debug!(target = "beet.connection", id, "dropping unmatched frame");
			return Dispatch::Continue;
		}

		let payload = if message.encrypted {
			match self.open_payload(&message.payload, id) {
				Ok(payload) => payload,
				Err(err) => {
					self.registry.reject(id, err);
					return Dispatch::Continue;
				}
			}
		} else {
			message.payload
		};

		if !message.error {
			self.registry.resolve(id, payload);
			return Dispatch::Continue;
		}

		let error = ErrorPayload::from_value(&payload);
		if error.is_revoked() {
			warn!(target = "beet.connection", id, "companion revoked the identity");
			self.registry.reject(id, Error::Revoked);
			if let Some(observer) = self.observer() {
				observer.on_revoked(id);
			}
			return Dispatch::Revoked;
		}

		let text = error.message.unwrap_or_else(|| payload.to_string());
		debug!(target = "beet.connection", id, code = ?error.code, "request rejected");
		self.registry.reject(id, Error::Rejected {
			code: error.code,
			message: text,
		});
		Dispatch::Continue
	}

	/// Decrypts an inbound payload keyed by `id`.
	///
	/// JSON plaintext is returned parsed; anything else as a JSON string.
	fn open_payload(&self, payload: &Value, id: u64) -> Result<Value> {
		let Value::String(sealed) = payload else {
			return Err(Error::Protocol("encrypted payload is not a string".to_string()));
		};
		let guard = self.cipher.read();
		let cipher = guard.as_ref().ok_or(Error::NoSessionKey)?;
		let plaintext = cipher.decrypt(sealed, id)?;
		Ok(serde_json::from_str(&plaintext).unwrap_or(Value::String(plaintext)))
	}
}

struct CancelOnDrop<'a> {
	registry: &'a RequestRegistry,
	id: u64,
}

impl Drop for CancelOnDrop<'_> {
	fn drop(&mut self) {
		self.registry.cancel(self.id);
	}
}
