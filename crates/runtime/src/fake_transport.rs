//! Fake transport for unit testing correlation, encryption, and session flows.
//!
//! Provides an in-memory channel standing in for the companion socket.
//!
//! # Example
//!
//! ```ignore
//! let (parts, controller) = FakeTransportBuilder::new().build();
//! let connection = Arc::new(Connection::new(parts));
//!
//! tokio::spawn({
//!     let conn = Arc::clone(&connection);
//!     async move { conn.run().await }
//! });
//!
//! let fut = connection.request(RequestType::Version, 7, json!(null));
//! controller.inject_response(7, json!({"ok": true}));
//! let result = fut.await?;
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::Value;
use tokio::sync::{Mutex, mpsc};

use crate::error::{Error, Result};
use crate::transport::{Connector, Endpoints, FallbackPolicy, Transport, TransportEvent, TransportParts, TransportReceiver};

/// Endpoint label reported by fake transports.
pub const FAKE_ENDPOINT: &str = "fake://companion";

/// Builder for creating fake transport instances.
#[derive(Debug, Default)]
pub struct FakeTransportBuilder {
	endpoint: Option<String>,
}

impl FakeTransportBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
		self.endpoint = Some(endpoint.into());
		self
	}

	/// Build the fake transport and return both parts and a controller.
	///
	/// Returns [`TransportParts`] for creating a [`Connection`] and a
	/// [`FakeTransportController`] for injecting frames and inspecting sent ones.
	///
	/// [`Connection`]: crate::connection::Connection
	pub fn build(self) -> (TransportParts, FakeTransportController) {
		let endpoint = self.endpoint.unwrap_or_else(|| FAKE_ENDPOINT.to_string());
		let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
		let (events_tx, events_rx) = mpsc::unbounded_channel();
		let (sent_tx, sent_rx) = mpsc::unbounded_channel();

		let _ = events_tx.send(TransportEvent::Opened {
			endpoint: endpoint.clone(),
		});

		let sender = FakeTransportSender {
			sent: sent_tx,
			inbound: inbound_tx.clone(),
			closed: false,
		};
		let receiver = FakeTransportReceiver {
			inbound_rx,
			events_tx,
		};
		let controller = FakeTransportController {
			inbound_tx,
			sent: Arc::new(Mutex::new(sent_rx)),
		};

		let parts = TransportParts {
			sender: Box::new(sender),
			receiver: Box::new(receiver),
			events: events_rx,
			endpoint,
		};
		(parts, controller)
	}
}

/// Controller for injecting inbound frames and inspecting sent ones.
#[derive(Clone)]
pub struct FakeTransportController {
	inbound_tx: mpsc::UnboundedSender<TransportEvent>,
	sent: Arc<Mutex<mpsc::UnboundedReceiver<Value>>>,
}

impl FakeTransportController {
	/// Inject a raw JSON frame as if the companion had sent it.
	pub fn inject(&self, message: Value) {
		let _ = self.inbound_tx.send(TransportEvent::Message(message));
	}

	/// Inject a clear-text reply for request `id`.
	pub fn inject_response(&self, id: u64, payload: Value) {
		self.inject(serde_json::json!({ "id": id, "payload": payload }));
	}

	/// Inject a clear-text error frame for request `id`.
	pub fn inject_error(&self, id: u64, payload: Value) {
		self.inject(serde_json::json!({ "id": id, "error": true, "payload": payload }));
	}

	/// Inject an encrypted frame; `ciphertext` must be keyed by `id`.
	pub fn inject_encrypted(&self, id: u64, ciphertext: String, error: bool) {
		self.inject(serde_json::json!({
			"id": id,
			"error": error,
			"encrypted": true,
			"payload": ciphertext
		}));
	}

	/// Inject a transport-level error event.
	pub fn inject_transport_error(&self, message: &str) {
		let _ = self.inbound_tx.send(TransportEvent::Error(message.to_string()));
	}

	/// Simulate the companion closing the socket.
	pub fn close(&self) {
		let _ = self.inbound_tx.send(TransportEvent::Closed);
	}

	/// Wait for the next frame written by the client.
	pub async fn next_sent(&self) -> Option<Value> {
		self.sent.lock().await.recv().await
	}

	/// Take all frames written so far without waiting.
	pub async fn take_sent(&self) -> Vec<Value> {
		let mut rx = self.sent.lock().await;
		let mut sent = Vec::new();
		while let Ok(message) = rx.try_recv() {
			sent.push(message);
		}
		sent
	}
}

struct FakeTransportSender {
	sent: mpsc::UnboundedSender<Value>,
	inbound: mpsc::UnboundedSender<TransportEvent>,
	closed: bool,
}

impl Transport for FakeTransportSender {
	fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(async move {
			if self.closed {
				return Err(Error::ConnectionClosed);
			}
			self.sent.send(message).map_err(|_| Error::ConnectionClosed)
		})
	}

	fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(async move {
			if !self.closed {
				self.closed = true;
				let _ = self.inbound.send(TransportEvent::Closed);
			}
			Ok(())
		})
	}
}

struct FakeTransportReceiver {
	inbound_rx: mpsc::UnboundedReceiver<TransportEvent>,
	events_tx: mpsc::UnboundedSender<TransportEvent>,
}

impl TransportReceiver for FakeTransportReceiver {
	fn run(mut self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
		Box::pin(async move {
			while let Some(event) = self.inbound_rx.recv().await {
				let closed = event == TransportEvent::Closed;
				if self.events_tx.send(event).is_err() || closed {
					return Ok(());
				}
			}
			let _ = self.events_tx.send(TransportEvent::Closed);
			Ok(())
		})
	}
}

/// Connector handing out fake transports, one per `open`.
///
/// Each opened transport's controller is published on the receiver returned
/// by [`FakeConnector::new`] so a test can play the companion.
pub struct FakeConnector {
	controllers: mpsc::UnboundedSender<FakeTransportController>,
	opens: AtomicUsize,
	failures_left: AtomicUsize,
}

impl FakeConnector {
	pub fn new() -> (Self, mpsc::UnboundedReceiver<FakeTransportController>) {
		let (tx, rx) = mpsc::unbounded_channel();
		(
			Self {
				controllers: tx,
				opens: AtomicUsize::new(0),
				failures_left: AtomicUsize::new(0),
			},
			rx,
		)
	}

	/// Make the next `count` opens fail with a transport error.
	pub fn fail_next(&self, count: usize) {
		self.failures_left.store(count, Ordering::SeqCst);
	}

	/// Number of `open` calls so far, failed ones included.
	pub fn opens(&self) -> usize {
		self.opens.load(Ordering::SeqCst)
	}
}

impl Connector for FakeConnector {
	fn open<'a>(
		&'a self,
		_endpoints: &'a Endpoints,
		_policy: &'a FallbackPolicy,
	) -> Pin<Box<dyn Future<Output = Result<TransportParts>> + Send + 'a>> {
		Box::pin(async move {
			self.opens.fetch_add(1, Ordering::SeqCst);
			let failing = self
				.failures_left
				.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
				.is_ok();
			if failing {
				return Err(Error::Transport("connection refused".to_string()));
			}
			let (parts, controller) = FakeTransportBuilder::new().build();
			let _ = self.controllers.send(controller);
			Ok(parts)
		})
	}
}
