//! Transport layer for the companion channel.
//!
//! The companion listens on a TLS endpoint and a plain-text local endpoint.
//! [`open`] dials the primary address and, when the attempt fails quickly,
//! retries exactly once against the fallback so callers never see the first
//! failure. Once open, the channel is split in two halves:
//!
//! - a [`Transport`] sender that writes JSON frames
//! - a [`TransportReceiver`] loop that turns socket frames into
//!   [`TransportEvent`]s on an unbounded channel
//!
//! Both halves are trait objects so the session layer can be driven by the
//! in-memory [`crate::fake_transport`] in tests.

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// TLS endpoint served by the companion.
pub const DEFAULT_PRIMARY_ENDPOINT: &str = "wss://local.get-beet.io:60556";
/// Plain-text local endpoint used when the TLS endpoint is unreachable.
pub const DEFAULT_FALLBACK_ENDPOINT: &str = "ws://local.get-beet.io:60555";
/// Window after the first attempt starts in which a failure may fall back.
pub const DEFAULT_FALLBACK_GRACE: Duration = Duration::from_secs(2);

/// Observable transport events, delivered in order on one channel.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
	Opened { endpoint: String },
	Message(Value),
	Closed,
	Error(String),
}

/// Sending half of an open channel.
pub trait Transport: Send {
	/// Serializes and writes one frame.
	fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

	/// Closes the channel. Further sends fail with [`Error::ConnectionClosed`].
	fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Receiving half of an open channel.
pub trait TransportReceiver: Send {
	/// Pumps inbound frames into the event channel until the socket ends.
	fn run(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>;
}

/// Everything a connection needs from an opened transport.
pub struct TransportParts {
	pub sender: Box<dyn Transport>,
	pub receiver: Box<dyn TransportReceiver>,
	pub events: mpsc::UnboundedReceiver<TransportEvent>,
	/// Address that actually answered (primary or fallback).
	pub endpoint: String,
}

impl std::fmt::Debug for TransportParts {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TransportParts").field("endpoint", &self.endpoint).finish_non_exhaustive()
	}
}

/// Primary address plus optional fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
	pub primary: String,
	pub fallback: Option<String>,
}

impl Endpoints {
	pub fn new(primary: impl Into<String>, fallback: Option<String>) -> Self {
		Self {
			primary: primary.into(),
			fallback,
		}
	}
}

impl Default for Endpoints {
	fn default() -> Self {
		Self::new(DEFAULT_PRIMARY_ENDPOINT, Some(DEFAULT_FALLBACK_ENDPOINT.to_string()))
	}
}

/// Controls the one-shot host fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackPolicy {
	pub enabled: bool,
	pub grace: Duration,
}

impl Default for FallbackPolicy {
	fn default() -> Self {
		Self {
			enabled: true,
			grace: DEFAULT_FALLBACK_GRACE,
		}
	}
}

/// Decides whether a failed first attempt should be retried on the fallback.
///
/// True only when the failure arrived inside the grace window, a fallback
/// address exists, it has not been used yet, and fallback is enabled.
pub fn should_fall_back(elapsed: Duration, policy: &FallbackPolicy, fallback: Option<&str>, fallback_used: bool) -> bool {
	policy.enabled && !fallback_used && fallback.is_some() && elapsed < policy.grace
}

/// Opens a channel to the companion, falling back once if allowed.
pub async fn open(endpoints: &Endpoints, policy: &FallbackPolicy) -> Result<TransportParts> {
	let started = Instant::now();
	let err = match WebSocketTransport::connect(&endpoints.primary).await {
		Ok((transport, events)) => return Ok(transport.into_transport_parts(events)),
		Err(err) => err,
	};

	let fallback = endpoints.fallback.as_deref();
	let elapsed = started.elapsed();
	let Some(fallback) = fallback.filter(|_| should_fall_back(elapsed, policy, fallback, false)) else {
		debug!(
			target = "beet.transport",
			endpoint = %endpoints.primary,
			elapsed_ms = elapsed.as_millis() as u64,
			error = %err,
			"connection failed without fallback"
		);
		return Err(err);
	};

	warn!(
		target = "beet.transport",
		primary = %endpoints.primary,
		fallback,
		error = %err,
		"falling back to local endpoint"
	);
	let (transport, events) = WebSocketTransport::connect(fallback).await?;
	Ok(transport.into_transport_parts(events))
}

/// Opens transports on behalf of a session.
pub trait Connector: Send + Sync {
	fn open<'a>(
		&'a self,
		endpoints: &'a Endpoints,
		policy: &'a FallbackPolicy,
	) -> Pin<Box<dyn Future<Output = Result<TransportParts>> + Send + 'a>>;
}

/// Connector that dials real WebSocket endpoints through [`open`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
	fn open<'a>(
		&'a self,
		endpoints: &'a Endpoints,
		policy: &'a FallbackPolicy,
	) -> Pin<Box<dyn Future<Output = Result<TransportParts>> + Send + 'a>> {
		Box::pin(open(endpoints, policy))
	}
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket channel carrying JSON text frames.
pub struct WebSocketTransport {
	endpoint: String,
	sink: SplitSink<WsStream, Message>,
	stream: SplitStream<WsStream>,
	events_tx: mpsc::UnboundedSender<TransportEvent>,
}

impl WebSocketTransport {
	/// Connects to `url` and returns the transport plus its event receiver.
	///
	/// The first event on the receiver is always [`TransportEvent::Opened`].
	pub async fn connect(url: &str) -> Result<(Self, mpsc::UnboundedReceiver<TransportEvent>)> {
		let (ws, _response) = tokio_tungstenite::connect_async(url).await?;
		let (sink, stream) = ws.split();
		let (events_tx, events_rx) = mpsc::unbounded_channel();
		let _ = events_tx.send(TransportEvent::Opened {
			endpoint: url.to_string(),
		});
		debug!(target = "beet.transport", endpoint = url, "socket opened");
		Ok((
			Self {
				endpoint: url.to_string(),
				sink,
				stream,
				events_tx,
			},
			events_rx,
		))
	}

	pub fn endpoint(&self) -> &str {
		&self.endpoint
	}

	pub fn into_transport_parts(self, events: mpsc::UnboundedReceiver<TransportEvent>) -> TransportParts {
		TransportParts {
			sender: Box::new(WebSocketSender {
				sink: self.sink,
				closed: false,
			}),
			receiver: Box::new(WebSocketReceiver {
				stream: self.stream,
				events: self.events_tx,
			}),
			events,
			endpoint: self.endpoint,
		}
	}
}

struct WebSocketSender {
	sink: SplitSink<WsStream, Message>,
	closed: bool,
}

impl Transport for WebSocketSender {
	fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(async move {
			if self.closed {
				return Err(Error::ConnectionClosed);
			}
			let text = serde_json::to_string(&message)?;
			self.sink.send(Message::text(text)).await?;
			Ok(())
		})
	}

	fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(async move {
			if self.closed {
				return Ok(());
			}
			self.closed = true;
			self.sink.close().await?;
			Ok(())
		})
	}
}

struct WebSocketReceiver {
	stream: SplitStream<WsStream>,
	events: mpsc::UnboundedSender<TransportEvent>,
}

impl WebSocketReceiver {
	fn forward(&self, text: &str) {
		let event = match serde_json::from_str::<Value>(text) {
			Ok(value) => TransportEvent::Message(value),
			Err(err) => TransportEvent::Error(format!("invalid JSON frame: {err}")),
		};
		let _ = self.events.send(event);
	}
}

impl TransportReceiver for WebSocketReceiver {
	fn run(mut self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
		Box::pin(async move {
			let mut outcome = Ok(());
			while let Some(frame) = self.stream.next().await {
				match frame {
					Ok(Message::Text(text)) => self.forward(&text),
					Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
						Ok(text) => self.forward(text),
						Err(_) => {
							let _ = self.events.send(TransportEvent::Error("non UTF-8 binary frame".to_string()));
						}
					},
					Ok(Message::Close(_)) => break,
					Ok(_) => {}
					Err(err) => {
						let _ = self.events.send(TransportEvent::Error(err.to_string()));
						outcome = Err(Error::from(err));
						break;
					}
				}
			}
			let _ = self.events.send(TransportEvent::Closed);
			outcome
		})
	}
}
