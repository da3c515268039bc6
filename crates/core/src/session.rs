//! Session orchestrator.
//!
//! [`BeetConnection`] drives one application session: open the channel,
//! authenticate, link (or resume) an identity, then exchange encrypted api
//! calls whose ids follow the commitment chain stored on the identity record.
//!
//! # Example
//!
//! ```ignore
//! let store = Arc::new(MemoryIdentityStore::new());
//! let session = BeetConnection::new(AppIdentity::new("dex"), store, BeetOptions::default());
//! session.connect(None).await?;
//! session.link(ChainSelector::named("BTS")).await?;
//! let account = session.get_account().await?;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use beet_protocol::{ApiCall, AuthenticateReply, ChainSelector, LinkReply, RequestType};
use beet_runtime::{
	ChainStep, Connection, ConnectionObserver, Connector, Error as RuntimeError, IdChain, WebSocketConnector,
	generate_id,
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::BeetOptions;
use crate::error::{BeetError, Result};
use crate::identity::{AppIdentity, IdentityRecord};
use crate::linking::{Handshake, LinkOutcome};
use crate::store::IdentityStore;

/// Snapshot of the session flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionState {
	pub connected: bool,
	pub authenticated: bool,
	pub linked: bool,
	pub initialised: bool,
}

impl SessionState {
	/// Connected, authenticated, and linked: api calls may be sent.
	pub fn is_ready(&self) -> bool {
		self.connected && self.authenticated && self.linked
	}
}

/// State shared with the receive loop's observer.
struct SessionShared {
	store: Arc<dyn IdentityStore>,
	connected: AtomicBool,
	authenticated: AtomicBool,
	linked: AtomicBool,
	identity: Mutex<Option<IdentityRecord>>,
	server_key: Mutex<Option<String>>,
	/// Bumped whenever a channel is replaced, so a stale loop cannot touch the
	/// new session.
	generation: AtomicU64,
}

impl SessionShared {
	fn reset(&self) {
		self.connected.store(false, Ordering::SeqCst);
		self.authenticated.store(false, Ordering::SeqCst);
		self.linked.store(false, Ordering::SeqCst);
		*self.identity.lock() = None;
		*self.server_key.lock() = None;
	}

	fn is_current(&self, generation: u64) -> bool {
		self.generation.load(Ordering::SeqCst) == generation
	}
}

struct SessionObserver {
	shared: Arc<SessionShared>,
	generation: u64,
}

impl ConnectionObserver for SessionObserver {
	fn on_closed(&self) {
		if self.shared.is_current(self.generation) {
			self.shared.connected.store(false, Ordering::SeqCst);
			debug!(target = "beet.session", "channel closed");
		}
	}

	fn on_revoked(&self, request_id: u64) {
		if !self.shared.is_current(self.generation) {
			return;
		}
		let revoked = self.shared.identity.lock().take();
		if let Some(identity) = revoked {
			match self.shared.store.delete(&identity.identity_hash) {
				Ok(_) => warn!(
					target = "beet.session",
					identity = %identity.identity_hash,
					request_id,
					"identity revoked by companion; local record removed"
				),
				Err(err) => error!(
					target = "beet.session",
					identity = %identity.identity_hash,
					error = %err,
					"identity revoked but local record could not be removed"
				),
			}
		}
		self.shared.reset();
	}
}

struct ActiveChannel {
	connection: Arc<Connection>,
	receive_loop: JoinHandle<()>,
}

/// One application session with the companion.
///
/// All operations take `&self`; share the session through `Arc` to issue api
/// calls concurrently.
pub struct BeetConnection {
	app: AppIdentity,
	options: BeetOptions,
	connector: Arc<dyn Connector>,
	shared: Arc<SessionShared>,
	channel: Mutex<Option<ActiveChannel>>,
}

impl std::fmt::Debug for BeetConnection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("BeetConnection")
			.field("app", &self.app)
			.field("state", &self.state())
			.finish_non_exhaustive()
	}
}

impl BeetConnection {
	pub fn new(app: AppIdentity, store: Arc<dyn IdentityStore>, options: BeetOptions) -> Self {
		Self::with_connector(app, store, options, Arc::new(WebSocketConnector))
	}

	pub fn with_connector(
		app: AppIdentity,
		store: Arc<dyn IdentityStore>,
		options: BeetOptions,
		connector: Arc<dyn Connector>,
	) -> Self {
		Self {
			app,
			options,
			connector,
			shared: Arc::new(SessionShared {
				store,
				connected: AtomicBool::new(false),
				authenticated: AtomicBool::new(false),
				linked: AtomicBool::new(false),
				identity: Mutex::new(None),
				server_key: Mutex::new(None),
				generation: AtomicU64::new(0),
			}),
			channel: Mutex::new(None),
		}
	}

	pub fn app(&self) -> &AppIdentity {
		&self.app
	}

	pub fn options(&self) -> &BeetOptions {
		&self.options
	}

	pub fn state(&self) -> SessionState {
		SessionState {
			connected: self.shared.connected.load(Ordering::SeqCst),
			authenticated: self.shared.authenticated.load(Ordering::SeqCst),
			linked: self.shared.linked.load(Ordering::SeqCst),
			initialised: self.app.is_initialised(),
		}
	}

	pub fn is_connected(&self) -> bool {
		self.state().connected
	}

	/// The identity this session is bound to, if any.
	pub fn identity(&self) -> Option<IdentityRecord> {
		self.shared.identity.lock().clone()
	}

	pub fn identity_hash(&self) -> Option<String> {
		self.shared.identity.lock().as_ref().map(|identity| identity.identity_hash.clone())
	}

	pub fn chain(&self) -> Option<String> {
		self.shared.identity.lock().as_ref().map(|identity| identity.chain.clone())
	}

	/// Opens the channel and authenticates, optionally presenting `identity`.
	///
	/// Any previous channel is closed first. The open and the authenticate
	/// round trip together are bounded by the init timeout.
	pub async fn connect(&self, identity: Option<IdentityRecord>) -> Result<AuthenticateReply> {
		self.ensure_initialised()?;
		self.disconnect().await;

		let request = self
			.app
			.authenticate_request(identity.as_ref().map(|identity| identity.identity_hash.as_str()));
		let payload = serde_json::to_value(request)?;
		*self.shared.identity.lock() = identity;

		let reply = match tokio::time::timeout(self.options.init_timeout(), self.open_and_authenticate(payload)).await {
			Ok(reply) => reply?,
			Err(_) => {
				warn!(
					target = "beet.session",
					timeout_ms = self.options.init_timeout_ms,
					"connection timed out"
				);
				return Err(BeetError::Timeout("Connection has timed out.".to_string()));
			}
		};
		let reply: AuthenticateReply = serde_json::from_value(reply)?;
		self.apply_authentication(&reply)?;
		Ok(reply)
	}

	async fn open_and_authenticate(&self, payload: Value) -> Result<Value> {
		let endpoints = self.options.endpoints();
		let policy = self.options.fallback_policy();
		let parts = self.connector.open(&endpoints, &policy).await?;

		let connection = Arc::new(Connection::new(parts).with_request_timeout(self.options.request_timeout()));
		let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
		connection.set_observer(Arc::new(SessionObserver {
			shared: Arc::clone(&self.shared),
			generation,
		}));
		let runner = Arc::clone(&connection);
		let receive_loop = tokio::spawn(async move { runner.run().await });
		*self.channel.lock() = Some(ActiveChannel {
			connection: Arc::clone(&connection),
			receive_loop,
		});
		self.shared.connected.store(true, Ordering::SeqCst);
		info!(target = "beet.session", endpoint = %connection.endpoint(), app = %self.app.app_name(), "connected");

		Ok(connection.request(RequestType::Authenticate, generate_id(), payload).await?)
	}

	fn apply_authentication(&self, reply: &AuthenticateReply) -> Result<()> {
		if reply.link {
			let identity = self.shared.identity.lock().clone().ok_or_else(|| {
				RuntimeError::Protocol("companion reports a linked session but no identity was presented".to_string())
			})?;
			let connection = self.connection().ok_or(RuntimeError::ConnectionClosed)?;
			connection.set_cipher(Some(identity.cipher()?));
			debug!(target = "beet.session", identity = %identity.identity_hash, "session key installed");
		} else {
			*self.shared.server_key.lock() = reply.pub_key.clone();
		}
		self.shared.authenticated.store(reply.authenticate, Ordering::SeqCst);
		self.shared.linked.store(reply.link, Ordering::SeqCst);
		debug!(
			target = "beet.session",
			authenticated = reply.authenticate,
			linked = reply.link,
			"authenticate answered"
		);
		Ok(())
	}

	/// Links this app to an account on `chain`.
	///
	/// Returns [`LinkOutcome::NotLinked`] when the user does not answer within
	/// the link timeout; the channel stays open.
	pub async fn link(&self, chain: ChainSelector) -> Result<LinkOutcome> {
		self.ensure_initialised()?;
		let connection = self
			.connection()
			.filter(|_| self.is_connected())
			.ok_or_else(|| BeetError::usage("You must connect to Beet first."))?;

		let mut handshake = Handshake::begin(chain);
		let payload = serde_json::to_value(handshake.request())?;
		handshake.mark_sent();
		info!(target = "beet.link", chain = %handshake.chain(), "link requested");

		let pending = connection.request(RequestType::Link, generate_id(), payload);
		let reply = match tokio::time::timeout(self.options.link_timeout(), pending).await {
			Ok(reply) => reply?,
			Err(_) => {
				warn!(
					target = "beet.link",
					timeout_ms = self.options.link_timeout_ms,
					"link was not answered in time"
				);
				return Ok(LinkOutcome::NotLinked);
			}
		};
		let reply: LinkReply = serde_json::from_value(reply)?;

		let server_key = self.shared.server_key.lock().clone();
		let linked = handshake.complete(&reply, &self.app, self.shared.store.as_ref(), server_key.as_deref())?;
		connection.set_cipher(Some(linked.record.cipher()?));
		*self.shared.identity.lock() = Some(linked.record);
		self.shared.authenticated.store(reply.authenticate, Ordering::SeqCst);
		self.shared.linked.store(reply.link, Ordering::SeqCst);
		Ok(linked.outcome)
	}

	/// Sends a request of any kind and waits for its reply.
	///
	/// Api requests require a linked session: they reveal the committed id,
	/// carry the commitment to the next one, and travel encrypted. Other kinds
	/// use a fresh id and clear text.
	pub async fn send_request(&self, kind: RequestType, payload: Value) -> Result<Value> {
		let connection = self
			.connection()
			.ok_or_else(|| BeetError::usage("You must connect to Beet first."))?;
		if kind != RequestType::Api {
			return Ok(connection.request(kind, generate_id(), payload).await?);
		}

		if !self.state().is_ready() {
			return Err(BeetError::usage("You must be connected, authorised and linked."));
		}
		let Value::Object(mut body) = payload else {
			return Err(BeetError::usage("api payload must be a JSON object"));
		};
		let step = self.next_chain_step()?;
		body.insert("next_hash".to_string(), Value::String(step.next_hash));
		debug!(target = "beet.session", id = step.id, method = ?body.get("method"), "api request");
		Ok(connection.request(RequestType::Api, step.id, Value::Object(body)).await?)
	}

	/// Calls an api method on the linked account.
	pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
		let body = serde_json::to_value(ApiCall::new(method, params))?;
		self.send_request(RequestType::Api, body).await
	}

	/// Reveals the committed id and persists its successor before anything is sent.
	fn next_chain_step(&self) -> Result<ChainStep> {
		let mut identity = self.shared.identity.lock();
		let record = identity
			.as_mut()
			.ok_or_else(|| BeetError::usage("No identity is linked to this session."))?;
		let committed = self
			.shared
			.store
			.find(&record.identity_hash)?
			.map_or(record.next_id, |stored| stored.next_id);
		let step = IdChain::advance(committed);
		if !self.shared.store.set_next_id(&record.identity_hash, step.next_id)? {
			warn!(target = "beet.session", identity = %record.identity_hash, "identity missing from store; chain kept in memory");
		}
		record.next_id = step.next_id;
		Ok(step)
	}

	/// Closes the channel and clears session state. Stored identities are kept.
	pub async fn disconnect(&self) {
		let channel = self.channel.lock().take();
		if let Some(channel) = channel {
			self.shared.generation.fetch_add(1, Ordering::SeqCst);
			channel.connection.close().await;
			channel.receive_loop.abort();
			info!(target = "beet.session", app = %self.app.app_name(), "disconnected");
		}
		self.shared.reset();
	}

	pub async fn get_account(&self) -> Result<Value> {
		Ok(parse_embedded_json(self.call("getAccount", json!({})).await?))
	}

	pub async fn request_signature(&self, params: Value) -> Result<Value> {
		self.call("requestSignature", params).await
	}

	pub async fn vote_for(&self, params: Value) -> Result<Value> {
		self.call("voteFor", params).await
	}

	/// Forwards a ledger-library call for the companion to execute.
	pub async fn injected_call(&self, params: Value) -> Result<Value> {
		self.call("injectedCall", params).await
	}

	pub async fn sign_message(&self, text: &str) -> Result<Value> {
		Ok(parse_embedded_json(self.call("signMessage", Value::String(text.to_string())).await?))
	}

	pub async fn verify_message(&self, signed: Value) -> Result<Value> {
		self.call("verifyMessage", signed).await
	}

	fn connection(&self) -> Option<Arc<Connection>> {
		self.channel.lock().as_ref().map(|channel| Arc::clone(&channel.connection))
	}

	fn ensure_initialised(&self) -> Result<()> {
		if self.app.is_initialised() {
			Ok(())
		} else {
			Err(BeetError::usage("Beet session is not initialised; an app name is required."))
		}
	}
}

/// Some replies carry a JSON document as a string.
fn parse_embedded_json(value: Value) -> Value {
	match value {
		Value::String(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
		other => other,
	}
}
