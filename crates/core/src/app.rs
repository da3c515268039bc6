//! Per-application identity list and connection cache.

use std::collections::HashMap;
use std::sync::Arc;

use beet_protocol::ChainSelector;
use beet_runtime::Connector;
use tracing::{debug, info, warn};

use crate::config::BeetOptions;
use crate::error::{BeetError, Result};
use crate::identity::{AppIdentity, IdentityRecord};
use crate::linking::LinkOutcome;
use crate::session::BeetConnection;
use crate::store::IdentityStore;

/// An application's view of the companion: its linked identities and the
/// sessions opened for them.
pub struct BeetApp {
	app: AppIdentity,
	options: BeetOptions,
	store: Arc<dyn IdentityStore>,
	connector: Arc<dyn Connector>,
	identities: Vec<IdentityRecord>,
	connections: HashMap<String, Arc<BeetConnection>>,
}

impl std::fmt::Debug for BeetApp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("BeetApp")
			.field("app", &self.app)
			.field("identities", &self.identities.len())
			.field("connections", &self.connections.len())
			.finish_non_exhaustive()
	}
}

impl BeetApp {
	pub fn new(
		app: AppIdentity,
		store: Arc<dyn IdentityStore>,
		options: BeetOptions,
		connector: Arc<dyn Connector>,
	) -> Self {
		Self {
			app,
			options,
			store,
			connector,
			identities: Vec::new(),
			connections: HashMap::new(),
		}
	}

	/// Loads the identities stored for this app.
	pub fn init(&mut self) -> Result<()> {
		self.identities = self.store.list_for_app(self.app.app_hash())?;
		debug!(target = "beet.app", app = %self.app.app_name(), identities = self.identities.len(), "identities loaded");
		Ok(())
	}

	pub fn app(&self) -> &AppIdentity {
		&self.app
	}

	pub fn list(&self) -> &[IdentityRecord] {
		&self.identities
	}

	/// Cached session for `identity_hash`, if one was opened.
	pub fn cached(&self, identity_hash: &str) -> Option<Arc<BeetConnection>> {
		self.connections.get(identity_hash).cloned()
	}

	/// Opens (or reuses) a session bound to a stored identity.
	///
	/// Fails if the companion does not confirm the identity as linked.
	pub async fn get_connection(&mut self, identity: &IdentityRecord) -> Result<Arc<BeetConnection>> {
		if let Some(existing) = self.cached(&identity.identity_hash).filter(|conn| conn.state().is_ready()) {
			return Ok(existing);
		}

		let connection = Arc::new(self.new_session());
		let reply = match connection.connect(Some(identity.clone())).await {
			Ok(reply) => reply,
			Err(err) => {
				connection.disconnect().await;
				return Err(err);
			}
		};
		if !reply.link {
			connection.disconnect().await;
			return Err(BeetError::LinkFailed(format!(
				"companion did not resume identity {}",
				identity.identity_hash
			)));
		}
		info!(target = "beet.app", identity = %identity.identity_hash, "identity resumed");
		self.connections
			.insert(identity.identity_hash.clone(), Arc::clone(&connection));
		Ok(connection)
	}

	/// Session for an identity on `chain`.
	///
	/// With `existing`, the first stored identity on that chain is tried once;
	/// if there is none, or it fails, a single fresh connect and link follows.
	pub async fn get_chain_connection(&mut self, chain: &str, existing: bool) -> Result<Arc<BeetConnection>> {
		self.resolve(ChainSelector::named(chain), existing).await
	}

	/// Session for an identity on any chain, chosen by the user if fresh.
	pub async fn get_any_connection(&mut self, existing: bool) -> Result<Arc<BeetConnection>> {
		self.resolve(ChainSelector::Any, existing).await
	}

	async fn resolve(&mut self, selector: ChainSelector, existing: bool) -> Result<Arc<BeetConnection>> {
		if existing {
			let stored = self
				.identities
				.iter()
				.find(|identity| selector.matches(&identity.chain))
				.cloned();
			match stored {
				Some(identity) => match self.get_connection(&identity).await {
					Ok(connection) => return Ok(connection),
					Err(err) => warn!(
						target = "beet.app",
						identity = %identity.identity_hash,
						error = %err,
						"stored identity unusable; linking afresh"
					),
				},
				None => debug!(target = "beet.app", chain = %selector, "no stored identity; linking afresh"),
			}
		}
		self.link_fresh(selector).await
	}

	async fn link_fresh(&mut self, selector: ChainSelector) -> Result<Arc<BeetConnection>> {
		let connection = Arc::new(self.new_session());
		let linked = match connection.connect(None).await {
			Ok(_) => connection.link(selector.clone()).await,
			Err(err) => Err(err),
		};
		let outcome = match linked {
			Ok(outcome) => outcome,
			Err(err) => {
				connection.disconnect().await;
				return Err(err);
			}
		};
		let identity_hash = match outcome {
			LinkOutcome::Resumed { identity_hash } | LinkOutcome::NewlyLinked { identity_hash } => identity_hash,
			LinkOutcome::NotLinked => {
				connection.disconnect().await;
				return Err(BeetError::LinkFailed(format!("no account was linked for {selector}")));
			}
		};

		self.identities = self.store.list_for_app(self.app.app_hash())?;
		self.connections.insert(identity_hash, Arc::clone(&connection));
		Ok(connection)
	}

	fn new_session(&self) -> BeetConnection {
		BeetConnection::with_connector(
			self.app.clone(),
			Arc::clone(&self.store),
			self.options.clone(),
			Arc::clone(&self.connector),
		)
	}
}
