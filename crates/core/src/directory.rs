//! Entry point: one [`BeetApp`] per application name, plus install probes.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use beet_protocol::{ChainSelector, InboundMessage, RequestType};
use beet_runtime::{Connector, Error as RuntimeError, TransportEvent, TransportParts, WebSocketConnector};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::app::BeetApp;
use crate::config::BeetOptions;
use crate::error::Result;
use crate::identity::AppIdentity;
use crate::session::BeetConnection;
use crate::store::IdentityStore;

/// Sessions returned by [`Beet::quick_connect`], keyed by the requested chain
/// (`ANY` for [`ChainSelector::Any`]).
#[derive(Debug, Default)]
pub struct QuickConnection {
	pub app_name: String,
	pub connections: HashMap<String, Arc<BeetConnection>>,
}

impl QuickConnection {
	pub fn get(&self, chain: &str) -> Option<&Arc<BeetConnection>> {
		self.connections.get(chain)
	}
}

/// Owns every application context created by this process.
pub struct Beet {
	store: Arc<dyn IdentityStore>,
	options: BeetOptions,
	connector: Arc<dyn Connector>,
	apps: HashMap<String, BeetApp>,
}

impl std::fmt::Debug for Beet {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Beet")
			.field("options", &self.options)
			.field("apps", &self.apps.keys().collect::<Vec<_>>())
			.finish_non_exhaustive()
	}
}

impl Beet {
	pub fn new(store: Arc<dyn IdentityStore>, options: BeetOptions) -> Self {
		Self::with_connector(store, options, Arc::new(WebSocketConnector))
	}

	pub fn with_connector(store: Arc<dyn IdentityStore>, options: BeetOptions, connector: Arc<dyn Connector>) -> Self {
		Self {
			store,
			options,
			connector,
			apps: HashMap::new(),
		}
	}

	pub fn options(&self) -> &BeetOptions {
		&self.options
	}

	/// Permits the plain-text local endpoint as a fallback for new sessions.
	pub fn allow_localhost(&mut self) {
		self.options.allow_fallback = true;
	}

	/// Context for `app_name`, created and loaded on first use.
	pub fn get(&mut self, app_name: &str) -> Result<&mut BeetApp> {
		self.get_app(AppIdentity::new(app_name))
	}

	/// Like [`Beet::get`] with a caller-built context (custom origin or label).
	pub fn get_app(&mut self, app: AppIdentity) -> Result<&mut BeetApp> {
		match self.apps.entry(app.app_name().to_string()) {
			Entry::Occupied(entry) => Ok(entry.into_mut()),
			Entry::Vacant(entry) => {
				let mut beet_app = BeetApp::new(
					app,
					Arc::clone(&self.store),
					self.options.clone(),
					Arc::clone(&self.connector),
				);
				beet_app.init()?;
				Ok(entry.insert(beet_app))
			}
		}
	}

	/// Gets a session for each selector in one call.
	///
	/// Stored identities are reused unless `force_choose` asks the user to
	/// pick again. An empty selector list means [`ChainSelector::Any`].
	pub async fn quick_connect(
		&mut self,
		app_name: &str,
		selectors: &[ChainSelector],
		force_choose: bool,
	) -> Result<QuickConnection> {
		let app = self.get(app_name)?;
		let selectors = if selectors.is_empty() {
			vec![ChainSelector::Any]
		} else {
			selectors.to_vec()
		};

		let mut result = QuickConnection {
			app_name: app_name.to_string(),
			connections: HashMap::new(),
		};
		for selector in selectors {
			let connection = match &selector {
				ChainSelector::Any => app.get_any_connection(!force_choose).await?,
				ChainSelector::Named(chain) => app.get_chain_connection(chain, !force_choose).await?,
			};
			result.connections.insert(selector.as_str().to_string(), connection);
		}
		info!(target = "beet.app", app = app_name, sessions = result.connections.len(), "quick connect complete");
		Ok(result)
	}

	/// Asks the companion for its version over a short-lived channel.
	pub async fn ping(&self) -> Result<String> {
		let TransportParts {
			mut sender,
			receiver,
			mut events,
			endpoint,
		} = self
			.connector
			.open(&self.options.endpoints(), &self.options.fallback_policy())
			.await?;
		let pump = tokio::spawn(receiver.run());

		let probe = async {
			sender.send(json!({ "type": RequestType::Version.as_str() })).await?;
			while let Some(event) = events.recv().await {
				match event {
					TransportEvent::Message(frame) => {
						let message: InboundMessage = serde_json::from_value(frame)?;
						if !message.is_version_reply() {
							return Err(RuntimeError::Protocol("unexpected reply to version probe".to_string()));
						}
						return Ok(match message.result {
							Some(Value::String(version)) => version,
							Some(other) => other.to_string(),
							None => String::new(),
						});
					}
					TransportEvent::Closed => break,
					TransportEvent::Opened { .. } | TransportEvent::Error(_) => {}
				}
			}
			Err::<String, RuntimeError>(RuntimeError::ConnectionClosed)
		};
		let version = probe.await;

		if let Err(err) = sender.close().await {
			debug!(target = "beet.app", error = %err, "closing probe channel failed");
		}
		pump.abort();
		let version = version?;
		debug!(target = "beet.app", endpoint = %endpoint, version = %version, "companion answered version probe");
		Ok(version)
	}

	/// Version of the running companion, or `None` if the probe does not
	/// answer within the probe timeout.
	pub async fn is_installed(&self) -> Option<String> {
		match tokio::time::timeout(self.options.probe_timeout(), self.ping()).await {
			Ok(Ok(version)) => Some(version),
			Ok(Err(err)) => {
				debug!(target = "beet.app", error = %err, "version probe failed");
				None
			}
			Err(_) => None,
		}
	}
}
