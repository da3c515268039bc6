//! Application context and linked identity records.

use beet_protocol::AuthenticateRequest;
use beet_runtime::SessionCipher;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Label sent in place of a browser name.
pub const DEFAULT_RUNTIME_LABEL: &str = "rust";

/// Hex SHA-256 of `"<runtime label> <origin> <app name>"`.
pub fn app_hash(runtime_label: &str, origin: &str, app_name: &str) -> String {
	hex::encode(Sha256::digest(format!("{runtime_label} {origin} {app_name}").as_bytes()))
}

/// Who is asking: the application as the companion sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppIdentity {
	app_name: String,
	origin: String,
	runtime_label: String,
	app_hash: String,
}

impl AppIdentity {
	/// Context whose origin is the app name itself.
	pub fn new(app_name: impl Into<String>) -> Self {
		let app_name = app_name.into();
		Self::build(app_name.clone(), app_name, DEFAULT_RUNTIME_LABEL.to_string())
	}

	/// Sets the origin. Empty and `localhost` origins fall back to the app name.
	pub fn with_origin(self, origin: impl Into<String>) -> Self {
		let origin = origin.into();
		let origin = match origin.trim() {
			"" | "localhost" => self.app_name.clone(),
			trimmed => trimmed.to_string(),
		};
		Self::build(self.app_name, origin, self.runtime_label)
	}

	pub fn with_runtime_label(self, label: impl Into<String>) -> Self {
		Self::build(self.app_name, self.origin, label.into())
	}

	fn build(app_name: String, origin: String, runtime_label: String) -> Self {
		let app_hash = app_hash(&runtime_label, &origin, &app_name);
		Self {
			app_name,
			origin,
			runtime_label,
			app_hash,
		}
	}

	pub fn app_name(&self) -> &str {
		&self.app_name
	}

	pub fn origin(&self) -> &str {
		&self.origin
	}

	pub fn runtime_label(&self) -> &str {
		&self.runtime_label
	}

	pub fn app_hash(&self) -> &str {
		&self.app_hash
	}

	pub fn is_initialised(&self) -> bool {
		!self.app_name.trim().is_empty()
	}

	pub fn authenticate_request(&self, identity_hash: Option<&str>) -> AuthenticateRequest {
		AuthenticateRequest {
			origin: self.origin.clone(),
			app_name: self.app_name.clone(),
			browser: self.runtime_label.clone(),
			identity_hash: identity_hash.map(str::to_string),
		}
	}
}

/// A linked identity as persisted by an [`IdentityStore`](crate::IdentityStore).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
	#[serde(rename = "apphash")]
	pub app_hash: String,
	#[serde(rename = "identityhash")]
	pub identity_hash: String,
	pub chain: String,
	#[serde(rename = "appName")]
	pub app_name: String,
	/// Hex ECDH shared secret.
	pub secret: String,
	/// Id already committed to for the next api request.
	pub next_id: u64,
}

impl IdentityRecord {
	pub fn cipher(&self) -> Result<SessionCipher> {
		Ok(SessionCipher::from_secret_hex(&self.secret)?)
	}
}

impl std::fmt::Debug for IdentityRecord {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("IdentityRecord")
			.field("app_hash", &self.app_hash)
			.field("identity_hash", &self.identity_hash)
			.field("chain", &self.chain)
			.field("app_name", &self.app_name)
			.field("next_id", &self.next_id)
			.finish_non_exhaustive()
	}
}
