//! Payload shapes for the handshake and API request kinds.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chain::ChainSelector;

/// Error code the companion uses when it has revoked the identity in use.
pub const REVOKED_IDENTITY_CODE: i64 = 2;

/// Payload of an `authenticate` request describing the calling application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticateRequest {
	pub origin: String,
	pub app_name: String,
	/// Runtime label (browser name in the original web client).
	pub browser: String,
	#[serde(rename = "identityhash", default, skip_serializing_if = "Option::is_none")]
	pub identity_hash: Option<String>,
}

/// Companion reply to `authenticate`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticateReply {
	#[serde(default)]
	pub authenticate: bool,
	#[serde(default)]
	pub link: bool,
	/// Companion public key (hex), issued when the app is not linked yet.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub pub_key: Option<String>,
	#[serde(rename = "identityhash", default, skip_serializing_if = "Option::is_none")]
	pub identity_hash: Option<String>,
}

/// Payload of a `link` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRequest {
	pub chain: ChainSelector,
	/// Ephemeral X25519 public key, hex encoded.
	pub pubkey: String,
	/// SHA-256 commitment to the first api request id.
	pub next_hash: String,
}

/// Companion reply to `link`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkReply {
	/// `true` when the companion already knows this app/account pairing.
	#[serde(default)]
	pub existing: bool,
	#[serde(rename = "identityhash")]
	pub identity_hash: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub chain: Option<String>,
	#[serde(default)]
	pub authenticate: bool,
	#[serde(default)]
	pub link: bool,
	/// Counterparty public key for the key agreement, when the companion
	/// sends a fresh one with the reply.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub pub_key: Option<String>,
}

/// Plain-text body of an `api` request before encryption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiCall {
	pub method: String,
	#[serde(default)]
	pub params: Value,
	/// Commitment to the id of the following api request on this identity.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub next_hash: Option<String>,
}

impl ApiCall {
	pub fn new(method: impl Into<String>, params: Value) -> Self {
		Self {
			method: method.into(),
			params,
			next_hash: None,
		}
	}
}

/// Body of an error frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub code: Option<i64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
}

impl ErrorPayload {
	/// Reads an error body leniently; anything that is not an object becomes
	/// the message text.
	pub fn from_value(value: &Value) -> Self {
		match value {
			Value::Object(_) => serde_json::from_value(value.clone()).unwrap_or_default(),
			Value::String(text) => Self {
				code: None,
				message: Some(text.clone()),
			},
			Value::Null => Self::default(),
			other => Self {
				code: None,
				message: Some(other.to_string()),
			},
		}
	}

	pub fn is_revoked(&self) -> bool {
		self.code == Some(REVOKED_IDENTITY_CODE)
	}
}
