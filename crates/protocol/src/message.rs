//! Envelope types for frames sent to and received from the companion.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of request carried by an outbound frame.
///
/// Only [`RequestType::Api`] payloads are encrypted; the handshake kinds travel
/// in clear text because no session key exists yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
	Version,
	Authenticate,
	Link,
	Api,
}

impl RequestType {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Version => "version",
			Self::Authenticate => "authenticate",
			Self::Link => "link",
			Self::Api => "api",
		}
	}

	/// Returns `true` when payloads of this kind go through the session cipher.
	pub fn is_encrypted(self) -> bool {
		matches!(self, Self::Api)
	}
}

impl fmt::Display for RequestType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Request frame sent to the companion.
///
/// ```json
/// { "type": "api", "id": 48213377, "payload": "<base64 ciphertext>" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
	#[serde(rename = "type")]
	pub kind: RequestType,
	pub id: u64,
	pub payload: Value,
}

impl OutboundMessage {
	pub fn new(kind: RequestType, id: u64, payload: Value) -> Self {
		Self { kind, id, payload }
	}
}

/// Request id as it appears on inbound frames.
///
/// The companion echoes ids either as JSON numbers or as their decimal text,
/// so both forms are accepted and compared numerically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
	Number(u64),
	Text(String),
}

impl MessageId {
	pub fn as_u64(&self) -> Option<u64> {
		match self {
			Self::Number(id) => Some(*id),
			Self::Text(text) => text.trim().parse().ok(),
		}
	}

	pub fn matches(&self, id: u64) -> bool {
		self.as_u64() == Some(id)
	}
}

impl From<u64> for MessageId {
	fn from(id: u64) -> Self {
		Self::Number(id)
	}
}

/// Frame received from the companion.
///
/// `error: true` routes the frame to rejection of the matching request and
/// `encrypted: true` means `payload` is session-cipher text keyed by `id`.
/// Handshake replies carry their fields (`authenticate`, `link`, `pub_key`,
/// `identityhash`, `existing`, `chain`) inside `payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
	#[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
	pub kind: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<MessageId>,
	#[serde(default)]
	pub payload: Value,
	#[serde(default, skip_serializing_if = "std::ops::Not::not")]
	pub error: bool,
	#[serde(default, skip_serializing_if = "std::ops::Not::not")]
	pub encrypted: bool,
	/// Only populated on `version` replies.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
}

impl InboundMessage {
	pub fn request_id(&self) -> Option<u64> {
		self.id.as_ref().and_then(MessageId::as_u64)
	}

	pub fn is_version_reply(&self) -> bool {
		self.kind.as_deref() == Some(RequestType::Version.as_str())
	}
}
