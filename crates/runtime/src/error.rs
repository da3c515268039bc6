//! Error types for the transport, cipher, and correlation layers.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised below the session layer.
///
/// Transport and protocol errors are scoped: a failure correlated to one
/// request rejects only that request, everything else keeps running.
#[derive(Debug, Clone, Error)]
pub enum Error {
	/// Could not reach either endpoint, or the socket failed while open.
	#[error("Transport error: {0}")]
	Transport(String),

	/// The socket closed (or was closed locally) before a reply arrived.
	#[error("Connection closed")]
	ConnectionClosed,

	#[error("Timed out: {0}")]
	Timeout(String),

	/// Malformed or unexpected inbound frame.
	#[error("Protocol error: {0}")]
	Protocol(String),

	/// The companion answered the request with an error frame.
	#[error("Request rejected by companion: {message}")]
	Rejected { code: Option<i64>, message: String },

	/// The companion revoked the identity this session was using.
	#[error("Identity revoked by companion")]
	Revoked,

	#[error("Cipher error: {0}")]
	Crypto(String),

	#[error("Request id {0} is already pending")]
	DuplicateRequest(u64),

	/// An api request was attempted before a session key was installed.
	#[error("No session key installed; link an identity first")]
	NoSessionKey,

	#[error("JSON error: {0}")]
	Json(String),
}

impl Error {
	pub fn is_timeout(&self) -> bool {
		matches!(self, Self::Timeout(_))
	}

	pub fn is_revoked(&self) -> bool {
		matches!(self, Self::Revoked)
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Self::Json(err.to_string())
	}
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
	fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
		Self::Transport(err.to_string())
	}
}
