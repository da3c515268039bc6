//! Error types for session and directory operations.

use thiserror::Error;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, BeetError>;

/// Errors surfaced to applications.
///
/// Usage errors are raised before any network I/O. Transport and protocol
/// failures arrive wrapped in [`BeetError::Runtime`] and only ever affect the
/// operation they belong to.
#[derive(Debug, Error)]
pub enum BeetError {
	#[error(transparent)]
	Runtime(#[from] beet_runtime::Error),

	/// An operation was called before its prerequisite state.
	#[error("{0}")]
	Usage(String),

	/// The companion claims an established identity the local store lacks.
	#[error("Beet has an established identity {0} but the client does not")]
	IdentityDesync(String),

	#[error("Link failed: {0}")]
	LinkFailed(String),

	/// A ledger adapter was offered an object it cannot drive.
	#[error("Unsupported point of injection: {0}")]
	UnsupportedAdapter(String),

	#[error("Identity store error: {0}")]
	Store(String),

	#[error("{0}")]
	Timeout(String),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl BeetError {
	pub fn usage(message: impl Into<String>) -> Self {
		Self::Usage(message.into())
	}

	pub fn is_timeout(&self) -> bool {
		matches!(self, Self::Timeout(_)) || matches!(self, Self::Runtime(err) if err.is_timeout())
	}

	pub fn is_revoked(&self) -> bool {
		matches!(self, Self::Runtime(err) if err.is_revoked())
	}

	pub fn is_usage(&self) -> bool {
		matches!(self, Self::Usage(_))
	}
}
