//! Adapter error types.

use beet::BeetError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	#[error(transparent)]
	Session(#[from] BeetError),

	/// A real private key was offered; keys stay inside the companion.
	#[error("Do not inject wif while using Beet")]
	PrivateKeyRefused,

	#[error("Transaction is not finalized")]
	NotFinalized,

	#[error("Transaction is already finalized")]
	AlreadyFinalized,

	#[error("Transaction is already signed")]
	AlreadySigned,

	#[error("Transaction was not signed. Do you have a private key? [no_signers]")]
	NoSigners,

	#[error("Transaction has no operations")]
	Empty,

	#[error("Serialized and constructed operation count differs ({recorded} recorded, {constructed} constructed)")]
	OperationCountMismatch { recorded: usize, constructed: usize },

	/// Names starting with `_` are library internals, not broadcast operations.
	#[error("Operation {0} cannot be broadcast")]
	PrivateOperation(String),
}
