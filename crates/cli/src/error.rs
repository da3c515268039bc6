use std::path::PathBuf;

use beet::BeetError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
	#[error(transparent)]
	Beet(#[from] BeetError),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("Invalid --params: {0}")]
	InvalidParams(String),

	#[error("No identity {0} is stored for this app")]
	UnknownIdentity(String),

	#[error("Identity store {path} uses schema {found}, expected {expected}")]
	UnsupportedSchema { path: PathBuf, found: u32, expected: u32 },

	#[error("Could not determine a config directory; pass --store")]
	NoConfigDir,
}
