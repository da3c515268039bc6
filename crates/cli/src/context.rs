//! Per-invocation settings resolved from flags, the options file, and defaults.

use std::path::PathBuf;
use std::sync::Arc;

use beet::{AppIdentity, Beet, BeetOptions};

use crate::cli::Cli;
use crate::error::{CliError, Result};
use crate::store::{FileIdentityStore, default_store_path};

#[derive(Debug, Clone)]
pub struct CommandContext {
	pub app: AppIdentity,
	pub options: BeetOptions,
	pub store_path: PathBuf,
}

impl CommandContext {
	pub fn from_cli(cli: &Cli) -> Result<Self> {
		let mut options = match &cli.config {
			Some(path) => BeetOptions::load(path)?,
			None => BeetOptions::default(),
		};
		if let Some(primary) = &cli.primary {
			options.primary_endpoint = primary.clone();
		}
		if let Some(fallback) = &cli.fallback {
			options.fallback_endpoint = Some(fallback.clone());
		}
		if cli.no_fallback {
			options.allow_fallback = false;
		}

		let mut app = AppIdentity::new(cli.app.clone());
		if let Some(origin) = &cli.origin {
			app = app.with_origin(origin.clone());
		}

		let store_path = match &cli.store {
			Some(path) => path.clone(),
			None => default_store_path().ok_or(CliError::NoConfigDir)?,
		};

		Ok(Self {
			app,
			options,
			store_path,
		})
	}

	pub fn store(&self) -> Result<Arc<FileIdentityStore>> {
		Ok(Arc::new(FileIdentityStore::open(self.store_path.clone())?))
	}

	pub fn beet(&self, store: Arc<FileIdentityStore>) -> Beet {
		Beet::new(store, self.options.clone())
	}
}
