//! JSON file identity store.
//!
//! Identities live in one pretty-printed file, `~/.config/beet/identities.json`
//! by default. Every write rewrites the file before returning, so the id chain
//! survives a crash between two api calls.

use std::fs;
use std::path::{Path, PathBuf};

use beet::{BeetError, IdentityRecord, IdentityStore};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CliError, Result};


const STORE_SCHEMA_VERSION: u32 = 1;

/// On-disk format for the identity store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityStoreFile {
	pub schema: u32,
	#[serde(default)]
	pub identities: Vec<IdentityRecord>,
}

impl Default for IdentityStoreFile {
	fn default() -> Self {
		Self {
			schema: STORE_SCHEMA_VERSION,
			identities: Vec::new(),
		}
	}
}

#[derive(Debug)]
pub struct FileIdentityStore {
	path: PathBuf,
	file: Mutex<IdentityStoreFile>,
}

impl FileIdentityStore {
	/// Opens the store; a missing file is an empty store.
	pub fn open(path: PathBuf) -> Result<Self> {
		let file = match fs::read_to_string(&path) {
			Ok(content) => serde_json::from_str::<IdentityStoreFile>(&content)?,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => IdentityStoreFile::default(),
			Err(err) => return Err(err.into()),
		};
		if file.schema != STORE_SCHEMA_VERSION {
			return Err(CliError::UnsupportedSchema {
				path,
				found: file.schema,
				expected: STORE_SCHEMA_VERSION,
			});
		}
		debug!(target = "beet.store", path = %path.display(), identities = file.identities.len(), "identity store loaded");
		Ok(Self {
			path,
			file: Mutex::new(file),
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn all(&self) -> Vec<IdentityRecord> {
		self.file.lock().identities.clone()
	}

	fn save(&self, file: &IdentityStoreFile) -> beet::Result<()> {
		if let Some(parent) = self.path.parent() {
			fs::create_dir_all(parent).map_err(|e| store_error(&self.path, e))?;
		}
		let json = serde_json::to_string_pretty(file)?;
		fs::write(&self.path, json).map_err(|e| store_error(&self.path, e))
	}

	/// Applies `change` and persists when it reports a modification.
	fn update(&self, change: impl FnOnce(&mut Vec<IdentityRecord>) -> bool) -> beet::Result<bool> {
		let mut file = self.file.lock();
		let mut next = file.clone();
		if !change(&mut next.identities) {
			return Ok(false);
		}
		self.save(&next)?;
		*file = next;
		Ok(true)
	}
}

impl IdentityStore for FileIdentityStore {
	fn list_for_app(&self, app_hash: &str) -> beet::Result<Vec<IdentityRecord>> {
		Ok(self
			.file
			.lock()
			.identities
			.iter()
			.filter(|record| record.app_hash == app_hash)
			.cloned()
			.collect())
	}

	fn find(&self, identity_hash: &str) -> beet::Result<Option<IdentityRecord>> {
		Ok(self
			.file
			.lock()
			.identities
			.iter()
			.find(|record| record.identity_hash == identity_hash)
			.cloned())
	}

	fn insert(&self, record: IdentityRecord) -> beet::Result<()> {
		self.update(|identities| {
			match identities.iter_mut().find(|existing| existing.identity_hash == record.identity_hash) {
				Some(existing) => *existing = record,
				None => identities.push(record),
			}
			true
		})?;
		Ok(())
	}

	fn set_next_id(&self, identity_hash: &str, next_id: u64) -> beet::Result<bool> {
		self.update(|identities| match identities.iter_mut().find(|r| r.identity_hash == identity_hash) {
			Some(record) => {
				record.next_id = next_id;
				true
			}
			None => false,
		})
	}

	fn delete(&self, identity_hash: &str) -> beet::Result<bool> {
		self.update(|identities| {
			let before = identities.len();
			identities.retain(|record| record.identity_hash != identity_hash);
			identities.len() != before
		})
	}
}

fn store_error(path: &Path, err: std::io::Error) -> BeetError {
	BeetError::Store(format!("{}: {err}", path.display()))
}

pub fn default_store_path() -> Option<PathBuf> {
	dirs::config_dir().map(|dir| dir.join("beet").join("identities.json"))
}
