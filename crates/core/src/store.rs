//! Identity persistence interface.
//!
//! The store is synchronous: advancing the id chain (read the committed id,
//! persist its successor) must not yield between the read and the write.

use parking_lot::Mutex;

use crate::error::Result;
use crate::identity::IdentityRecord;

/// Durable storage for linked identities.
pub trait IdentityStore: Send + Sync {
	/// All identities linked for `app_hash`, in insertion order.
	fn list_for_app(&self, app_hash: &str) -> Result<Vec<IdentityRecord>>;

	fn find(&self, identity_hash: &str) -> Result<Option<IdentityRecord>>;

	/// Stores `record`, replacing any record with the same identity hash.
	fn insert(&self, record: IdentityRecord) -> Result<()>;

	/// Updates the committed id. Returns `false` if the identity is unknown.
	fn set_next_id(&self, identity_hash: &str, next_id: u64) -> Result<bool>;

	/// Removes the identity. Returns `false` if it was not stored.
	fn delete(&self, identity_hash: &str) -> Result<bool>;
}

/// Process-local store, for tests and short-lived tools.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
	records: Mutex<Vec<IdentityRecord>>,
}

impl MemoryIdentityStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_records(records: Vec<IdentityRecord>) -> Self {
		Self {
			records: Mutex::new(records),
		}
	}

	pub fn records(&self) -> Vec<IdentityRecord> {
		self.records.lock().clone()
	}
}

impl IdentityStore for MemoryIdentityStore {
	fn list_for_app(&self, app_hash: &str) -> Result<Vec<IdentityRecord>> {
		Ok(self
			.records
			.lock()
			.iter()
			.filter(|record| record.app_hash == app_hash)
			.cloned()
			.collect())
	}

	fn find(&self, identity_hash: &str) -> Result<Option<IdentityRecord>> {
		Ok(self
			.records
			.lock()
			.iter()
			.find(|record| record.identity_hash == identity_hash)
			.cloned())
	}

	fn insert(&self, record: IdentityRecord) -> Result<()> {
		let mut records = self.records.lock();
		match records.iter_mut().find(|existing| existing.identity_hash == record.identity_hash) {
			Some(existing) => *existing = record,
			None => records.push(record),
		}
		Ok(())
	}

	fn set_next_id(&self, identity_hash: &str, next_id: u64) -> Result<bool> {
		let mut records = self.records.lock();
		let Some(record) = records.iter_mut().find(|record| record.identity_hash == identity_hash) else {
			return Ok(false);
		};
		record.next_id = next_id;
		Ok(true)
	}

	fn delete(&self, identity_hash: &str) -> Result<bool> {
		let mut records = self.records.lock();
		let before = records.len();
		records.retain(|record| record.identity_hash != identity_hash);
		Ok(records.len() != before)
	}
}
