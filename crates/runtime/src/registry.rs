//! Request ids, the pending-request table, and the id commitment chain.
//!
//! Ids are drawn uniformly from `[1, 100_000_001]`. Open ids are unique by
//! construction: api ids come from the commitment chain and handshake ids are
//! fresh draws; a collision with an open request is reported, never retried.
//!
//! # Id chain
//!
//! Each api request reveals the id that the previous request committed to
//! (as a SHA-256 hash) and commits to the id of the next one:
//!
//! ```text
//! link:   next_hash = H(id_1)
//! api #1: id = id_1, next_hash = H(id_2)
//! api #2: id = id_2, next_hash = H(id_3)
//! ```

use std::collections::HashMap;

use beet_protocol::RequestType;
use parking_lot::Mutex;
use rand::Rng;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::oneshot;

use crate::error::{Error, Result};

/// Smallest id ever generated.
pub const MIN_REQUEST_ID: u64 = 1;
/// Largest id ever generated.
pub const MAX_REQUEST_ID: u64 = 100_000_001;

/// Draws a random request id in `[MIN_REQUEST_ID, MAX_REQUEST_ID]`.
pub fn generate_id() -> u64 {
	rand::thread_rng().gen_range(MIN_REQUEST_ID..=MAX_REQUEST_ID)
}

/// Commitment to a future id: lowercase hex SHA-256 of its decimal text.
pub fn commit(id: u64) -> String {
	hex::encode(Sha256::digest(id.to_string().as_bytes()))
}

/// One step of the commitment chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainStep {
	/// Id revealed by this request (committed to by the previous one).
	pub id: u64,
	/// Id the following request will use; persist before sending.
	pub next_id: u64,
	/// Commitment to `next_id`, attached to this request's payload.
	pub next_hash: String,
}

/// Namespace for commitment chain operations.
pub struct IdChain;

impl IdChain {
	/// Starts a chain: returns the first id and the commitment sent at link time.
	pub fn start() -> (u64, String) {
		let first = generate_id();
		(first, commit(first))
	}

	/// Reveals `committed` and commits to a freshly drawn successor.
	pub fn advance(committed: u64) -> ChainStep {
		let mut next_id = generate_id();
		while next_id == committed {
			next_id = generate_id();
		}
		ChainStep {
			id: committed,
			next_id,
			next_hash: commit(next_id),
		}
	}

	/// Checks that `revealed` is the preimage of `commitment`.
	pub fn verify(revealed: u64, commitment: &str) -> bool {
		commit(revealed).eq_ignore_ascii_case(commitment)
	}
}

struct PendingEntry {
	kind: RequestType,
	completion: oneshot::Sender<Result<Value>>,
}

/// Receiving side of a registered request.
#[derive(Debug)]
pub struct PendingRequest {
	id: u64,
	kind: RequestType,
	rx: oneshot::Receiver<Result<Value>>,
}

impl PendingRequest {
	pub fn id(&self) -> u64 {
		self.id
	}

	pub fn kind(&self) -> RequestType {
		self.kind
	}

	/// Waits for the matching reply, rejection, or table shutdown.
	pub async fn wait(self) -> Result<Value> {
		self.rx.await.map_err(|_| Error::ConnectionClosed).and_then(|result| result)
	}
}

/// Open requests keyed by id.
///
/// Each entry completes exactly once: the first `resolve`, `reject`,
/// `cancel`, or `reject_all` that finds it removes it.
#[derive(Default)]
pub struct RequestRegistry {
	pending: Mutex<HashMap<u64, PendingEntry>>,
}

impl RequestRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register(&self, id: u64, kind: RequestType) -> Result<PendingRequest> {
		let mut pending = self.pending.lock();
		if pending.contains_key(&id) {
			return Err(Error::DuplicateRequest(id));
		}
		let (tx, rx) = oneshot::channel();
		pending.insert(id, PendingEntry { kind, completion: tx });
		Ok(PendingRequest { id, kind, rx })
	}

	/// Completes `id` successfully. Returns `false` if nothing was pending.
	pub fn resolve(&self, id: u64, payload: Value) -> bool {
		self.complete(id, Ok(payload))
	}

	/// Completes `id` with an error. Returns `false` if nothing was pending.
	pub fn reject(&self, id: u64, error: Error) -> bool {
		self.complete(id, Err(error))
	}

	/// Forgets `id` without completing it (its waiter sees `ConnectionClosed`).
	pub fn cancel(&self, id: u64) -> bool {
		self.pending.lock().remove(&id).is_some()
	}

	/// Rejects every open request; returns how many were rejected.
	pub fn reject_all(&self, error: impl Fn() -> Error) -> usize {
		let drained: Vec<_> = self.pending.lock().drain().collect();
		let count = drained.len();
		for (_, entry) in drained {
			let _ = entry.completion.send(Err(error()));
		}
		count
	}

	pub fn contains(&self, id: u64) -> bool {
		self.pending.lock().contains_key(&id)
	}

	pub fn kind_of(&self, id: u64) -> Option<RequestType> {
		self.pending.lock().get(&id).map(|entry| entry.kind)
	}

	pub fn len(&self) -> usize {
		self.pending.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn complete(&self, id: u64, result: Result<Value>) -> bool {
		let Some(entry) = self.pending.lock().remove(&id) else {
			return false;
		};
		let _ = entry.completion.send(result);
		true
	}
}
