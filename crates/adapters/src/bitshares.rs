//! BitShares transaction builder that defers signing to the companion.

use std::sync::Arc;

use beet::EncryptedRpc;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::{Error, Result};

/// Placeholder the application passes instead of a private key.
pub const INJECT_WIF: &str = "inject_wif";

/// One operation as `[name, payload]` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Operation(pub String, pub Value);

/// Hands out transaction builders bound to one linked BitShares session.
#[derive(Clone)]
pub struct BitSharesAdapter {
	rpc: Arc<dyn EncryptedRpc>,
}

impl BitSharesAdapter {
	pub fn new(rpc: Arc<dyn EncryptedRpc>) -> Self {
		Self { rpc }
	}

	pub fn transaction_builder(&self) -> RemoteTransactionBuilder {
		RemoteTransactionBuilder::new(Arc::clone(&self.rpc))
	}
}

/// Collects a transaction and asks the companion to sign and broadcast it.
pub struct RemoteTransactionBuilder {
	rpc: Arc<dyn EncryptedRpc>,
	ref_block_num: u16,
	ref_block_prefix: u32,
	expiration: u32,
	/// Operations recorded by name, as they will be sent.
	recorded: Vec<Operation>,
	/// Operations present on the transaction, however they were added.
	constructed: Vec<Value>,
	signer_public_keys: Vec<String>,
	finalized: bool,
	signed: bool,
}

impl RemoteTransactionBuilder {
	pub fn new(rpc: Arc<dyn EncryptedRpc>) -> Self {
		Self {
			rpc,
			ref_block_num: 0,
			ref_block_prefix: 0,
			expiration: 0,
			recorded: Vec::new(),
			constructed: Vec::new(),
			signer_public_keys: Vec::new(),
			finalized: false,
			signed: false,
		}
	}

	/// Adds an operation by type name; it is recorded for the companion.
	pub fn add_type_operation(&mut self, name: impl Into<String>, payload: Value) -> &mut Self {
		let operation = Operation(name.into(), payload);
		self.constructed.push(json!([operation.0, operation.1]));
		self.recorded.push(operation);
		self
	}

	/// Adds an already serialized operation that bypasses recording.
	///
	/// Broadcasting then fails, since the companion would sign a different
	/// operation list than the one on the transaction.
	pub fn add_operation(&mut self, serialized: Value) -> &mut Self {
		self.constructed.push(serialized);
		self
	}

	pub fn set_reference_block(&mut self, ref_block_num: u16, ref_block_prefix: u32) -> &mut Self {
		self.ref_block_num = ref_block_num;
		self.ref_block_prefix = ref_block_prefix;
		self
	}

	/// Expiration as seconds since the Unix epoch.
	pub fn set_expiration(&mut self, expiration: u32) -> &mut Self {
		self.expiration = expiration;
		self
	}

	pub fn finalize(&mut self) -> Result<()> {
		if self.finalized {
			return Err(Error::AlreadyFinalized);
		}
		if self.constructed.is_empty() {
			return Err(Error::Empty);
		}
		self.finalized = true;
		Ok(())
	}

	/// Registers a signer. Only the [`INJECT_WIF`] marker is accepted in place
	/// of the private key.
	pub fn add_signer(&mut self, private_key: &str, public_key: impl Into<String>) -> Result<()> {
		if private_key != INJECT_WIF {
			return Err(Error::PrivateKeyRefused);
		}
		self.signer_public_keys.push(public_key.into());
		Ok(())
	}

	/// Marks the transaction signed; the companion does the real signing.
	pub fn sign(&mut self) -> Result<()> {
		if !self.finalized {
			return Err(Error::NotFinalized);
		}
		if self.signed {
			return Err(Error::AlreadySigned);
		}
		if self.signer_public_keys.is_empty() {
			return Err(Error::NoSigners);
		}
		self.signed = true;
		Ok(())
	}

	pub fn is_signed(&self) -> bool {
		self.signed
	}

	pub fn operations(&self) -> &[Operation] {
		&self.recorded
	}

	pub fn signer_public_keys(&self) -> &[String] {
		&self.signer_public_keys
	}

	/// Forwards the transaction as `signAndBroadcast`. `on_broadcast` runs
	/// only after the companion confirms.
	pub async fn broadcast<F>(&self, on_broadcast: Option<F>) -> Result<Value>
	where
		F: FnOnce(),
	{
		if self.recorded.len() != self.constructed.len() {
			return Err(Error::OperationCountMismatch {
				recorded: self.recorded.len(),
				constructed: self.constructed.len(),
			});
		}

		let params = json!([
			"signAndBroadcast",
			self.ref_block_num,
			self.ref_block_prefix,
			self.expiration,
			self.recorded,
			self.signer_public_keys,
		]);
		debug!(target = "beet.adapters", operations = self.recorded.len(), "forwarding transaction");
		let result = self.rpc.call("injectedCall", params).await?;
		if let Some(callback) = on_broadcast {
			callback();
		}
		Ok(result)
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicBool, Ordering};

	use super::*;
	use crate::testing::RecordingRpc;

	fn builder(rpc: &Arc<RecordingRpc>) -> RemoteTransactionBuilder {
		let rpc: Arc<dyn EncryptedRpc> = rpc.clone();
		BitSharesAdapter::new(rpc).transaction_builder()
	}

	#[test]
	fn refuses_real_private_keys() {
		let rpc = Arc::new(RecordingRpc::on_chain("BTS"));
		let mut tx = builder(&rpc);
		assert!(matches!(tx.add_signer("5KQwrPbwdL6PhXujxW37FSSQZ1JiwsST4cqQzDeyXtP79zkvFD3", "BTS6..."), Err(Error::PrivateKeyRefused)));
		tx.add_signer(INJECT_WIF, "BTS6abc").unwrap();
		assert_eq!(tx.signer_public_keys(), ["BTS6abc"]);
	}

	#[test]
	fn sign_checks_transaction_state() {
		let rpc = Arc::new(RecordingRpc::on_chain("BTS"));
		let mut tx = builder(&rpc);
		assert!(matches!(tx.finalize(), Err(Error::Empty)));
		tx.add_type_operation("transfer", json!({"amount": 1}));
		assert!(matches!(tx.sign(), Err(Error::NotFinalized)));

		tx.finalize().unwrap();
		assert!(matches!(tx.finalize(), Err(Error::AlreadyFinalized)));
		assert!(matches!(tx.sign(), Err(Error::NoSigners)));

		tx.add_signer(INJECT_WIF, "BTS6abc").unwrap();
		tx.sign().unwrap();
		assert!(tx.is_signed());
		assert!(matches!(tx.sign(), Err(Error::AlreadySigned)));
	}

	#[tokio::test]
	async fn broadcast_sends_sign_and_broadcast() {
		let rpc = Arc::new(RecordingRpc::on_chain("BTS"));
		let mut tx = builder(&rpc);
		tx.add_type_operation("transfer", json!({"from": "1.2.1", "to": "1.2.2"}))
			.set_reference_block(1234, 987_654)
			.set_expiration(1_700_000_000);
		tx.finalize().unwrap();
		tx.add_signer(INJECT_WIF, "BTS6abc").unwrap();
		tx.sign().unwrap();

		let fired = AtomicBool::new(false);
		let result = tx.broadcast(Some(|| fired.store(true, Ordering::SeqCst))).await.unwrap();
		assert_eq!(result, json!({"ok": true}));
		assert!(fired.load(Ordering::SeqCst));

		let calls = rpc.calls.lock();
		assert_eq!(calls.len(), 1);
		assert_eq!(calls[0].0, "injectedCall");
		assert_eq!(
			calls[0].1,
			json!([
				"signAndBroadcast",
				1234,
				987_654,
				1_700_000_000,
				[["transfer", {"from": "1.2.1", "to": "1.2.2"}]],
				["BTS6abc"]
			])
		);
	}

	#[tokio::test]
	async fn unrecorded_operations_block_broadcast() {
		let rpc = Arc::new(RecordingRpc::on_chain("BTS"));
		let mut tx = builder(&rpc);
		tx.add_type_operation("transfer", json!({}));
		tx.add_operation(json!([0, {}]));

		let err = tx.broadcast(None::<fn()>).await.unwrap_err();
		assert!(matches!(err, Error::OperationCountMismatch {
			recorded: 1,
			constructed: 2
		}));
		assert!(rpc.calls.lock().is_empty());
	}
}
