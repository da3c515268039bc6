//! Encrypted-RPC capability consumed by ledger adapters.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::session::BeetConnection;

/// Anything that can forward an api call over a linked, encrypted session.
#[async_trait]
pub trait EncryptedRpc: Send + Sync {
	async fn call(&self, method: &str, params: Value) -> Result<Value>;

	/// Chain the linked identity belongs to.
	fn chain(&self) -> Option<String>;
}

#[async_trait]
impl EncryptedRpc for BeetConnection {
	async fn call(&self, method: &str, params: Value) -> Result<Value> {
		BeetConnection::call(self, method, params).await
	}

	fn chain(&self) -> Option<String> {
		BeetConnection::chain(self)
	}
}
