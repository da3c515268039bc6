//! Steem broadcast operations forwarded to the companion.

use std::sync::Arc;

use beet::EncryptedRpc;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

/// Stand-in for `steem.broadcast`: every operation becomes an
/// `injectedCall` with the operation name prepended to its arguments.
#[derive(Clone)]
pub struct RemoteBroadcast {
	rpc: Arc<dyn EncryptedRpc>,
}

impl RemoteBroadcast {
	pub fn new(rpc: Arc<dyn EncryptedRpc>) -> Self {
		Self { rpc }
	}

	pub async fn broadcast(&self, operation: &str, args: Vec<Value>) -> Result<Value> {
		if operation.is_empty() || operation.starts_with('_') {
			return Err(Error::PrivateOperation(operation.to_string()));
		}
		let mut params = Vec::with_capacity(args.len() + 1);
		params.push(Value::String(operation.to_string()));
		params.extend(args);
		debug!(target = "beet.adapters", operation, "forwarding broadcast");
		Ok(self.rpc.call("injectedCall", Value::Array(params)).await?)
	}
}
