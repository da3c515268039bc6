use async_trait::async_trait;
use beet::{EncryptedRpc, Result};
use parking_lot::Mutex;
use serde_json::{Value, json};

/// Records calls and answers each with `{"ok": true}`.
pub struct RecordingRpc {
	chain: Option<String>,
	pub calls: Mutex<Vec<(String, Value)>>,
}

impl RecordingRpc {
	pub fn on_chain(chain: &str) -> Self {
		Self {
			chain: Some(chain.to_string()),
			calls: Mutex::new(Vec::new()),
		}
	}

	pub fn unlinked() -> Self {
		Self {
			chain: None,
			calls: Mutex::new(Vec::new()),
		}
	}
}

#[async_trait]
impl EncryptedRpc for RecordingRpc {
	async fn call(&self, method: &str, params: Value) -> Result<Value> {
		self.calls.lock().push((method.to_string(), params));
		Ok(json!({"ok": true}))
	}

	fn chain(&self) -> Option<String> {
		self.chain.clone()
	}
}
