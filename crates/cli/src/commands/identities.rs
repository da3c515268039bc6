use beet::{IdentityRecord, IdentityStore};
use serde_json::{Value, json};
use tracing::info;

use crate::context::CommandContext;
use crate::error::{CliError, Result};

/// Public view of a stored identity; the shared secret never leaves the store.
pub(crate) fn describe(record: &IdentityRecord) -> Value {
	json!({
		"identityhash": record.identity_hash,
		"chain": record.chain,
		"appName": record.app_name,
	})
}

pub fn list(ctx: &CommandContext) -> Result<()> {
	let store = ctx.store()?;
	let records = store.list_for_app(ctx.app.app_hash())?;
	let view: Vec<Value> = records.iter().map(describe).collect();
	println!("{}", serde_json::to_string_pretty(&view)?);
	Ok(())
}

pub fn forget(ctx: &CommandContext, identity_hash: &str) -> Result<()> {
	let store = ctx.store()?;
	let owned = store
		.find(identity_hash)?
		.is_some_and(|record| record.app_hash == ctx.app.app_hash());
	if !owned || !store.delete(identity_hash)? {
		return Err(CliError::UnknownIdentity(identity_hash.to_string()));
	}
	info!(target = "beet.cli", identity = identity_hash, "identity forgotten");
	Ok(())
}
