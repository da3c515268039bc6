//! Picks the adapter matching a session's chain and the library offered.

use std::sync::Arc;

use beet::{BeetError, EncryptedRpc};

use crate::bitshares::BitSharesAdapter;
use crate::steem::RemoteBroadcast;

/// The library surface an application wants routed through the companion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Library {
	/// bitsharesjs `TransactionBuilder`.
	TransactionBuilder,
	/// steem-js `broadcast` namespace.
	SteemBroadcast,
}

pub enum LedgerAdapter {
	BitShares(BitSharesAdapter),
	Steem(RemoteBroadcast),
}

impl std::fmt::Debug for LedgerAdapter {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::BitShares(_) => f.write_str("LedgerAdapter::BitShares"),
			Self::Steem(_) => f.write_str("LedgerAdapter::Steem"),
		}
	}
}

/// Binds `library` to `rpc` if the linked chain supports it.
pub fn inject(rpc: Arc<dyn EncryptedRpc>, library: Library) -> beet::Result<LedgerAdapter> {
	let chain = rpc.chain();
	match (chain.as_deref(), library) {
		(Some("BTS"), Library::TransactionBuilder) => Ok(LedgerAdapter::BitShares(BitSharesAdapter::new(rpc))),
		(Some("STEEM"), Library::SteemBroadcast) => Ok(LedgerAdapter::Steem(RemoteBroadcast::new(rpc))),
		(chain, library) => Err(BeetError::UnsupportedAdapter(format!(
			"{library:?} on chain {}",
			chain.unwrap_or("<unlinked>")
		))),
	}
}
