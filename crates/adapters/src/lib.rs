//! Ledger library adapters for Beet sessions.
//!
//! Each adapter stands in for the signing and broadcasting half of a ledger
//! library: it gathers what the library would sign and forwards it as an
//! `injectedCall` over an [`EncryptedRpc`](beet::EncryptedRpc) session, so the
//! companion signs with keys the application never holds.

pub mod bitshares;
pub mod error;
pub mod inject;
pub mod steem;

#[cfg(test)]
mod testing;

pub use bitshares::{BitSharesAdapter, INJECT_WIF, Operation, RemoteTransactionBuilder};
pub use error::{Error, Result};
pub use inject::{LedgerAdapter, Library, inject};
pub use steem::RemoteBroadcast;
