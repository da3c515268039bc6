//! Rust client for the Beet companion wallet.
//!
//! An application links itself to an account held by the companion, then
//! sends encrypted api calls that the user approves inside the companion. The
//! client never sees private keys.
//!
//! # Layout
//!
//! - [`Beet`]: owns application contexts and probes for a running companion
//! - [`BeetApp`]: one application's stored identities and open sessions
//! - [`BeetConnection`]: one session (connect, link, api calls, disconnect)
//! - [`IdentityStore`]: where linked identities persist between runs
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use beet::{Beet, BeetOptions, ChainSelector, MemoryIdentityStore};
//!
//! let mut beet = Beet::new(Arc::new(MemoryIdentityStore::new()), BeetOptions::default());
//! if beet.is_installed().await.is_some() {
//!     let sessions = beet.quick_connect("dex", &[ChainSelector::named("BTS")], false).await?;
//!     let account = sessions.get("BTS").unwrap().get_account().await?;
//! }
//! ```

pub mod app;
pub mod config;
pub mod directory;
pub mod error;
pub mod identity;
pub mod linking;
pub mod rpc;
pub mod session;
pub mod store;

pub use app::BeetApp;
pub use beet_protocol::{ChainSelector, RequestType};
pub use beet_runtime::{Connector, WebSocketConnector};
pub use config::BeetOptions;
pub use directory::{Beet, QuickConnection};
pub use error::{BeetError, Result};
pub use identity::{AppIdentity, IdentityRecord, app_hash};
pub use linking::{LinkOutcome, LinkState};
pub use rpc::EncryptedRpc;
pub use session::{BeetConnection, SessionState};
pub use store::{IdentityStore, MemoryIdentityStore};
