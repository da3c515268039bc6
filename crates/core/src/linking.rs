//! Linking handshake: binds this app to one companion account.
//!
//! ```text
//! Unlinked --link--> HandshakeSent --existing--> Resumed
//!                                  --fresh-----> NewlyLinked
//!                                  --timeout---> Failed (NotLinked)
//! ```
//!
//! A fresh link derives the session secret with X25519 between an ephemeral
//! key generated here and the companion's public key. Keys travel as
//! big-endian hex of the u-coordinate and the secret is stored as unpadded
//! big-endian hex, which is how the companion encodes both. A resumed link reuses
//! the stored secret; if the companion names an identity the store does not
//! hold, the handshake fails with [`BeetError::IdentityDesync`] instead of
//! silently linking again.

use beet_protocol::{ChainSelector, LinkReply, LinkRequest};
use beet_runtime::IdChain;
use rand::rngs::OsRng;
use tracing::{info, warn};
use x25519_dalek::{EphemeralSecret, PublicKey, SharedSecret};

use crate::error::{BeetError, Result};
use crate::identity::{AppIdentity, IdentityRecord};
use crate::store::IdentityStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
	Unlinked,
	HandshakeSent,
	Resumed,
	NewlyLinked,
	Failed,
}

/// Result of [`BeetConnection::link`](crate::BeetConnection::link).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
	/// The companion already knew the identity; the stored secret is reused.
	Resumed { identity_hash: String },
	/// A new identity was derived and stored.
	NewlyLinked { identity_hash: String },
	/// The user did not answer before the link timeout.
	NotLinked,
}

impl LinkOutcome {
	pub fn identity_hash(&self) -> Option<&str> {
		match self {
			Self::Resumed { identity_hash } | Self::NewlyLinked { identity_hash } => Some(identity_hash),
			Self::NotLinked => None,
		}
	}

	pub fn is_linked(&self) -> bool {
		!matches!(self, Self::NotLinked)
	}

	pub fn state(&self) -> LinkState {
		match self {
			Self::Resumed { .. } => LinkState::Resumed,
			Self::NewlyLinked { .. } => LinkState::NewlyLinked,
			Self::NotLinked => LinkState::Failed,
		}
	}
}

/// A completed handshake.
#[derive(Debug, Clone)]
pub struct LinkedIdentity {
	pub record: IdentityRecord,
	pub outcome: LinkOutcome,
}

/// One in-progress link attempt. The ephemeral key is consumed on completion.
pub struct Handshake {
	secret: EphemeralSecret,
	public: PublicKey,
	chain: ChainSelector,
	first_id: u64,
	next_hash: String,
	state: LinkState,
}

impl std::fmt::Debug for Handshake {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Handshake")
			.field("chain", &self.chain)
			.field("state", &self.state)
			.finish_non_exhaustive()
	}
}

impl Handshake {
	/// Generates the ephemeral key and the commitment to the first api id.
	pub fn begin(chain: ChainSelector) -> Self {
		let secret = EphemeralSecret::random_from_rng(OsRng);
		let public = PublicKey::from(&secret);
		let (first_id, next_hash) = IdChain::start();
		Self {
			secret,
			public,
			chain,
			first_id,
			next_hash,
			state: LinkState::Unlinked,
		}
	}

	pub fn request(&self) -> LinkRequest {
		LinkRequest {
			chain: self.chain.clone(),
			pubkey: self.public_key_hex(),
			next_hash: self.next_hash.clone(),
		}
	}

	pub fn mark_sent(&mut self) {
		self.state = LinkState::HandshakeSent;
	}

	pub fn state(&self) -> LinkState {
		self.state
	}

	pub fn chain(&self) -> &ChainSelector {
		&self.chain
	}

	pub fn public_key_hex(&self) -> String {
		encode_public_key(&self.public)
	}

	/// Applies the companion's reply.
	///
	/// `server_key` is the public key the companion issued in its
	/// `authenticate` reply; it is used when the link reply carries none.
	pub fn complete(
		self,
		reply: &LinkReply,
		app: &AppIdentity,
		store: &dyn IdentityStore,
		server_key: Option<&str>,
	) -> Result<LinkedIdentity> {
		if reply.identity_hash.is_empty() {
			return Err(BeetError::LinkFailed("reply carries no identity hash".to_string()));
		}

		if reply.existing {
			let Some(record) = store.find(&reply.identity_hash)? else {
				warn!(target = "beet.link", identity = %reply.identity_hash, "companion resumed an identity unknown to the store");
				return Err(BeetError::IdentityDesync(reply.identity_hash.clone()));
			};
			info!(target = "beet.link", identity = %record.identity_hash, chain = %record.chain, "identity resumed");
			return Ok(LinkedIdentity {
				outcome: LinkOutcome::Resumed {
					identity_hash: record.identity_hash.clone(),
				},
				record,
			});
		}

		let counterparty = reply
			.pub_key
			.as_deref()
			.or(server_key)
			.ok_or_else(|| BeetError::LinkFailed("companion sent no public key".to_string()))?;
		let secret = derive_shared_secret(self.secret, counterparty)?;

		let record = IdentityRecord {
			app_hash: app.app_hash().to_string(),
			identity_hash: reply.identity_hash.clone(),
			chain: reply.chain.clone().unwrap_or_else(|| self.chain.to_string()),
			app_name: app.app_name().to_string(),
			secret,
			next_id: self.first_id,
		};
		store.insert(record.clone())?;
		info!(target = "beet.link", identity = %record.identity_hash, chain = %record.chain, "identity linked");

		Ok(LinkedIdentity {
			outcome: LinkOutcome::NewlyLinked {
				identity_hash: record.identity_hash.clone(),
			},
			record,
		})
	}
}

/// Big-endian hex of the key's u-coordinate, 64 digits.
pub fn encode_public_key(key: &PublicKey) -> String {
	let mut bytes = key.to_bytes();
	bytes.reverse();
	hex::encode(bytes)
}

/// Parses a public key written by [`encode_public_key`].
pub fn parse_public_key(hex_key: &str) -> Result<PublicKey> {
	let bytes = hex::decode(hex_key.trim())
		.map_err(|e| BeetError::LinkFailed(format!("companion public key is not hex: {e}")))?;
	let mut bytes: [u8; 32] = bytes
		.try_into()
		.map_err(|_| BeetError::LinkFailed("companion public key must be 32 bytes".to_string()))?;
	bytes.reverse();
	Ok(PublicKey::from(bytes))
}

/// Big-endian hex of the shared u-coordinate with leading zero digits dropped.
pub fn encode_shared_secret(shared: &[u8; 32]) -> String {
	let mut bytes = *shared;
	bytes.reverse();
	let digits = hex::encode(bytes);
	match digits.trim_start_matches('0') {
		"" => "0".to_string(),
		trimmed => trimmed.to_string(),
	}
}

/// Stored form of an agreed secret; low-order results are refused.
pub fn shared_secret_hex(shared: &SharedSecret) -> Result<String> {
	if !shared.was_contributory() {
		return Err(BeetError::LinkFailed("companion public key is a low-order point".to_string()));
	}
	Ok(encode_shared_secret(shared.as_bytes()))
}

/// X25519 agreement; returns the shared secret in its stored form.
pub fn derive_shared_secret(secret: EphemeralSecret, counterparty_hex: &str) -> Result<String> {
	let counterparty = parse_public_key(counterparty_hex)?;
	shared_secret_hex(&secret.diffie_hellman(&counterparty))
}

#[cfg(test)]
mod tests {
	use x25519_dalek::StaticSecret;

	use super::*;
	use crate::store::MemoryIdentityStore;

	fn companion() -> (StaticSecret, String) {
		let secret = StaticSecret::random_from_rng(OsRng);
		let public = encode_public_key(&PublicKey::from(&secret));
		(secret, public)
	}

	fn fresh_reply(identity: &str, pub_key: Option<String>) -> LinkReply {
		LinkReply {
			existing: false,
			identity_hash: identity.to_string(),
			chain: Some("BTS".to_string()),
			authenticate: true,
			link: true,
			pub_key,
		}
	}

	#[test]
	fn request_commits_to_first_id() {
		let mut handshake = Handshake::begin(ChainSelector::Any);
		assert_eq!(handshake.state(), LinkState::Unlinked);
		let request = handshake.request();
		handshake.mark_sent();

		assert_eq!(handshake.state(), LinkState::HandshakeSent);
		assert_eq!(request.chain, ChainSelector::Any);
		assert_eq!(request.pubkey.len(), 64);
		assert!(IdChain::verify(handshake.first_id, &request.next_hash));
	}

	#[test]
	fn fresh_link_agrees_with_companion() {
		let (companion_secret, companion_public) = companion();
		let handshake = Handshake::begin(ChainSelector::named("BTS"));
		let client_public = parse_public_key(&handshake.public_key_hex()).unwrap();
		let first_id = handshake.first_id;

		let app = AppIdentity::new("dex");
		let store = MemoryIdentityStore::new();
		let linked = handshake
			.complete(&fresh_reply("id-1", Some(companion_public)), &app, &store, None)
			.unwrap();

		let expected = shared_secret_hex(&companion_secret.diffie_hellman(&client_public)).unwrap();
		assert_eq!(linked.record.secret, expected);
		assert_eq!(linked.record.next_id, first_id);
		assert_eq!(linked.record.app_hash, app.app_hash());
		assert_eq!(linked.outcome.state(), LinkState::NewlyLinked);
		assert_eq!(store.find("id-1").unwrap(), Some(linked.record));
	}

	#[test]
	fn fresh_link_falls_back_to_authenticate_key() {
		let (_, companion_public) = companion();
		let store = MemoryIdentityStore::new();
		let linked = Handshake::begin(ChainSelector::Any)
			.complete(&fresh_reply("id-2", None), &AppIdentity::new("dex"), &store, Some(&companion_public))
			.unwrap();
		assert_eq!(linked.outcome.identity_hash(), Some("id-2"));

		let err = Handshake::begin(ChainSelector::Any)
			.complete(&fresh_reply("id-3", None), &AppIdentity::new("dex"), &store, None)
			.unwrap_err();
		assert!(matches!(err, BeetError::LinkFailed(_)));
	}

	#[test]
	fn existing_link_reuses_stored_secret() {
		let stored = IdentityRecord {
			app_hash: "app".into(),
			identity_hash: "id-9".into(),
			chain: "STEEM".into(),
			app_name: "dex".into(),
			secret: "abcd".into(),
			next_id: 55,
		};
		let store = MemoryIdentityStore::with_records(vec![stored.clone()]);
		let reply = LinkReply {
			existing: true,
			identity_hash: "id-9".into(),
			..LinkReply::default()
		};

		let linked = Handshake::begin(ChainSelector::Any)
			.complete(&reply, &AppIdentity::new("dex"), &store, None)
			.unwrap();
		assert_eq!(linked.record, stored);
		assert_eq!(linked.outcome, LinkOutcome::Resumed {
			identity_hash: "id-9".into()
		});
	}

	#[test]
	fn existing_link_without_record_is_desync() {
		let reply = LinkReply {
			existing: true,
			identity_hash: "ghost".into(),
			..LinkReply::default()
		};
		let err = Handshake::begin(ChainSelector::Any)
			.complete(&reply, &AppIdentity::new("dex"), &MemoryIdentityStore::new(), None)
			.unwrap_err();
		assert!(matches!(err, BeetError::IdentityDesync(hash) if hash == "ghost"));
	}

	const ALICE_SECRET: &str = "77076d0a7318a57d3c16c17251b26645df4c2f87ebc0992ab177fba51db92c2a";
	const BOB_SECRET: &str = "5dab087e624a8a4b79e17f8b83800ee66f3bb1292618b6fd1c2f8b27ff88e0eb";

	fn static_secret(hex_key: &str) -> StaticSecret {
		let bytes: [u8; 32] = hex::decode(hex_key).unwrap().try_into().unwrap();
		StaticSecret::from(bytes)
	}

	#[test]
	fn keys_use_big_endian_hex() {
		let alice = static_secret(ALICE_SECRET);
		let bob = static_secret(BOB_SECRET);
		let alice_public = encode_public_key(&PublicKey::from(&alice));
		let bob_public = encode_public_key(&PublicKey::from(&bob));
		assert_eq!(alice_public, "6a4e9baa8ea9a4ebf41a38260d3abf0d5af73eb4dc7d8b7454a7308909f02085");
		assert_eq!(bob_public, "4f2b886f147efcad4d67785bc843833f3735e4ecc2615bd3b4c17d7b7ddb9ede");

		let shared = alice.diffie_hellman(&parse_public_key(&bob_public).unwrap());
		assert_eq!(
			shared_secret_hex(&shared).unwrap(),
			"4217161e3c9bf076339ed147c9217ee0250f3580f43b8e72e12dcea45b9d5d4a"
		);
		let other_side = bob.diffie_hellman(&parse_public_key(&alice_public).unwrap());
		assert_eq!(shared_secret_hex(&other_side).unwrap(), shared_secret_hex(&shared).unwrap());
	}

	#[test]
	fn shared_secret_drops_leading_zero_digits() {
		let mut little_endian = [0u8; 32];
		little_endian[0] = 0x01;
		little_endian[30] = 0x0a;
		let encoded = encode_shared_secret(&little_endian);
		assert_eq!(encoded, format!("a{}01", "00".repeat(29)));
	}

	#[test]
	fn rejects_malformed_and_low_order_keys() {
		assert!(parse_public_key("zz").is_err());
		assert!(parse_public_key("00ff").is_err());
		let zero = hex::encode([0u8; 32]);
		assert!(derive_shared_secret(EphemeralSecret::random_from_rng(OsRng), &zero).is_err());
	}
}
