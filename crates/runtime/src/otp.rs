//! HMAC-based one-time passwords (RFC 4226).
//!
//! The session uses HOTP as a counter-indexed key derivation: the shared
//! secret never changes, and each request id selects a fresh code.

use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::error::{Error, Result};

type HmacSha1 = Hmac<Sha1>;

/// Code length the companion expects for session keys.
pub const SESSION_KEY_DIGITS: u32 = 32;

/// Largest digit count whose modulus fits in `u128`.
const MAX_DIGITS: u32 = 38;

/// HOTP generator bound to one secret.
#[derive(Clone)]
pub struct Hotp {
	mac: HmacSha1,
	digits: u32,
}

impl std::fmt::Debug for Hotp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Hotp").field("digits", &self.digits).finish_non_exhaustive()
	}
}

impl Hotp {
	pub fn new(secret: Vec<u8>, digits: u32) -> Result<Self> {
		if secret.is_empty() {
			return Err(Error::Crypto("HOTP secret is empty".to_string()));
		}
		if digits == 0 || digits > MAX_DIGITS {
			return Err(Error::Crypto(format!("unsupported HOTP length {digits}")));
		}
		let mac = HmacSha1::new_from_slice(&secret).map_err(|e| Error::Crypto(e.to_string()))?;
		Ok(Self { mac, digits })
	}

	/// Builds a session-key generator from a hex encoded secret.
	///
	/// Secrets are stored without zero padding, so the hex may have an odd
	/// length. It is read two digits at a time from the left and a trailing
	/// odd digit is dropped, matching how the companion loads the same text.
	pub fn from_hex(secret: &str) -> Result<Self> {
		let secret = secret.trim();
		if !secret.is_ascii() {
			return Err(Error::Crypto("invalid secret hex: non-ASCII input".to_string()));
		}
		let paired = &secret[..secret.len() - secret.len() % 2];
		let bytes = hex::decode(paired).map_err(|e| Error::Crypto(format!("invalid secret hex: {e}")))?;
		Self::new(bytes, SESSION_KEY_DIGITS)
	}

	pub fn digits(&self) -> u32 {
		self.digits
	}

	/// Returns the zero-padded code for `counter`.
	pub fn generate(&self, counter: u64) -> String {
		let mut mac = self.mac.clone();
		mac.update(&counter.to_be_bytes());
		let digest = mac.finalize().into_bytes();

		let offset = (digest[digest.len() - 1] & 0x0f) as usize;
		let binary = (u32::from(digest[offset]) & 0x7f) << 24
			| u32::from(digest[offset + 1]) << 16
			| u32::from(digest[offset + 2]) << 8
			| u32::from(digest[offset + 3]);

		let code = u128::from(binary) % 10u128.pow(self.digits);
		format!("{code:0width$}", width = self.digits as usize)
	}
}
