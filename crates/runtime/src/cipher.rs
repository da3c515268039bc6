//! Per-message session encryption.
//!
//! Every api frame is keyed by its own request id: the HOTP code for that
//! counter is used as a passphrase in the OpenSSL `enc` format the companion
//! speaks. A random 8-byte salt and the passphrase go through
//! `EVP_BytesToKey` (MD5, one round) to give the AES-256-CBC key and IV. The
//! wire form is `base64("Salted__" || salt || ciphertext)` with PKCS#7 padding.
//!
//! The shared secret itself never leaves the identity record; only the
//! counter travels with the frame (as its `id`).

use aes::Aes256;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use md5::{Digest, Md5};
use rand::RngCore;
use rand::rngs::OsRng;

use crate::error::{Error, Result};
use crate::otp::Hotp;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const SALTED_MAGIC: &[u8; 8] = b"Salted__";
const SALT_LEN: usize = 8;
const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;
const BLOCK_LEN: usize = 16;

/// Counter-keyed cipher for one linked identity.
#[derive(Debug, Clone)]
pub struct SessionCipher {
	hotp: Hotp,
}

impl SessionCipher {
	pub fn new(hotp: Hotp) -> Self {
		Self { hotp }
	}

	/// Builds the cipher from the hex secret stored on an identity record.
	pub fn from_secret_hex(secret: &str) -> Result<Self> {
		Ok(Self::new(Hotp::from_hex(secret)?))
	}

	/// One-time key for `counter`.
	pub fn key_for(&self, counter: u64) -> String {
		self.hotp.generate(counter)
	}

	pub fn encrypt(&self, plaintext: &str, counter: u64) -> Result<String> {
		let mut salt = [0u8; SALT_LEN];
		OsRng.fill_bytes(&mut salt);
		self.encrypt_with_salt(plaintext, counter, salt)
	}

	fn encrypt_with_salt(&self, plaintext: &str, counter: u64, salt: [u8; SALT_LEN]) -> Result<String> {
		let (key, iv) = evp_bytes_to_key(self.key_for(counter).as_bytes(), &salt);
		let sealed = Aes256CbcEnc::new_from_slices(&key, &iv)
			.map_err(|e| Error::Crypto(e.to_string()))?
			.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

		let mut frame = Vec::with_capacity(SALTED_MAGIC.len() + SALT_LEN + sealed.len());
		frame.extend_from_slice(SALTED_MAGIC);
		frame.extend_from_slice(&salt);
		frame.extend_from_slice(&sealed);
		Ok(STANDARD.encode(frame))
	}

	pub fn decrypt(&self, ciphertext: &str, counter: u64) -> Result<String> {
		let frame = STANDARD
			.decode(ciphertext.trim())
			.map_err(|e| Error::Crypto(format!("ciphertext is not base64: {e}")))?;
		let Some(body) = frame.strip_prefix(SALTED_MAGIC.as_slice()) else {
			return Err(Error::Crypto("ciphertext lacks the salted header".to_string()));
		};
		if body.len() < SALT_LEN + BLOCK_LEN || (body.len() - SALT_LEN) % BLOCK_LEN != 0 {
			return Err(Error::Crypto("ciphertext has a truncated block".to_string()));
		}
		let (salt, sealed) = body.split_at(SALT_LEN);

		let (key, iv) = evp_bytes_to_key(self.key_for(counter).as_bytes(), salt);
		let plain = Aes256CbcDec::new_from_slices(&key, &iv)
			.map_err(|e| Error::Crypto(e.to_string()))?
			.decrypt_padded_vec_mut::<Pkcs7>(sealed)
			.map_err(|_| Error::Crypto(format!("cannot decrypt payload for counter {counter}")))?;
		String::from_utf8(plain).map_err(|_| Error::Crypto("decrypted payload is not UTF-8".to_string()))
	}
}

/// OpenSSL `EVP_BytesToKey` with MD5 and a single iteration.
fn evp_bytes_to_key(passphrase: &[u8], salt: &[u8]) -> ([u8; KEY_LEN], [u8; IV_LEN]) {
	let mut derived = Vec::with_capacity(KEY_LEN + IV_LEN + BLOCK_LEN);
	let mut block: Vec<u8> = Vec::new();
	while derived.len() < KEY_LEN + IV_LEN {
		let mut hasher = Md5::new();
		hasher.update(&block);
		hasher.update(passphrase);
		hasher.update(salt);
		block = hasher.finalize().to_vec();
		derived.extend_from_slice(&block);
	}

	let mut key = [0u8; KEY_LEN];
	let mut iv = [0u8; IV_LEN];
	key.copy_from_slice(&derived[..KEY_LEN]);
	iv.copy_from_slice(&derived[KEY_LEN..KEY_LEN + IV_LEN]);
	(key, iv)
}

#[cfg(test)]
mod tests {
	use std::collections::HashSet;

	use super::*;

	const SECRET: &str = "5f2b8c0e9a71d4436e0c1f8a2b3d4e5f60718293a4b5c6d7e8f9012345678901";

	/// Made with `openssl enc -aes-256-cbc -md md5` under the counter-42 key.
	const OPENSSL_ACCOUNT_CALL: &str =
		"U2FsdGVkX18BAgMEBQYHCEhT9CWSgDVbhvl6BO2+jzCcuJKIx8Z66hrppV+NVFHHpJnjlnBgciM6FKSuDL7vnA==";
	const OPENSSL_OK: &str = "U2FsdGVkX1+hssPU5fYHGK/3aUZ4gfVw/O7bJSgPH1s=";
	const OPENSSL_RANDOM_SALT: &str = "U2FsdGVkX19CAapVpS48wgKHNVBH0XYfsY6mNAvzfQM=";

	fn cipher() -> SessionCipher {
		SessionCipher::from_secret_hex(SECRET).unwrap()
	}

	#[test]
	fn key_for_is_the_counter_hotp() {
		assert_eq!(cipher().key_for(42), "00000000000000000000001502174741");
	}

	#[test]
	fn reads_openssl_salted_frames() {
		let cipher = cipher();
		assert_eq!(
			cipher.decrypt(OPENSSL_ACCOUNT_CALL, 42).unwrap(),
			r#"{"method":"getAccount","params":{}}"#
		);
		assert_eq!(cipher.decrypt(OPENSSL_OK, 42).unwrap(), r#""ok""#);
		assert_eq!(cipher.decrypt(OPENSSL_RANDOM_SALT, 42).unwrap(), "hello");
	}

	#[test]
	fn writes_openssl_salted_frames() {
		let cipher = cipher();
		let sealed = cipher
			.encrypt_with_salt(r#"{"method":"getAccount","params":{}}"#, 42, [1, 2, 3, 4, 5, 6, 7, 8])
			.unwrap();
		assert_eq!(sealed, OPENSSL_ACCOUNT_CALL);
		assert!(cipher.encrypt("x", 42).unwrap().starts_with("U2FsdGVkX1"));
	}

	#[test]
	fn round_trips_across_counters() {
		let cipher = cipher();
		let payload = r#"{"method":"getAccount","params":{},"next_hash":"ab"}"#;
		for counter in [0u64, 1, 42, 100_000_001, u64::MAX] {
			let sealed = cipher.encrypt(payload, counter).unwrap();
			assert_eq!(cipher.decrypt(&sealed, counter).unwrap(), payload);
		}
	}

	#[test]
	fn round_trips_empty_and_unicode_payloads() {
		let cipher = cipher();
		for payload in ["", "ünïcødé ✓", "\"quoted\""] {
			let sealed = cipher.encrypt(payload, 9).unwrap();
			assert_eq!(cipher.decrypt(&sealed, 9).unwrap(), payload);
		}
	}

	#[test]
	fn wrong_counter_fails_to_decrypt() {
		let cipher = cipher();
		let sealed = cipher.encrypt(r#"{"method":"voteFor","params":{}}"#, 7).unwrap();
		assert!(!cipher.decrypt(&sealed, 8).is_ok_and(|plain| plain == r#"{"method":"voteFor","params":{}}"#));
	}

	#[test]
	fn malformed_frames_are_rejected() {
		let cipher = cipher();
		assert!(cipher.decrypt("not base64!", 7).is_err());
		assert!(cipher.decrypt("AAAA", 7).is_err());
		let mut frame = STANDARD.decode(OPENSSL_OK).unwrap();
		frame.pop();
		assert!(cipher.decrypt(&STANDARD.encode(frame), 42).is_err());
	}

	#[test]
	fn encryption_is_randomized() {
		let cipher = cipher();
		assert_ne!(cipher.encrypt("same", 1).unwrap(), cipher.encrypt("same", 1).unwrap());
	}

	#[test]
	fn keys_differ_per_counter() {
		let cipher = cipher();
		let keys: HashSet<String> = (0..200u64).map(|n| cipher.key_for(n)).collect();
		assert_eq!(keys.len(), 200);
	}
}
