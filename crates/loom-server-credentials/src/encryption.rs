// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! AES-256-GCM encryption of stored credential values.

use aes_gcm::{
	aead::{Aead, KeyInit, OsRng},
	Aes256Gcm, Key, Nonce,
};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::{CredentialError, Result};

/// Size of encryption keys in bytes (256 bits for AES-256).
pub const KEY_SIZE: usize = 32;

/// Size of AES-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// Ciphertext with the nonce it was sealed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedValue {
	pub ciphertext: Vec<u8>,
	pub nonce: Vec<u8>,
}

/// Generate a random encryption key.
pub fn generate_key() -> Zeroizing<[u8; KEY_SIZE]> {
	let mut key = Zeroizing::new([0u8; KEY_SIZE]);
	OsRng.fill_bytes(key.as_mut());
	key
}

fn generate_nonce() -> [u8; NONCE_SIZE] {
	let mut nonce = [0u8; NONCE_SIZE];
	OsRng.fill_bytes(&mut nonce);
	nonce
}

/// Seal `plaintext` under `key` with a fresh random nonce.
pub fn encrypt(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> Result<EncryptedValue> {
	let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
	let nonce_bytes = generate_nonce();

	let ciphertext = cipher
		.encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
		.map_err(|e| CredentialError::Encryption(format!("value encryption failed: {e}")))?;

	Ok(EncryptedValue {
		ciphertext,
		nonce: nonce_bytes.to_vec(),
	})
}

/// Open a value sealed by [`encrypt`].
pub fn decrypt(key: &[u8; KEY_SIZE], encrypted: &EncryptedValue) -> Result<Zeroizing<Vec<u8>>> {
	decrypt_parts(key, &encrypted.ciphertext, &encrypted.nonce)
}

pub(crate) fn decrypt_parts(
	key: &[u8; KEY_SIZE],
	ciphertext: &[u8],
	nonce: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
	if nonce.len() != NONCE_SIZE {
		return Err(CredentialError::Decryption(format!(
			"invalid nonce size: expected {NONCE_SIZE}, got {}",
			nonce.len()
		)));
	}

	let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
	let plaintext = cipher
		.decrypt(Nonce::from_slice(nonce), ciphertext)
		.map_err(|e| CredentialError::Decryption(format!("value decryption failed: {e}")))?;

	Ok(Zeroizing::new(plaintext))
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn key_generation_produces_unique_keys() {
		let key1 = generate_key();
		let key2 = generate_key();
		assert_ne!(key1.as_slice(), key2.as_slice());
	}

	#[test]
	fn wrong_key_fails_decryption() {
		let key1 = generate_key();
		let key2 = generate_key();

		let encrypted = encrypt(&key1, b"private key material").unwrap();
		assert!(decrypt(&key2, &encrypted).is_err());
	}

	#[test]
	fn short_nonce_is_rejected() {
		let key = generate_key();
		let mut encrypted = encrypt(&key, b"secret").unwrap();
		encrypted.nonce.truncate(4);

		let err = decrypt(&key, &encrypted).unwrap_err();
		assert!(err.to_string().contains("invalid nonce size"));
	}

	proptest! {
		#[test]
		fn prop_encrypt_decrypt(plaintext in proptest::collection::vec(any::<u8>(), 0..4096)) {
			let key = generate_key();

			let encrypted = encrypt(&key, &plaintext).unwrap();
			let decrypted = decrypt(&key, &encrypted).unwrap();

			prop_assert_eq!(plaintext, decrypted.as_slice());
		}

		#[test]
		fn prop_tampered_ciphertext_fails_decryption(
			plaintext in proptest::collection::vec(any::<u8>(), 1..1000),
			tamper_idx in 0usize..1000usize,
		) {
			let key = generate_key();

			let mut encrypted = encrypt(&key, &plaintext).unwrap();
			let idx = tamper_idx % encrypted.ciphertext.len();
			encrypted.ciphertext[idx] ^= 0xFF;

			prop_assert!(decrypt(&key, &encrypted).is_err());
		}
	}
}
