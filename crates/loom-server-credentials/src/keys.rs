// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The set of encryption keys known to this process.
//!
//! Loaded once at startup and immutable afterwards. Key rotation happens by
//! restarting with a new set whose active key differs.

use std::fmt;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::encryption::{self, EncryptedValue, KEY_SIZE};
use crate::error::{CredentialError, Result};

pub struct EncryptionKey {
	uuid: Uuid,
	active: bool,
	material: Zeroizing<[u8; KEY_SIZE]>,
}

impl EncryptionKey {
	pub fn new(uuid: Uuid, active: bool, material: Zeroizing<[u8; KEY_SIZE]>) -> Self {
		Self {
			uuid,
			active,
			material,
		}
	}

	pub fn uuid(&self) -> Uuid {
		self.uuid
	}

	pub fn is_active(&self) -> bool {
		self.active
	}

	pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedValue> {
		encryption::encrypt(&self.material, plaintext)
	}

	pub fn decrypt(&self, ciphertext: &[u8], nonce: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
		encryption::decrypt_parts(&self.material, ciphertext, nonce)
	}
}

impl fmt::Debug for EncryptionKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("EncryptionKey")
			.field("uuid", &self.uuid)
			.field("active", &self.active)
			.finish_non_exhaustive()
	}
}

/// Active plus legacy keys. Exactly one key is active.
#[derive(Debug)]
pub struct EncryptionKeySet {
	keys: Vec<EncryptionKey>,
	active_index: usize,
}

impl EncryptionKeySet {
	pub fn new(keys: Vec<EncryptionKey>) -> Result<Self> {
		let mut active = keys
			.iter()
			.enumerate()
			.filter(|(_, k)| k.is_active())
			.map(|(i, _)| i);

		let active_index = active.next().ok_or_else(|| {
			CredentialError::ConfigurationFatal("no active encryption key is configured".to_string())
		})?;
		if active.next().is_some() {
			return Err(CredentialError::ConfigurationFatal(
				"more than one encryption key is marked active".to_string(),
			));
		}

		Ok(Self { keys, active_index })
	}

	pub fn active(&self) -> &EncryptionKey {
		&self.keys[self.active_index]
	}

	pub fn get(&self, uuid: Uuid) -> Option<&EncryptionKey> {
		self.keys.iter().find(|k| k.uuid == uuid)
	}

	pub fn contains(&self, uuid: Uuid) -> bool {
		self.get(uuid).is_some()
	}

	pub fn uuids(&self) -> Vec<Uuid> {
		self.keys.iter().map(|k| k.uuid).collect()
	}

	/// Known keys other than the active one.
	pub fn inactive_uuids(&self) -> Vec<Uuid> {
		self
			.keys
			.iter()
			.filter(|k| !k.active)
			.map(|k| k.uuid)
			.collect()
	}

	pub fn len(&self) -> usize {
		self.keys.len()
	}

	pub fn is_empty(&self) -> bool {
		self.keys.is_empty()
	}

	/// Decrypt with whichever known key `key_uuid` names.
	pub fn decrypt(
		&self,
		key_uuid: Uuid,
		ciphertext: &[u8],
		nonce: &[u8],
	) -> Result<Zeroizing<Vec<u8>>> {
		self
			.get(key_uuid)
			.ok_or(CredentialError::KeyNotFound(key_uuid))?
			.decrypt(ciphertext, nonce)
	}
}
