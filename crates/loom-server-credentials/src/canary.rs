// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Identifies configured encryption keys across restarts.
//!
//! Configuration carries only key material. Each key is recognised by the
//! canary row it can decrypt, and the canary's UUID becomes the key's UUID.

use uuid::Uuid;

use crate::config::EncryptionKeyConfig;
use crate::error::{CredentialError, Result};
use crate::keys::{EncryptionKey, EncryptionKeySet};
use crate::store::CredentialStore;

/// Known plaintext sealed under each key.
pub const CANARY_VALUE: &[u8] = b"loom-credentials-encryption-key-canary";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionKeyCanary {
	pub uuid: Uuid,
	pub encrypted_value: Vec<u8>,
	pub nonce: Vec<u8>,
}

pub struct EncryptionKeyCanaryMapper;

impl EncryptionKeyCanaryMapper {
	/// Resolve configured keys to UUIDs, creating a canary for a new active key.
	///
	/// Legacy keys without a canary can never have encrypted anything stored
	/// here and are dropped.
	#[tracing::instrument(skip_all, fields(configured = configured.len()))]
	pub async fn map_keys(
		store: &dyn CredentialStore,
		configured: &[EncryptionKeyConfig],
	) -> Result<EncryptionKeySet> {
		let mut tx = store.begin().await?;
		let canaries = tx.find_canaries().await?;
		let mut keys = Vec::with_capacity(configured.len());

		for config in configured {
			let material = config
				.decode()
				.map_err(|e| CredentialError::ConfigurationFatal(e.to_string()))?;
			let candidate = EncryptionKey::new(Uuid::nil(), config.active, material.clone());

			let matched = canaries.iter().find(|canary| {
				candidate
					.decrypt(&canary.encrypted_value, &canary.nonce)
					.is_ok_and(|plaintext| plaintext.as_slice() == CANARY_VALUE)
			});

			let uuid = match (matched, config.active) {
				(Some(canary), _) => canary.uuid,
				(None, true) => {
					let sealed = candidate.encrypt(CANARY_VALUE)?;
					let canary = EncryptionKeyCanary {
						uuid: Uuid::new_v4(),
						encrypted_value: sealed.ciphertext,
						nonce: sealed.nonce,
					};
					tx.save_canary(&canary).await?;
					tracing::info!(key_uuid = %canary.uuid, "created canary for new active encryption key");
					canary.uuid
				}
				(None, false) => {
					tracing::warn!("legacy encryption key has no canary, ignoring it");
					continue;
				}
			};

			keys.push(EncryptionKey::new(uuid, config.active, material));
		}

		tx.commit().await?;
		EncryptionKeySet::new(keys)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::sqlite::SqliteCredentialStore;

	fn hex_key(byte: u8) -> String {
		hex::encode([byte; 32])
	}

	#[tokio::test]
	async fn test_active_key_keeps_uuid_across_restarts() {
		let store = SqliteCredentialStore::in_memory().await.unwrap();
		let config = vec![EncryptionKeyConfig::new(hex_key(1), true)];

		let first = EncryptionKeyCanaryMapper::map_keys(&store, &config).await.unwrap();
		let second = EncryptionKeyCanaryMapper::map_keys(&store, &config).await.unwrap();

		assert_eq!(first.active().uuid(), second.active().uuid());
		let mut tx = store.begin().await.unwrap();
		assert_eq!(tx.find_canaries().await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn test_rotated_key_set_keeps_legacy_uuid() {
		let store = SqliteCredentialStore::in_memory().await.unwrap();
		let original = EncryptionKeyCanaryMapper::map_keys(
			&store,
			&[EncryptionKeyConfig::new(hex_key(1), true)],
		)
		.await
		.unwrap();
		let old_uuid = original.active().uuid();

		let rotated = EncryptionKeyCanaryMapper::map_keys(
			&store,
			&[
				EncryptionKeyConfig::new(hex_key(2), true),
				EncryptionKeyConfig::new(hex_key(1), false),
			],
		)
		.await
		.unwrap();

		assert_ne!(rotated.active().uuid(), old_uuid);
		assert_eq!(rotated.inactive_uuids(), vec![old_uuid]);
	}

	#[tokio::test]
	async fn test_unknown_legacy_key_is_dropped() {
		let store = SqliteCredentialStore::in_memory().await.unwrap();
		let keys = EncryptionKeyCanaryMapper::map_keys(
			&store,
			&[
				EncryptionKeyConfig::new(hex_key(1), true),
				EncryptionKeyConfig::new(hex_key(9), false),
			],
		)
		.await
		.unwrap();

		assert_eq!(keys.len(), 1);
	}

	#[tokio::test]
	async fn test_no_active_key_is_fatal() {
		let store = SqliteCredentialStore::in_memory().await.unwrap();
		let err = EncryptionKeyCanaryMapper::map_keys(
			&store,
			&[EncryptionKeyConfig::new(hex_key(1), false)],
		)
		.await
		.unwrap_err();
		assert!(matches!(err, CredentialError::ConfigurationFatal(_)));
	}
}
