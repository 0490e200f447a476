// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Re-encrypts values held under legacy keys with the active key.

use std::sync::Arc;

use crate::error::Result;
use crate::keys::EncryptionKeySet;
use crate::store::CredentialStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RotationReport {
	pub rotated: u64,
	/// Values under a known legacy key that failed to decrypt. Left untouched.
	pub failed: u64,
	/// Values under keys this process does not know. Left untouched.
	pub undecryptable: i64,
}

pub struct EncryptionKeyRotator {
	store: Arc<dyn CredentialStore>,
	keys: Arc<EncryptionKeySet>,
	batch_size: i64,
}

impl EncryptionKeyRotator {
	pub fn new(store: Arc<dyn CredentialStore>, keys: Arc<EncryptionKeySet>, batch_size: u32) -> Self {
		Self {
			store,
			keys,
			batch_size: i64::from(batch_size.max(1)),
		}
	}

	/// Each batch commits on its own; an interrupted run resumes where it stopped.
	/// Rows that no longer decrypt are skipped and counted in `failed`.
	#[tracing::instrument(skip(self), fields(active_key = %self.keys.active().uuid()))]
	pub async fn rotate(&self) -> Result<RotationReport> {
		let legacy = self.keys.inactive_uuids();
		let active = self.keys.active();
		let mut report = RotationReport::default();
		let mut cursor = None;

		loop {
			let mut tx = self.store.begin().await?;
			let batch = tx
				.find_encrypted_with_keys(&legacy, cursor, self.batch_size)
				.await?;
			let Some(last) = batch.last() else {
				break;
			};
			cursor = Some((last.version_created_at, last.uuid));

			let mut rotated = 0u64;
			for version in &batch {
				let plaintext = match self.keys.decrypt(
					version.encryption_key_uuid,
					&version.encrypted_value,
					&version.nonce,
				) {
					Ok(plaintext) => plaintext,
					Err(e) => {
						tracing::warn!(version_uuid = %version.uuid, error = %e, "cannot decrypt value under legacy key, skipping");
						report.failed += 1;
						continue;
					}
				};
				let sealed = active.encrypt(&plaintext)?;
				tx.update_encryption(version.uuid, active.uuid(), &sealed).await?;
				rotated += 1;
			}

			tx.commit().await?;
			report.rotated += rotated;
			tracing::debug!(batch = batch.len(), total = report.rotated, "rotated batch");
		}

		let mut tx = self.store.begin().await?;
		let total = tx.count_encrypted().await?;
		let known = tx.count_encrypted_with_keys(&self.keys.uuids()).await?;
		report.undecryptable = total - known;

		tracing::info!(
			rotated = report.rotated,
			failed = report.failed,
			undecryptable = report.undecryptable,
			"encryption key rotation finished"
		);
		Ok(report)
	}
}
