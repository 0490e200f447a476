// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Boot-time gate: refuse to serve when no configured key can decrypt
//! anything that is stored.

use crate::error::{CredentialError, Result};
use crate::keys::EncryptionKeySet;
use crate::store::CredentialStore;

pub struct DecryptableDataDetector;

impl DecryptableDataDetector {
	/// An empty database always passes.
	pub fn check(total_encrypted: i64, decryptable: i64) -> Result<()> {
		if total_encrypted > 0 && decryptable == 0 {
			let message = format!(
				"The encryption keys provided cannot decrypt any of the {total_encrypted} value(s) \
				 in the database. Please make sure you've provided the necessary encryption keys."
			);
			tracing::error!(total_encrypted, "{message}");
			return Err(CredentialError::ConfigurationFatal(message));
		}
		Ok(())
	}

	#[tracing::instrument(skip_all, fields(keys = keys.len()))]
	pub async fn run(store: &dyn CredentialStore, keys: &EncryptionKeySet) -> Result<()> {
		let mut tx = store.begin().await?;
		let total = tx.count_encrypted().await?;
		let decryptable = tx.count_encrypted_with_keys(&keys.uuids()).await?;
		drop(tx);

		tracing::debug!(total, decryptable, "checked stored values against configured keys");
		Self::check(total, decryptable)
	}
}
