// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Storage collaborator for credentials and their versions.
//!
//! Every read and write goes through a [`CredentialTransaction`]. A
//! transaction dropped without [`CredentialTransaction::commit`] is rolled
//! back, so a validation failure halfway through a rotation leaves no trace.
//!
//! Name lookups are case-insensitive. "Most recent" means
//! `version_created_at` descending, then version UUID descending.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::canary::EncryptionKeyCanary;
use crate::encryption::EncryptedValue;
use crate::error::Result;
use crate::types::{Credential, CredentialVersion};

#[async_trait]
pub trait CredentialStore: Send + Sync {
	/// Open a unit of work.
	async fn begin(&self) -> Result<Box<dyn CredentialTransaction>>;
}

#[async_trait]
pub trait CredentialTransaction: Send {
	async fn find_credential(&mut self, name: &str) -> Result<Option<Credential>>;

	async fn find_credential_by_uuid(&mut self, uuid: Uuid) -> Result<Option<Credential>>;

	/// Return the credential with this name, creating it if absent.
	async fn find_or_create_credential(&mut self, name: &str) -> Result<Credential>;

	/// Delete a credential and its whole history. Returns `false` if unknown.
	async fn delete_credential(&mut self, name: &str) -> Result<bool>;

	async fn save_version(&mut self, version: &CredentialVersion) -> Result<()>;

	async fn find_version(&mut self, uuid: Uuid) -> Result<Option<CredentialVersion>>;

	async fn delete_version(&mut self, uuid: Uuid) -> Result<bool>;

	async fn set_transitional(&mut self, version_uuid: Uuid, transitional: bool) -> Result<()>;

	async fn find_most_recent(&mut self, name: &str) -> Result<Option<CredentialVersion>>;

	/// All versions for a name, most recent first.
	async fn find_all_by_name(&mut self, name: &str) -> Result<Vec<CredentialVersion>>;

	/// All versions for a credential, most recent first.
	async fn find_all_by_credential_uuid(
		&mut self,
		credential_uuid: Uuid,
	) -> Result<Vec<CredentialVersion>>;

	async fn find_latest_non_transitional(
		&mut self,
		credential_uuid: Uuid,
	) -> Result<Option<CredentialVersion>>;

	async fn find_transitional(&mut self, credential_uuid: Uuid)
		-> Result<Option<CredentialVersion>>;

	/// Names of certificate credentials whose most recent version is signed
	/// by `ca_name`, excluding the CA itself.
	async fn find_all_certificate_credentials_by_ca_name(
		&mut self,
		ca_name: &str,
	) -> Result<Vec<String>>;

	async fn count_encrypted(&mut self) -> Result<i64>;

	async fn count_encrypted_with_keys(&mut self, key_uuids: &[Uuid]) -> Result<i64>;

	/// Up to `limit` versions encrypted under any of `key_uuids`, oldest
	/// first, strictly after the `(version_created_at, uuid)` position `after`.
	async fn find_encrypted_with_keys(
		&mut self,
		key_uuids: &[Uuid],
		after: Option<(DateTime<Utc>, Uuid)>,
		limit: i64,
	) -> Result<Vec<CredentialVersion>>;

	async fn update_encryption(
		&mut self,
		version_uuid: Uuid,
		key_uuid: Uuid,
		encrypted: &EncryptedValue,
	) -> Result<()>;

	async fn find_canaries(&mut self) -> Result<Vec<EncryptionKeyCanary>>;

	async fn save_canary(&mut self, canary: &EncryptionKeyCanary) -> Result<()>;

	async fn commit(self: Box<Self>) -> Result<()>;
}
