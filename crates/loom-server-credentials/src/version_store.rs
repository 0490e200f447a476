// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Active and transitional views over certificate versions.
//!
//! The active version of a certificate is its most recently created
//! non-transitional version. At most one version is transitional.

use std::sync::Arc;
use uuid::Uuid;

use crate::certificate::CertificateParser;
use crate::error::Result;
use crate::store::CredentialTransaction;
use crate::types::CredentialVersion;

#[derive(Clone)]
pub struct CertificateVersionStore {
	parser: Arc<dyn CertificateParser>,
}

impl CertificateVersionStore {
	pub fn new(parser: Arc<dyn CertificateParser>) -> Self {
		Self { parser }
	}

	/// The active version, or the transitional one when nothing is active.
	pub async fn find_by_credential_uuid(
		&self,
		tx: &mut dyn CredentialTransaction,
		credential_uuid: Uuid,
	) -> Result<Option<CredentialVersion>> {
		if let Some(active) = tx.find_latest_non_transitional(credential_uuid).await? {
			return Ok(Some(active).filter(CredentialVersion::is_certificate));
		}
		Ok(tx
			.find_transitional(credential_uuid)
			.await?
			.filter(CredentialVersion::is_certificate))
	}

	pub async fn find_active(
		&self,
		tx: &mut dyn CredentialTransaction,
		name: &str,
	) -> Result<Option<CredentialVersion>> {
		let Some(credential) = tx.find_credential(name).await? else {
			return Ok(None);
		};
		tx.find_latest_non_transitional(credential.uuid).await
	}

	/// Active then transitional version; zero, one or two distinct entries.
	pub async fn find_active_with_transitional(
		&self,
		tx: &mut dyn CredentialTransaction,
		name: &str,
	) -> Result<Vec<CredentialVersion>> {
		let Some(credential) = tx.find_credential(name).await? else {
			return Ok(Vec::new());
		};

		let mut versions = Vec::with_capacity(2);
		if let Some(active) = tx.find_latest_non_transitional(credential.uuid).await? {
			versions.push(active);
		}
		if let Some(transitional) = tx.find_transitional(credential.uuid).await? {
			if versions.iter().all(|v| v.uuid != transitional.uuid) {
				versions.push(transitional);
			}
		}
		Ok(versions)
	}

	/// Every version whose stored certificate parses. Corrupted historical
	/// rows are skipped rather than failing the listing.
	pub async fn find_all_valid_versions(
		&self,
		tx: &mut dyn CredentialTransaction,
		credential_uuid: Uuid,
	) -> Result<Vec<CredentialVersion>> {
		let versions = tx.find_all_by_credential_uuid(credential_uuid).await?;

		Ok(versions
			.into_iter()
			.filter(|version| match version.certificate_pem() {
				Some(pem) => match self.parser.parse(pem) {
					Ok(_) => true,
					Err(e) => {
						tracing::warn!(version_uuid = %version.uuid, error = %e, "skipping unparseable certificate version");
						false
					}
				},
				None => false,
			})
			.collect())
	}

	pub async fn find_version(
		&self,
		tx: &mut dyn CredentialTransaction,
		version_uuid: Uuid,
	) -> Result<Option<CredentialVersion>> {
		Ok(tx
			.find_version(version_uuid)
			.await?
			.filter(CredentialVersion::is_certificate))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::certificate::{CertificateMetadata, X509CertificateParser};
	use crate::error::CredentialError;
	use crate::sqlite::SqliteCredentialStore;
	use crate::store::CredentialStore;
	use crate::types::{CertificateColumns, CredentialKind};
	use chrono::{Duration, Utc};

	struct PemMarkerParser;

	impl CertificateParser for PemMarkerParser {
		fn parse(&self, pem: &str) -> Result<CertificateMetadata> {
			if pem.starts_with("good") {
				Ok(CertificateMetadata {
					is_ca: true,
					is_self_signed: true,
					key_length: None,
					subject_name: String::new(),
					duration_days: 1,
				})
			} else {
				X509CertificateParser.parse(pem)
			}
		}
	}

	fn cert_version(
		credential_uuid: Uuid,
		age_secs: i64,
		pem: &str,
		transitional: bool,
	) -> CredentialVersion {
		CredentialVersion {
			uuid: Uuid::new_v4(),
			credential_uuid,
			kind: CredentialKind::Certificate,
			version_created_at: Utc::now() - Duration::seconds(age_secs),
			encryption_key_uuid: Uuid::new_v4(),
			encrypted_value: vec![0],
			nonce: vec![0; 12],
			certificate: Some(CertificateColumns {
				certificate: pem.to_string(),
				transitional,
				..Default::default()
			}),
		}
	}

	fn versions() -> CertificateVersionStore {
		CertificateVersionStore::new(Arc::new(PemMarkerParser))
	}

	#[tokio::test]
	async fn test_find_by_credential_uuid_prefers_active() {
		let store = SqliteCredentialStore::in_memory().await.unwrap();
		let mut tx = store.begin().await.unwrap();
		let credential = tx.find_or_create_credential("/cert").await.unwrap();

		let transitional = cert_version(credential.uuid, 0, "good-t", true);
		tx.save_version(&transitional).await.unwrap();

		let found = versions()
			.find_by_credential_uuid(tx.as_mut(), credential.uuid)
			.await
			.unwrap()
			.unwrap();
		assert_eq!(found.uuid, transitional.uuid);

		let active = cert_version(credential.uuid, 10, "good-a", false);
		tx.save_version(&active).await.unwrap();

		let found = versions()
			.find_by_credential_uuid(tx.as_mut(), credential.uuid)
			.await
			.unwrap()
			.unwrap();
		assert_eq!(found.uuid, active.uuid);

		assert!(versions()
			.find_by_credential_uuid(tx.as_mut(), Uuid::new_v4())
			.await
			.unwrap()
			.is_none());
	}

	#[tokio::test]
	async fn test_find_active_picks_latest_non_transitional() {
		let store = SqliteCredentialStore::in_memory().await.unwrap();
		let mut tx = store.begin().await.unwrap();
		let credential = tx.find_or_create_credential("/ca").await.unwrap();

		let old = cert_version(credential.uuid, 30, "good-old", false);
		let newest_active = cert_version(credential.uuid, 20, "good-new", false);
		let transitional = cert_version(credential.uuid, 10, "good-t", true);
		for v in [&old, &newest_active, &transitional] {
			tx.save_version(v).await.unwrap();
		}

		let active = versions()
			.find_active(tx.as_mut(), "/CA")
			.await
			.unwrap()
			.unwrap();
		assert_eq!(active.uuid, newest_active.uuid);

		let both = versions()
			.find_active_with_transitional(tx.as_mut(), "/ca")
			.await
			.unwrap();
		let ids: Vec<Uuid> = both.iter().map(|v| v.uuid).collect();
		assert_eq!(ids, vec![newest_active.uuid, transitional.uuid]);

		assert!(versions()
			.find_active(tx.as_mut(), "/unknown")
			.await
			.unwrap()
			.is_none());
		assert!(versions()
			.find_active_with_transitional(tx.as_mut(), "/unknown")
			.await
			.unwrap()
			.is_empty());
	}

	#[tokio::test]
	async fn test_find_all_valid_versions_skips_malformed_rows() {
		let store = SqliteCredentialStore::in_memory().await.unwrap();
		let mut tx = store.begin().await.unwrap();
		let credential = tx.find_or_create_credential("/history").await.unwrap();

		let good = cert_version(credential.uuid, 10, "good-1", false);
		let bad = cert_version(credential.uuid, 5, "-----BEGIN CERTIFICATE-----\ncorrupt", false);
		tx.save_version(&good).await.unwrap();
		tx.save_version(&bad).await.unwrap();

		let valid = versions()
			.find_all_valid_versions(tx.as_mut(), credential.uuid)
			.await
			.unwrap();
		assert_eq!(valid.len(), 1);
		assert_eq!(valid[0].uuid, good.uuid);

		assert!(matches!(
			PemMarkerParser.parse(bad.certificate_pem().unwrap()),
			Err(CredentialError::InvalidCertificate(_))
		));
	}
}
