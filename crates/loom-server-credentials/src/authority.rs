// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Resolves a CA name to the certificate authority that signs with it.

use std::sync::Arc;

use crate::certificate::CertificateParser;
use crate::error::{CredentialError, Result};
use crate::factory::CredentialFactory;
use crate::store::CredentialTransaction;
use crate::types::{CertificateCredentialValue, CredentialVersion};
use crate::version_store::CertificateVersionStore;

#[derive(Clone)]
pub struct CertificateAuthorityResolver {
	versions: CertificateVersionStore,
	factory: Arc<CredentialFactory>,
	parser: Arc<dyn CertificateParser>,
}

impl CertificateAuthorityResolver {
	pub fn new(
		versions: CertificateVersionStore,
		factory: Arc<CredentialFactory>,
		parser: Arc<dyn CertificateParser>,
	) -> Self {
		Self {
			versions,
			factory,
			parser,
		}
	}

	/// The active version of the CA named `ca_name`.
	#[tracing::instrument(skip(self, tx))]
	pub async fn find_active_version(
		&self,
		tx: &mut dyn CredentialTransaction,
		ca_name: &str,
	) -> Result<CertificateCredentialValue> {
		let version = self
			.versions
			.find_active(tx, ca_name)
			.await?
			.ok_or(CredentialError::EntryNotFound)?;

		let Some(pem) = version.certificate_pem().filter(|_| version.is_certificate()) else {
			return Err(CredentialError::NotACaName {
				name: ca_name.to_string(),
			});
		};

		if !self.parser.parse(pem)?.is_ca {
			return Err(CredentialError::CertNotCa {
				name: ca_name.to_string(),
			});
		}

		self.to_value(&version)
	}

	/// The transitional version of the CA, if one exists.
	#[tracing::instrument(skip(self, tx))]
	pub async fn find_transitional_version(
		&self,
		tx: &mut dyn CredentialTransaction,
		ca_name: &str,
	) -> Result<Option<CertificateCredentialValue>> {
		let versions = tx.find_all_by_name(ca_name).await?;

		let transitional = versions.iter().find(|version| {
			version.is_transitional()
				&& version
					.certificate_pem()
					.is_some_and(|pem| self.parser.parse(pem).is_ok_and(|m| m.is_ca))
		});

		transitional.map(|version| self.to_value(version)).transpose()
	}

	fn to_value(&self, version: &CredentialVersion) -> Result<CertificateCredentialValue> {
		self
			.factory
			.decrypt(version)?
			.into_certificate()
			.ok_or_else(|| CredentialError::Internal(format!("version {} is not a certificate", version.uuid)))
	}
}
