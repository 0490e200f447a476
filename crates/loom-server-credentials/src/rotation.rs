// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Certificate saves and CA transitional rotation.
//!
//! Every operation runs in one [`CredentialTransaction`]: the transitional
//! check, the CA write and every regenerated child version commit together or
//! not at all. Audit events are emitted only after commit.
//!
//! With `concatenate_cas` enabled a change to a CA's transitional version
//! writes a new version of each child certificate whose `ca` holds the
//! active and transitional CA certificates, one PEM block each.

use std::sync::Arc;
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditOperation, AuditRecorder};
use crate::authority::CertificateAuthorityResolver;
use crate::certificate::{concatenate_certificates, CertificateParser};
use crate::clock::TimeProvider;
use crate::error::{CredentialError, Result};
use crate::factory::CredentialFactory;
use crate::store::{CredentialStore, CredentialTransaction};
use crate::types::{
	normalize_name, CertificateCredentialValue, Credential, CredentialKind, CredentialValue,
	CredentialVersion,
};
use crate::version_store::CertificateVersionStore;

pub struct CertificateRotationCoordinator {
	store: Arc<dyn CredentialStore>,
	factory: Arc<CredentialFactory>,
	parser: Arc<dyn CertificateParser>,
	versions: CertificateVersionStore,
	resolver: CertificateAuthorityResolver,
	clock: Arc<dyn TimeProvider>,
	audit: Arc<dyn AuditRecorder>,
	concatenate_cas: bool,
}

impl CertificateRotationCoordinator {
	pub fn new(
		store: Arc<dyn CredentialStore>,
		factory: Arc<CredentialFactory>,
		parser: Arc<dyn CertificateParser>,
		clock: Arc<dyn TimeProvider>,
		audit: Arc<dyn AuditRecorder>,
		concatenate_cas: bool,
	) -> Self {
		let versions = CertificateVersionStore::new(parser.clone());
		let resolver =
			CertificateAuthorityResolver::new(versions.clone(), factory.clone(), parser.clone());
		Self {
			store,
			factory,
			parser,
			versions,
			resolver,
			clock,
			audit,
			concatenate_cas,
		}
	}

	/// Store a new version of the certificate credential `name`.
	///
	/// When `ca_name` is set and `ca` is empty, `ca` is filled from the
	/// signing CA.
	#[tracing::instrument(skip(self, value), fields(transitional = value.transitional))]
	pub async fn save_certificate(
		&self,
		name: &str,
		mut value: CertificateCredentialValue,
	) -> Result<CredentialVersion> {
		let name = normalize_name(name)?;
		value.ca_name = value.ca_name.as_deref().map(normalize_name).transpose()?;

		let metadata = self.parser.parse(&value.certificate)?;
		if value.transitional && !metadata.is_ca {
			return Err(CredentialError::TransitionalRequiresCa { name });
		}

		let mut tx = self.store.begin().await?;

		if let Some(ca_name) = value.ca_name.clone() {
			let missing_ca = value.ca.as_deref().map_or(true, |ca| ca.trim().is_empty());
			if missing_ca && !ca_name.eq_ignore_ascii_case(&name) {
				value.ca = Some(self.ca_chain(tx.as_mut(), &ca_name).await?);
			}
		}

		if let Some(latest) = tx.find_most_recent(&name).await? {
			if latest.kind != CredentialKind::Certificate {
				return Err(CredentialError::ParameterizedValidation {
					key: "error.type_mismatch".to_string(),
					parameters: vec![name, latest.kind.to_string()],
				});
			}
		}

		let credential = tx.find_or_create_credential(&name).await?;
		if value.transitional && tx.find_transitional(credential.uuid).await?.is_some() {
			return Err(CredentialError::TooManyTransitionalVersions {
				name: credential.name,
			});
		}

		let version = self.factory.make_new_credential_version(
			&credential,
			&CredentialValue::Certificate(value),
			self.clock.now(),
		)?;
		tx.save_version(&version).await?;

		let regenerated = if version.is_transitional() && self.concatenate_cas {
			self.regenerate_children(tx.as_mut(), &credential.name).await?
		} else {
			Vec::new()
		};

		tx.commit().await?;

		self.audit.record(AuditEvent::new(
			AuditOperation::CredentialSave,
			&credential.name,
			credential.uuid,
			Some(version.uuid),
		));
		self.record_regenerated(regenerated);

		tracing::debug!(version_uuid = %version.uuid, "certificate version saved");
		Ok(version)
	}

	/// Move the transitional flag of `certificate_uuid` to
	/// `transitional_version_uuid`, or clear it when `None`.
	///
	/// Returns the active and transitional versions afterwards.
	#[tracing::instrument(skip(self))]
	pub async fn update_transitional_version(
		&self,
		certificate_uuid: Uuid,
		transitional_version_uuid: Option<Uuid>,
	) -> Result<Vec<CredentialVersion>> {
		let mut tx = self.store.begin().await?;
		let credential = tx
			.find_credential_by_uuid(certificate_uuid)
			.await?
			.ok_or(CredentialError::EntryNotFound)?;

		let history = tx.find_all_by_credential_uuid(credential.uuid).await?;
		let currently_transitional: Vec<&CredentialVersion> =
			history.iter().filter(|v| v.is_transitional()).collect();
		if currently_transitional.len() > 1 {
			return Err(CredentialError::TooManyTransitionalVersions {
				name: credential.name,
			});
		}
		let previous = currently_transitional.first().map(|v| v.uuid);

		if let Some(target_uuid) = transitional_version_uuid {
			let target = tx
				.find_version(target_uuid)
				.await?
				.filter(|v| v.credential_uuid == credential.uuid && v.is_certificate())
				.ok_or_else(|| CredentialError::mismatched_version(target_uuid))?;

			let is_ca = target
				.certificate
				.as_ref()
				.is_some_and(|c| c.certificate_authority);
			if !is_ca {
				return Err(CredentialError::TransitionalRequiresCa {
					name: credential.name,
				});
			}
		}

		if let Some(previous) = previous.filter(|p| Some(*p) != transitional_version_uuid) {
			tx.set_transitional(previous, false).await?;
		}
		if let Some(target_uuid) = transitional_version_uuid {
			tx.set_transitional(target_uuid, true).await?;
		}

		let changed = previous != transitional_version_uuid;
		let regenerated = if changed && self.concatenate_cas {
			self.regenerate_children(tx.as_mut(), &credential.name).await?
		} else {
			Vec::new()
		};

		let current = self
			.versions
			.find_active_with_transitional(tx.as_mut(), &credential.name)
			.await?;
		tx.commit().await?;

		self.audit.record(AuditEvent::new(
			AuditOperation::TransitionalUpdate,
			&credential.name,
			credential.uuid,
			transitional_version_uuid,
		));
		self.record_regenerated(regenerated);

		Ok(current)
	}

	/// Delete one version of a certificate. The version must belong to
	/// `certificate_uuid`.
	#[tracing::instrument(skip(self))]
	pub async fn delete_version(
		&self,
		certificate_uuid: Uuid,
		version_uuid: Uuid,
	) -> Result<CredentialVersion> {
		let mut tx = self.store.begin().await?;
		let credential = tx
			.find_credential_by_uuid(certificate_uuid)
			.await?
			.ok_or(CredentialError::EntryNotFound)?;
		let version = self
			.versions
			.find_version(tx.as_mut(), version_uuid)
			.await?
			.filter(|v| v.credential_uuid == credential.uuid)
			.ok_or(CredentialError::EntryNotFound)?;

		tx.delete_version(version.uuid).await?;

		let regenerated = if version.is_transitional() && self.concatenate_cas {
			self.regenerate_children(tx.as_mut(), &credential.name).await?
		} else {
			Vec::new()
		};

		tx.commit().await?;

		self.audit.record(AuditEvent::new(
			AuditOperation::VersionDelete,
			&credential.name,
			credential.uuid,
			Some(version.uuid),
		));
		self.record_regenerated(regenerated);

		Ok(version)
	}

	/// Delete a credential with its whole history.
	#[tracing::instrument(skip(self))]
	pub async fn delete_credential(&self, name: &str) -> Result<()> {
		let name = normalize_name(name)?;
		let mut tx = self.store.begin().await?;
		let credential = tx
			.find_credential(&name)
			.await?
			.ok_or(CredentialError::EntryNotFound)?;

		tx.delete_credential(&credential.name).await?;
		tx.commit().await?;

		self.audit.record(AuditEvent::new(
			AuditOperation::CredentialDelete,
			&credential.name,
			credential.uuid,
			None,
		));
		Ok(())
	}

	pub async fn find_by_credential_uuid(
		&self,
		credential_uuid: Uuid,
	) -> Result<Option<CredentialVersion>> {
		let mut tx = self.store.begin().await?;
		self
			.versions
			.find_by_credential_uuid(tx.as_mut(), credential_uuid)
			.await
	}

	pub async fn find_active_with_transitional(&self, name: &str) -> Result<Vec<CredentialVersion>> {
		let name = normalize_name(name)?;
		let mut tx = self.store.begin().await?;
		self
			.versions
			.find_active_with_transitional(tx.as_mut(), &name)
			.await
	}

	pub async fn find_all_valid_versions(
		&self,
		credential_uuid: Uuid,
	) -> Result<Vec<CredentialVersion>> {
		let mut tx = self.store.begin().await?;
		tx.find_credential_by_uuid(credential_uuid)
			.await?
			.ok_or(CredentialError::EntryNotFound)?;
		self
			.versions
			.find_all_valid_versions(tx.as_mut(), credential_uuid)
			.await
	}

	pub async fn find_active_ca(&self, ca_name: &str) -> Result<CertificateCredentialValue> {
		let ca_name = normalize_name(ca_name)?;
		let mut tx = self.store.begin().await?;
		self.resolver.find_active_version(tx.as_mut(), &ca_name).await
	}

	pub async fn find_transitional_ca(
		&self,
		ca_name: &str,
	) -> Result<Option<CertificateCredentialValue>> {
		let ca_name = normalize_name(ca_name)?;
		let mut tx = self.store.begin().await?;
		self
			.resolver
			.find_transitional_version(tx.as_mut(), &ca_name)
			.await
	}

	/// The `ca` value for a certificate signed by `ca_name`.
	async fn ca_chain(&self, tx: &mut dyn CredentialTransaction, ca_name: &str) -> Result<String> {
		let active = self.resolver.find_active_version(tx, ca_name).await?;
		if !self.concatenate_cas {
			return Ok(active.certificate);
		}

		let transitional = self.resolver.find_transitional_version(tx, ca_name).await?;
		Ok(concatenate_certificates(
			std::iter::once(active.certificate.as_str())
				.chain(transitional.as_ref().map(|t| t.certificate.as_str())),
		))
	}

	/// Write a new version of every child of `ca_name` carrying the current
	/// active and transitional CA certificates.
	///
	/// A child is rebuilt from its active version and the copy is never
	/// transitional, so an intermediate CA keeps its single transitional
	/// version. Children without an active version signed by `ca_name` are
	/// left alone.
	async fn regenerate_children(
		&self,
		tx: &mut dyn CredentialTransaction,
		ca_name: &str,
	) -> Result<Vec<(Credential, Uuid)>> {
		let ca_versions = self.versions.find_active_with_transitional(tx, ca_name).await?;
		if ca_versions.is_empty() {
			return Ok(Vec::new());
		}
		let chain = concatenate_certificates(ca_versions.iter().filter_map(|v| v.certificate_pem()));

		let children = tx.find_all_certificate_credentials_by_ca_name(ca_name).await?;
		let mut regenerated = Vec::with_capacity(children.len());

		for child_name in children {
			let Some(credential) = tx.find_credential(&child_name).await? else {
				continue;
			};
			let active = tx
				.find_latest_non_transitional(credential.uuid)
				.await?
				.filter(|v| v.ca_name().is_some_and(|n| n.eq_ignore_ascii_case(ca_name)));
			let Some(active) = active else {
				tracing::debug!(child = %child_name, "child has no active version signed by this CA, skipping");
				continue;
			};

			let mut value = self
				.factory
				.decrypt(&active)?
				.into_certificate()
				.ok_or_else(|| {
					CredentialError::Internal(format!("child {child_name} is not a certificate"))
				})?;
			value.ca = Some(chain.clone());
			value.transitional = false;

			let version = self.factory.make_new_credential_version(
				&credential,
				&CredentialValue::Certificate(value),
				self.clock.now(),
			)?;
			tx.save_version(&version).await?;
			regenerated.push((credential, version.uuid));
		}

		tracing::info!(
			ca_name,
			ca_versions = ca_versions.len(),
			children = regenerated.len(),
			"regenerated child certificates"
		);
		Ok(regenerated)
	}

	fn record_regenerated(&self, regenerated: Vec<(Credential, Uuid)>) {
		for (credential, version_uuid) in regenerated {
			self.audit.record(AuditEvent::new(
				AuditOperation::ChildRegenerate,
				credential.name,
				credential.uuid,
				Some(version_uuid),
			));
		}
	}
}
