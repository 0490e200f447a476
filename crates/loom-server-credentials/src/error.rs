// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use uuid::Uuid;

/// Coarse classification used by callers to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
	/// 404-equivalent. Never retried.
	NotFound,
	/// 400-equivalent with a structured message.
	Validation,
	/// Raised at boot; the process must refuse to serve traffic.
	Configuration,
	Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
	#[error(
		"The request could not be completed because the credential does not exist or you do not have sufficient authorization."
	)]
	EntryNotFound,

	#[error("The provided CA name '{name}' does not refer to a certificate credential.")]
	NotACaName { name: String },

	#[error("The provided CA name '{name}' refers to a certificate that is not a certificate authority.")]
	CertNotCa { name: String },

	#[error("The certificate '{name}' already has a transitional version. Only one transitional version is allowed.")]
	TooManyTransitionalVersions { name: String },

	#[error("Only a certificate authority can be marked transitional: '{name}'.")]
	TransitionalRequiresCa { name: String },

	#[error("Validation failed for '{key}': {parameters:?}")]
	ParameterizedValidation { key: String, parameters: Vec<String> },

	#[error("The provided certificate value is not a valid X.509 certificate: {0}")]
	InvalidCertificate(String),

	#[error("Invalid credential name: {0}")]
	InvalidName(String),

	#[error("Configuration error: {0}")]
	ConfigurationFatal(String),

	#[error("Encryption key {0} is not available")]
	KeyNotFound(Uuid),

	#[error("Encryption error: {0}")]
	Encryption(String),

	#[error("Decryption error: {0}")]
	Decryption(String),

	#[error("Database error: {0}")]
	Db(#[from] sqlx::Error),

	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("Internal: {0}")]
	Internal(String),
}

impl CredentialError {
	pub fn kind(&self) -> ErrorKind {
		match self {
			CredentialError::EntryNotFound => ErrorKind::NotFound,
			CredentialError::NotACaName { .. }
			| CredentialError::CertNotCa { .. }
			| CredentialError::TooManyTransitionalVersions { .. }
			| CredentialError::TransitionalRequiresCa { .. }
			| CredentialError::ParameterizedValidation { .. }
			| CredentialError::InvalidCertificate(_)
			| CredentialError::InvalidName(_) => ErrorKind::Validation,
			CredentialError::ConfigurationFatal(_) => ErrorKind::Configuration,
			CredentialError::KeyNotFound(_)
			| CredentialError::Encryption(_)
			| CredentialError::Decryption(_)
			| CredentialError::Db(_)
			| CredentialError::Serialization(_)
			| CredentialError::Internal(_) => ErrorKind::Internal,
		}
	}

	pub(crate) fn mismatched_version(version_uuid: Uuid) -> Self {
		CredentialError::ParameterizedValidation {
			key: "error.credential.mismatched_credential_and_version".to_string(),
			parameters: vec![version_uuid.to_string()],
		}
	}
}

pub type Result<T> = std::result::Result<T, CredentialError>;
