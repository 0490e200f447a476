// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Credential and credential version rows.
//!
//! Versions reference their credential by UUID only. Resolving a version back
//! to its credential always goes through the store.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::error::{CredentialError, Result};

/// A logical credential. Names are unique case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
	pub uuid: Uuid,
	pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKind {
	Value,
	Password,
	Json,
	User,
	Ssh,
	Rsa,
	Certificate,
}

impl CredentialKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			CredentialKind::Value => "value",
			CredentialKind::Password => "password",
			CredentialKind::Json => "json",
			CredentialKind::User => "user",
			CredentialKind::Ssh => "ssh",
			CredentialKind::Rsa => "rsa",
			CredentialKind::Certificate => "certificate",
		}
	}
}

impl fmt::Display for CredentialKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for CredentialKind {
	type Err = CredentialError;

	fn from_str(s: &str) -> Result<Self> {
		match s {
			"value" => Ok(CredentialKind::Value),
			"password" => Ok(CredentialKind::Password),
			"json" => Ok(CredentialKind::Json),
			"user" => Ok(CredentialKind::User),
			"ssh" => Ok(CredentialKind::Ssh),
			"rsa" => Ok(CredentialKind::Rsa),
			"certificate" => Ok(CredentialKind::Certificate),
			other => Err(CredentialError::Internal(format!(
				"unknown credential kind '{other}'"
			))),
		}
	}
}

/// Non-secret certificate columns of a version row.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CertificateColumns {
	pub certificate: String,
	pub ca: Option<String>,
	pub ca_name: Option<String>,
	pub transitional: bool,
	pub certificate_authority: bool,
	pub self_signed: bool,
	pub generated: bool,
}

/// A single stored version of a credential.
///
/// The cryptographic payload is never mutated once written; new material
/// means a new row. Only `certificate.transitional` and the encryption
/// columns (during key rotation) change after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialVersion {
	pub uuid: Uuid,
	pub credential_uuid: Uuid,
	pub kind: CredentialKind,
	pub version_created_at: DateTime<Utc>,
	pub encryption_key_uuid: Uuid,
	pub encrypted_value: Vec<u8>,
	pub nonce: Vec<u8>,
	pub certificate: Option<CertificateColumns>,
}

impl CredentialVersion {
	pub fn is_certificate(&self) -> bool {
		self.kind == CredentialKind::Certificate && self.certificate.is_some()
	}

	pub fn is_transitional(&self) -> bool {
		self.certificate.as_ref().is_some_and(|c| c.transitional)
	}

	pub fn certificate_pem(&self) -> Option<&str> {
		self.certificate.as_ref().map(|c| c.certificate.as_str())
	}

	pub fn ca_name(&self) -> Option<&str> {
		self.certificate.as_ref().and_then(|c| c.ca_name.as_deref())
	}
}

/// Plaintext certificate value as handed to and returned from the core.
#[derive(Clone, Default)]
pub struct CertificateCredentialValue {
	pub ca: Option<String>,
	pub certificate: String,
	pub private_key: Option<Zeroizing<String>>,
	pub ca_name: Option<String>,
	pub certificate_authority: bool,
	pub self_signed: bool,
	pub generated: bool,
	pub transitional: bool,
}

impl fmt::Debug for CertificateCredentialValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CertificateCredentialValue")
			.field("ca", &self.ca)
			.field("certificate", &self.certificate)
			.field("private_key", &self.private_key.as_ref().map(|_| "[REDACTED]"))
			.field("ca_name", &self.ca_name)
			.field("certificate_authority", &self.certificate_authority)
			.field("self_signed", &self.self_signed)
			.field("generated", &self.generated)
			.field("transitional", &self.transitional)
			.finish()
	}
}

/// Plaintext value of any credential kind.
#[derive(Clone)]
pub enum CredentialValue {
	Value(Zeroizing<String>),
	Password(Zeroizing<String>),
	Json(serde_json::Value),
	User {
		username: String,
		password: Zeroizing<String>,
	},
	Ssh {
		public_key: String,
		private_key: Zeroizing<String>,
	},
	Rsa {
		public_key: String,
		private_key: Zeroizing<String>,
	},
	Certificate(CertificateCredentialValue),
}

impl CredentialValue {
	pub fn kind(&self) -> CredentialKind {
		match self {
			CredentialValue::Value(_) => CredentialKind::Value,
			CredentialValue::Password(_) => CredentialKind::Password,
			CredentialValue::Json(_) => CredentialKind::Json,
			CredentialValue::User { .. } => CredentialKind::User,
			CredentialValue::Ssh { .. } => CredentialKind::Ssh,
			CredentialValue::Rsa { .. } => CredentialKind::Rsa,
			CredentialValue::Certificate(_) => CredentialKind::Certificate,
		}
	}

	pub fn into_certificate(self) -> Option<CertificateCredentialValue> {
		match self {
			CredentialValue::Certificate(value) => Some(value),
			_ => None,
		}
	}
}

impl fmt::Debug for CredentialValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			CredentialValue::Certificate(value) => fmt::Debug::fmt(value, f),
			other => write!(f, "CredentialValue::{}([REDACTED])", other.kind()),
		}
	}
}

/// Normalize a credential name: ensure a leading `/` and reject malformed paths.
pub fn normalize_name(name: &str) -> Result<String> {
	let trimmed = name.trim();
	if trimmed.is_empty() || trimmed == "/" {
		return Err(CredentialError::InvalidName("name must not be empty".to_string()));
	}

	let normalized = if trimmed.starts_with('/') {
		trimmed.to_string()
	} else {
		format!("/{trimmed}")
	};

	if normalized.contains("//") {
		return Err(CredentialError::InvalidName(format!(
			"'{normalized}' must not contain '//'"
		)));
	}
	if normalized.ends_with('/') {
		return Err(CredentialError::InvalidName(format!(
			"'{normalized}' must not end with '/'"
		)));
	}

	Ok(normalized)
}
