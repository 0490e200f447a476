// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Builds version rows from plaintext values and back.
//!
//! The secret part of every value is JSON encoded and sealed under the active
//! encryption key. Certificate versions additionally carry their public
//! columns in the clear.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::certificate::{normalize_pem, CertificateParser};
use crate::error::{CredentialError, Result};
use crate::keys::EncryptionKeySet;
use crate::types::{
	normalize_name, CertificateColumns, CertificateCredentialValue, Credential, CredentialKind,
	CredentialValue, CredentialVersion,
};

pub struct CredentialFactory {
	keys: Arc<EncryptionKeySet>,
	parser: Arc<dyn CertificateParser>,
}

impl CredentialFactory {
	pub fn new(keys: Arc<EncryptionKeySet>, parser: Arc<dyn CertificateParser>) -> Self {
		Self { keys, parser }
	}

	pub fn keys(&self) -> &EncryptionKeySet {
		&self.keys
	}

	/// Build a new, unsaved version of `credential` holding `value`.
	pub fn make_new_credential_version(
		&self,
		credential: &Credential,
		value: &CredentialValue,
		created_at: DateTime<Utc>,
	) -> Result<CredentialVersion> {
		let payload = Zeroizing::new(serde_json::to_vec(&secret_payload(value))?);
		let active = self.keys.active();
		let sealed = active.encrypt(&payload)?;

		let certificate = match value {
			CredentialValue::Certificate(cert) => Some(self.certificate_columns(cert)?),
			_ => None,
		};

		Ok(CredentialVersion {
			uuid: Uuid::new_v4(),
			credential_uuid: credential.uuid,
			kind: value.kind(),
			version_created_at: created_at,
			encryption_key_uuid: active.uuid(),
			encrypted_value: sealed.ciphertext,
			nonce: sealed.nonce,
			certificate,
		})
	}

	/// Recover the plaintext value of a stored version.
	pub fn decrypt(&self, version: &CredentialVersion) -> Result<CredentialValue> {
		let plaintext = self.keys.decrypt(
			version.encryption_key_uuid,
			&version.encrypted_value,
			&version.nonce,
		)?;
		let payload: serde_json::Value = serde_json::from_slice(&plaintext)?;

		let value = match version.kind {
			CredentialKind::Value => CredentialValue::Value(secret_field(&payload, "value")?),
			CredentialKind::Password => {
				CredentialValue::Password(secret_field(&payload, "password")?)
			}
			CredentialKind::Json => CredentialValue::Json(
				payload
					.get("json")
					.cloned()
					.ok_or_else(|| missing_field("json"))?,
			),
			CredentialKind::User => CredentialValue::User {
				username: secret_field(&payload, "username")?.to_string(),
				password: secret_field(&payload, "password")?,
			},
			CredentialKind::Ssh => CredentialValue::Ssh {
				public_key: secret_field(&payload, "public_key")?.to_string(),
				private_key: secret_field(&payload, "private_key")?,
			},
			CredentialKind::Rsa => CredentialValue::Rsa {
				public_key: secret_field(&payload, "public_key")?.to_string(),
				private_key: secret_field(&payload, "private_key")?,
			},
			CredentialKind::Certificate => {
				let columns = version.certificate.as_ref().ok_or_else(|| {
					CredentialError::Internal(format!(
						"certificate version {} has no certificate columns",
						version.uuid
					))
				})?;
				let private_key = match payload.get("private_key") {
					Some(serde_json::Value::String(key)) => Some(Zeroizing::new(key.clone())),
					_ => None,
				};
				CredentialValue::Certificate(CertificateCredentialValue {
					ca: columns.ca.clone(),
					certificate: columns.certificate.clone(),
					private_key,
					ca_name: columns.ca_name.clone(),
					certificate_authority: columns.certificate_authority,
					self_signed: columns.self_signed,
					generated: columns.generated,
					transitional: columns.transitional,
				})
			}
		};

		Ok(value)
	}

	fn certificate_columns(&self, cert: &CertificateCredentialValue) -> Result<CertificateColumns> {
		let metadata = self.parser.parse(&cert.certificate)?;
		let ca_name = cert.ca_name.as_deref().map(normalize_name).transpose()?;
		let ca = cert
			.ca
			.as_deref()
			.filter(|ca| !ca.trim().is_empty())
			.map(normalize_pem);

		Ok(CertificateColumns {
			certificate: normalize_pem(&cert.certificate),
			ca,
			ca_name,
			transitional: cert.transitional,
			certificate_authority: metadata.is_ca,
			self_signed: metadata.is_self_signed,
			generated: cert.generated,
		})
	}
}

fn secret_payload(value: &CredentialValue) -> serde_json::Value {
	match value {
		CredentialValue::Value(v) => json!({ "value": v.as_str() }),
		CredentialValue::Password(p) => json!({ "password": p.as_str() }),
		CredentialValue::Json(j) => json!({ "json": j }),
		CredentialValue::User { username, password } => {
			json!({ "username": username, "password": password.as_str() })
		}
		CredentialValue::Ssh {
			public_key,
			private_key,
		}
		| CredentialValue::Rsa {
			public_key,
			private_key,
		} => json!({ "public_key": public_key, "private_key": private_key.as_str() }),
		CredentialValue::Certificate(cert) => match &cert.private_key {
			Some(key) => json!({ "private_key": key.as_str() }),
			None => json!({}),
		},
	}
}

fn secret_field(payload: &serde_json::Value, field: &str) -> Result<Zeroizing<String>> {
	payload
		.get(field)
		.and_then(|v| v.as_str())
		.map(|s| Zeroizing::new(s.to_string()))
		.ok_or_else(|| missing_field(field))
}

fn missing_field(field: &str) -> CredentialError {
	CredentialError::Decryption(format!("decrypted payload is missing '{field}'"))
}
