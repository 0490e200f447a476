// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! X.509 parsing and PEM chain handling.

use x509_parser::pem::parse_x509_pem;
use x509_parser::public_key::PublicKey;

use crate::error::{CredentialError, Result};

const BEGIN_CERTIFICATE: &str = "-----BEGIN CERTIFICATE-----";
const END_CERTIFICATE: &str = "-----END CERTIFICATE-----";
const SECONDS_PER_DAY: i64 = 86_400;

/// Facts extracted from a certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateMetadata {
	pub is_ca: bool,
	pub is_self_signed: bool,
	/// Public key size in bits, when the algorithm reports one.
	pub key_length: Option<usize>,
	pub subject_name: String,
	pub duration_days: i64,
}

pub trait CertificateParser: Send + Sync {
	/// Parse the first certificate in `pem`. Fails with
	/// [`CredentialError::InvalidCertificate`] on malformed input.
	fn parse(&self, pem: &str) -> Result<CertificateMetadata>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct X509CertificateParser;

impl CertificateParser for X509CertificateParser {
	fn parse(&self, pem: &str) -> Result<CertificateMetadata> {
		let (_, block) = parse_x509_pem(pem.trim().as_bytes())
			.map_err(|e| CredentialError::InvalidCertificate(format!("invalid PEM: {e}")))?;
		if block.label != "CERTIFICATE" {
			return Err(CredentialError::InvalidCertificate(format!(
				"unexpected PEM label '{}'",
				block.label
			)));
		}

		let cert = block
			.parse_x509()
			.map_err(|e| CredentialError::InvalidCertificate(format!("invalid X.509: {e}")))?;

		let same_name = cert.subject().as_raw() == cert.issuer().as_raw();
		let is_self_signed = same_name && cert.verify_signature(None).is_ok();

		let key_length = match cert.public_key().parsed() {
			Ok(PublicKey::RSA(rsa)) => Some(rsa.key_size()),
			Ok(PublicKey::EC(ec)) => Some(ec.key_size()),
			_ => None,
		};

		let validity = cert.validity();
		let duration_days =
			(validity.not_after.timestamp() - validity.not_before.timestamp()) / SECONDS_PER_DAY;

		Ok(CertificateMetadata {
			is_ca: cert.is_ca(),
			is_self_signed,
			key_length,
			subject_name: cert.subject().to_string(),
			duration_days,
		})
	}
}

/// Split text into normalized certificate PEM blocks.
///
/// Lines are trimmed and blank lines dropped, so the same certificate
/// always yields the same block regardless of line endings.
pub fn split_pem_blocks(text: &str) -> Vec<String> {
	let mut blocks = Vec::new();
	let mut current: Option<Vec<&str>> = None;

	for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
		if line == BEGIN_CERTIFICATE {
			current = Some(vec![line]);
		} else if let Some(lines) = current.as_mut() {
			lines.push(line);
			if line == END_CERTIFICATE {
				if let Some(done) = current.take() {
					blocks.push(done.join("\n"));
				}
			}
		}
	}

	blocks
}

/// Join certificates into one chain, keeping each distinct block once, in
/// first-seen order.
pub fn concatenate_certificates<'a>(pems: impl IntoIterator<Item = &'a str>) -> String {
	let mut seen: Vec<String> = Vec::new();
	for pem in pems {
		for block in split_pem_blocks(pem) {
			if !seen.contains(&block) {
				seen.push(block);
			}
		}
	}

	seen.iter().map(|b| format!("{b}\n")).collect()
}

/// Canonical form of a PEM string containing one or more certificates.
pub fn normalize_pem(pem: &str) -> String {
	concatenate_certificates([pem])
}

pub fn count_certificate_blocks(text: &str) -> usize {
	text.matches(BEGIN_CERTIFICATE).count()
}
