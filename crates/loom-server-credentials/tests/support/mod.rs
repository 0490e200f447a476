// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use loom_server_credentials::encryption::generate_key;
use loom_server_credentials::{
	AuditEvent, AuditOperation, AuditRecorder, CertificateCredentialValue, CertificateParser,
	CertificateRotationCoordinator, CredentialFactory, CredentialStore, CredentialVersion,
	EncryptionKey, EncryptionKeySet, MonotonicClock, SqliteCredentialStore, X509CertificateParser,
};
use rcgen::{BasicConstraints, Certificate, CertificateParams, DnType, IsCa, KeyPair};
use uuid::Uuid;
use zeroize::Zeroizing;

pub struct TestCa {
	pub certificate: String,
	pub private_key: String,
	cert: Certificate,
	key: KeyPair,
}

pub fn generate_ca(common_name: &str) -> TestCa {
	let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
	params.distinguished_name.push(DnType::CommonName, common_name);
	params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);

	let key = KeyPair::generate().unwrap();
	let cert = params.self_signed(&key).unwrap();
	TestCa {
		certificate: cert.pem(),
		private_key: key.serialize_pem(),
		cert,
		key,
	}
}

/// Intermediate CA signed by `root`.
pub fn generate_intermediate(root: &TestCa, common_name: &str) -> TestCa {
	let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
	params.distinguished_name.push(DnType::CommonName, common_name);
	params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);

	let key = KeyPair::generate().unwrap();
	let cert = params.signed_by(&key, &root.cert, &root.key).unwrap();
	TestCa {
		certificate: cert.pem(),
		private_key: key.serialize_pem(),
		cert,
		key,
	}
}

/// Leaf certificate signed by `ca`. Returns (certificate PEM, private key PEM).
pub fn generate_leaf(ca: &TestCa, common_name: &str) -> (String, String) {
	let mut params = CertificateParams::new(vec![format!("{common_name}.example.com")]).unwrap();
	params.distinguished_name.push(DnType::CommonName, common_name);

	let key = KeyPair::generate().unwrap();
	let cert = params.signed_by(&key, &ca.cert, &ca.key).unwrap();
	(cert.pem(), key.serialize_pem())
}

pub fn ca_value(ca: &TestCa, transitional: bool) -> CertificateCredentialValue {
	CertificateCredentialValue {
		certificate: ca.certificate.clone(),
		private_key: Some(Zeroizing::new(ca.private_key.clone())),
		transitional,
		..Default::default()
	}
}

/// CA value signed by the credential `ca_name`.
pub fn intermediate_value(
	ca: &TestCa,
	ca_name: &str,
	transitional: bool,
) -> CertificateCredentialValue {
	CertificateCredentialValue {
		ca_name: Some(ca_name.to_string()),
		..ca_value(ca, transitional)
	}
}

pub fn leaf_value(ca: &TestCa, common_name: &str, ca_name: &str) -> CertificateCredentialValue {
	let (certificate, private_key) = generate_leaf(ca, common_name);
	CertificateCredentialValue {
		certificate,
		private_key: Some(Zeroizing::new(private_key)),
		ca_name: Some(ca_name.to_string()),
		..Default::default()
	}
}

#[derive(Default)]
pub struct RecordingAuditRecorder {
	events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAuditRecorder {
	pub fn events(&self) -> Vec<AuditEvent> {
		self.events.lock().unwrap().clone()
	}

	pub fn count(&self, operation: AuditOperation) -> usize {
		self.events
			.lock()
			.unwrap()
			.iter()
			.filter(|e| e.operation == operation)
			.count()
	}
}

impl AuditRecorder for RecordingAuditRecorder {
	fn record(&self, event: AuditEvent) {
		self.events.lock().unwrap().push(event);
	}
}

pub struct Harness {
	pub store: SqliteCredentialStore,
	pub keys: Arc<EncryptionKeySet>,
	pub factory: Arc<CredentialFactory>,
	pub audit: Arc<RecordingAuditRecorder>,
	pub coordinator: CertificateRotationCoordinator,
}

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();
}

impl Harness {
	pub async fn new(concatenate_cas: bool) -> Self {
		init_tracing();
		let store = SqliteCredentialStore::in_memory().await.unwrap();
		let keys = Arc::new(
			EncryptionKeySet::new(vec![EncryptionKey::new(Uuid::new_v4(), true, generate_key())])
				.unwrap(),
		);
		let parser: Arc<dyn CertificateParser> = Arc::new(X509CertificateParser);
		let factory = Arc::new(CredentialFactory::new(keys.clone(), parser.clone()));
		let audit = Arc::new(RecordingAuditRecorder::default());

		let coordinator = CertificateRotationCoordinator::new(
			Arc::new(store.clone()),
			factory.clone(),
			parser,
			Arc::new(MonotonicClock::new()),
			audit.clone(),
			concatenate_cas,
		);

		Self {
			store,
			keys,
			factory,
			audit,
			coordinator,
		}
	}

	/// Every version of `name`, most recent first.
	pub async fn history(&self, name: &str) -> Vec<CredentialVersion> {
		let mut tx = self.store.begin().await.unwrap();
		tx.find_all_by_name(name).await.unwrap()
	}

	pub async fn most_recent(&self, name: &str) -> CredentialVersion {
		let mut tx = self.store.begin().await.unwrap();
		tx.find_most_recent(name).await.unwrap().unwrap()
	}

	/// The `ca` column of the most recent version of `name`.
	pub async fn ca_of(&self, name: &str) -> String {
		self
			.most_recent(name)
			.await
			.certificate
			.and_then(|c| c.ca)
			.unwrap_or_default()
	}
}
