// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Credential versioning and encryption key rotation for Loom.
//!
//! This crate holds the versioned credential history, the encryption keys that
//! seal it, and the certificate authority rotation logic built on top.
//!
//! # Architecture
//!
//! - `store` / `sqlite` - Transactional storage of credentials, versions and key canaries
//! - `keys` / `canary` / `detector` / `key_rotator` - Encryption key lifecycle
//! - `factory` - Plaintext values to encrypted version rows and back
//! - `version_store` / `authority` - Active and transitional certificate views
//! - `rotation` - Certificate saves and CA transitional rotation
//! - `config` - Layered configuration
//!
//! # Example
//!
//! ```ignore
//! use loom_server_credentials::*;
//!
//! let config = load_config()?;
//! let store = Arc::new(SqliteCredentialStore::new(create_pool(&config.database_url).await?));
//! migrate(store.pool()).await?;
//!
//! let keys = Arc::new(EncryptionKeyCanaryMapper::map_keys(store.as_ref(), &config.encryption_keys).await?);
//! DecryptableDataDetector::run(store.as_ref(), &keys).await?;
//!
//! let parser: Arc<dyn CertificateParser> = Arc::new(X509CertificateParser);
//! let coordinator = CertificateRotationCoordinator::new(
//!     store.clone(),
//!     Arc::new(CredentialFactory::new(keys, parser.clone())),
//!     parser,
//!     Arc::new(MonotonicClock::new()),
//!     Arc::new(TracingAuditRecorder),
//!     config.concatenate_cas,
//! );
//! let versions = coordinator.update_transitional_version(ca_uuid, Some(version_uuid)).await?;
//! ```

pub mod audit;
pub mod authority;
pub mod canary;
pub mod certificate;
pub mod clock;
pub mod config;
pub mod detector;
pub mod encryption;
pub mod error;
pub mod factory;
pub mod key_rotator;
pub mod keys;
pub mod rotation;
pub mod sqlite;
pub mod store;
pub mod types;
pub mod version_store;

pub use audit::{AuditEvent, AuditOperation, AuditRecorder, NoopAuditRecorder, TracingAuditRecorder};
pub use authority::CertificateAuthorityResolver;
pub use canary::{EncryptionKeyCanary, EncryptionKeyCanaryMapper};
pub use certificate::{
	concatenate_certificates, count_certificate_blocks, CertificateMetadata, CertificateParser,
	X509CertificateParser,
};
pub use clock::{MonotonicClock, TimeProvider};
pub use config::{load_config, load_config_with_file, CredentialsConfig, EncryptionKeyConfig};
pub use detector::DecryptableDataDetector;
pub use error::{CredentialError, ErrorKind, Result};
pub use factory::CredentialFactory;
pub use key_rotator::{EncryptionKeyRotator, RotationReport};
pub use keys::{EncryptionKey, EncryptionKeySet};
pub use rotation::CertificateRotationCoordinator;
pub use sqlite::{create_pool, migrate, SqliteCredentialStore};
pub use store::{CredentialStore, CredentialTransaction};
pub use types::{
	normalize_name, CertificateCredentialValue, Credential, CredentialKind, CredentialValue,
	CredentialVersion,
};
pub use version_store::CertificateVersionStore;
