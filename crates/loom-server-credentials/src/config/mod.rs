// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Layered configuration for the credential core.
//!
//! Precedence (highest to lowest):
//! 1. Environment variables (`LOOM_SERVER_CREDENTIALS_*`)
//! 2. Config file (`/etc/loom/credentials.toml`)
//! 3. Built-in defaults

pub mod error;
pub mod sources;

pub use error::ConfigError;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use serde::{Deserialize, Deserializer};
use std::fmt;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::encryption::KEY_SIZE;

pub const DEFAULT_DATABASE_URL: &str = "sqlite:./credentials.db";
pub const DEFAULT_KEY_ROTATION_BATCH_SIZE: u32 = 50;

/// One configured encryption key. `material` is 32 bytes, hex encoded.
#[derive(Clone, Deserialize)]
pub struct EncryptionKeyConfig {
	#[serde(deserialize_with = "deserialize_secret")]
	pub material: Zeroizing<String>,
	#[serde(default)]
	pub active: bool,
}

impl EncryptionKeyConfig {
	pub fn new(material: impl Into<String>, active: bool) -> Self {
		Self {
			material: Zeroizing::new(material.into()),
			active,
		}
	}

	pub fn decode(&self) -> Result<Zeroizing<[u8; KEY_SIZE]>, ConfigError> {
		let bytes = Zeroizing::new(hex::decode(self.material.trim()).map_err(|e| {
			ConfigError::InvalidValue {
				key: "encryption_keys.material".to_string(),
				message: format!("not valid hex: {e}"),
			}
		})?);

		if bytes.len() != KEY_SIZE {
			return Err(ConfigError::InvalidValue {
				key: "encryption_keys.material".to_string(),
				message: format!("expected {KEY_SIZE} bytes, got {}", bytes.len()),
			});
		}

		let mut key = Zeroizing::new([0u8; KEY_SIZE]);
		key.copy_from_slice(&bytes);
		Ok(key)
	}
}

impl fmt::Debug for EncryptionKeyConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("EncryptionKeyConfig")
			.field("material", &"[REDACTED]")
			.field("active", &self.active)
			.finish()
	}
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Zeroizing<String>, D::Error>
where
	D: Deserializer<'de>,
{
	String::deserialize(deserializer).map(Zeroizing::new)
}

/// Credential core configuration (runtime, fully resolved).
#[derive(Debug, Clone)]
pub struct CredentialsConfig {
	pub database_url: String,
	/// Child certificates carry active and transitional CA certificates.
	pub concatenate_cas: bool,
	pub encryption_keys: Vec<EncryptionKeyConfig>,
	pub key_rotation_batch_size: u32,
}

/// Credential core configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialsConfigLayer {
	#[serde(default)]
	pub database_url: Option<String>,
	#[serde(default)]
	pub concatenate_cas: Option<bool>,
	#[serde(default)]
	pub encryption_keys: Option<Vec<EncryptionKeyConfig>>,
	#[serde(default)]
	pub key_rotation_batch_size: Option<u32>,
}

impl CredentialsConfigLayer {
	pub fn merge(&mut self, other: CredentialsConfigLayer) {
		if other.database_url.is_some() {
			self.database_url = other.database_url;
		}
		if other.concatenate_cas.is_some() {
			self.concatenate_cas = other.concatenate_cas;
		}
		if other.encryption_keys.is_some() {
			self.encryption_keys = other.encryption_keys;
		}
		if other.key_rotation_batch_size.is_some() {
			self.key_rotation_batch_size = other.key_rotation_batch_size;
		}
	}

	pub fn finalize(self) -> Result<CredentialsConfig, ConfigError> {
		let config = CredentialsConfig {
			database_url: self
				.database_url
				.unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
			concatenate_cas: self.concatenate_cas.unwrap_or(false),
			encryption_keys: self.encryption_keys.unwrap_or_default(),
			key_rotation_batch_size: self
				.key_rotation_batch_size
				.unwrap_or(DEFAULT_KEY_ROTATION_BATCH_SIZE),
		};

		validate_config(&config)?;
		Ok(config)
	}
}

/// Load configuration from all sources with standard precedence.
pub fn load_config() -> Result<CredentialsConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<CredentialsConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

fn load_from_sources(
	mut sources: Vec<Box<dyn ConfigSource>>,
) -> Result<CredentialsConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = CredentialsConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	let config = merged.finalize()?;
	info!(
		database = %config.database_url,
		concatenate_cas = config.concatenate_cas,
		encryption_keys = config.encryption_keys.len(),
		"Credentials configuration loaded"
	);
	Ok(config)
}

fn validate_config(config: &CredentialsConfig) -> Result<(), ConfigError> {
	if config.encryption_keys.is_empty() {
		return Err(ConfigError::Validation(
			"at least one encryption key must be configured".to_string(),
		));
	}

	let active = config.encryption_keys.iter().filter(|k| k.active).count();
	if active != 1 {
		return Err(ConfigError::Validation(format!(
			"exactly one encryption key must be active, found {active}"
		)));
	}

	for key in &config.encryption_keys {
		key.decode()?;
	}

	if config.key_rotation_batch_size == 0 {
		return Err(ConfigError::Validation(
			"key_rotation_batch_size must be greater than zero".to_string(),
		));
	}

	Ok(())
}
