// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: environment variables and TOML files.

use std::path::PathBuf;

use tracing::{debug, trace};
use zeroize::Zeroizing;

use super::error::ConfigError;
use super::{CredentialsConfigLayer, EncryptionKeyConfig};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<CredentialsConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<CredentialsConfigLayer, ConfigError> {
		Ok(CredentialsConfigLayer::default())
	}
}

/// TOML file configuration source.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/loom/credentials.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<CredentialsConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(CredentialsConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: CredentialsConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed credentials config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// `LOOM_SERVER_CREDENTIALS_ACTIVE_KEY` and
/// `LOOM_SERVER_CREDENTIALS_LEGACY_KEYS` (comma separated) replace the key
/// list from lower layers when either is set. Both accept a `*_FILE` variant.
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<CredentialsConfigLayer, ConfigError> {
		debug!("loading environment variables");
		let active = env_secret("LOOM_SERVER_CREDENTIALS_ACTIVE_KEY")?;
		let legacy = env_secret("LOOM_SERVER_CREDENTIALS_LEGACY_KEYS")?;

		let encryption_keys = if active.is_some() || legacy.is_some() {
			let mut keys = Vec::new();
			if let Some(material) = active {
				keys.push(EncryptionKeyConfig {
					material,
					active: true,
				});
			}
			if let Some(list) = legacy {
				keys.extend(
					list
						.split(',')
						.map(str::trim)
						.filter(|s| !s.is_empty())
						.map(|s| EncryptionKeyConfig::new(s, false)),
				);
			}
			Some(keys)
		} else {
			None
		};

		Ok(CredentialsConfigLayer {
			database_url: env_var("LOOM_SERVER_CREDENTIALS_DATABASE_URL"),
			concatenate_cas: env_bool("LOOM_SERVER_CREDENTIALS_CONCATENATE_CAS"),
			encryption_keys,
			key_rotation_batch_size: env_u32("LOOM_SERVER_CREDENTIALS_KEY_ROTATION_BATCH_SIZE")?,
		})
	}
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_bool(name: &str) -> Option<bool> {
	env_var(name).map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

fn env_u32(name: &str) -> Result<Option<u32>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid u32 value '{v}'"),
		}),
		None => Ok(None),
	}
}

/// Read `NAME`, or the contents of the file named by `NAME_FILE`.
fn env_secret(name: &str) -> Result<Option<Zeroizing<String>>, ConfigError> {
	if let Some(value) = env_var(name) {
		return Ok(Some(Zeroizing::new(value)));
	}

	let file_var = format!("{name}_FILE");
	match env_var(&file_var) {
		Some(path) => {
			let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileRead {
				path: PathBuf::from(&path),
				source: e,
			})?;
			Ok(Some(Zeroizing::new(content.trim().to_string())))
		}
		None => Ok(None),
	}
}
