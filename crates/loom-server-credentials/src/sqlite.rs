// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SQLite-backed credential store.
//!
//! Credential names are compared under `COLLATE NOCASE`, which folds ASCII
//! only. Timestamps are written as fixed-width RFC 3339 strings so that
//! lexical order matches chronological order.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{
	SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
	SqliteSynchronous,
};
use sqlx::{QueryBuilder, Row, Sqlite, Transaction};
use std::str::FromStr;
use uuid::Uuid;

use crate::canary::EncryptionKeyCanary;
use crate::encryption::EncryptedValue;
use crate::error::{CredentialError, Result};
use crate::store::{CredentialStore, CredentialTransaction};
use crate::types::{CertificateColumns, Credential, CredentialKind, CredentialVersion};

macro_rules! version_columns {
	() => {
		"v.uuid, v.credential_uuid, v.kind, v.version_created_at, v.encryption_key_uuid, \
		 v.encrypted_value, v.nonce, v.certificate, v.ca, v.ca_name, v.transitional, \
		 v.certificate_authority, v.self_signed, v.generated"
	};
}

const ORDER_MOST_RECENT: &str = "ORDER BY v.version_created_at DESC, v.uuid DESC";

/// Create a SqlitePool with WAL mode and common settings.
#[tracing::instrument(skip(database_url))]
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
	let options = SqliteConnectOptions::from_str(database_url)
		.map_err(|e| CredentialError::Internal(format!("Invalid database URL: {e}")))?
		.journal_mode(SqliteJournalMode::Wal)
		.synchronous(SqliteSynchronous::Normal)
		.foreign_keys(true)
		.create_if_missing(true);

	let pool = SqlitePool::connect_with(options).await?;

	tracing::debug!("database pool created");
	Ok(pool)
}

/// Create the credential tables if they do not exist.
#[tracing::instrument(skip(pool))]
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
	let statements = [
		r#"
		CREATE TABLE IF NOT EXISTS credentials (
			uuid TEXT PRIMARY KEY NOT NULL,
			name TEXT NOT NULL COLLATE NOCASE UNIQUE,
			created_at TEXT NOT NULL
		)
		"#,
		r#"
		CREATE TABLE IF NOT EXISTS credential_versions (
			uuid TEXT PRIMARY KEY NOT NULL,
			credential_uuid TEXT NOT NULL REFERENCES credentials(uuid) ON DELETE CASCADE,
			kind TEXT NOT NULL,
			version_created_at TEXT NOT NULL,
			encryption_key_uuid TEXT NOT NULL,
			encrypted_value BLOB NOT NULL,
			nonce BLOB NOT NULL,
			certificate TEXT,
			ca TEXT,
			ca_name TEXT COLLATE NOCASE,
			transitional INTEGER NOT NULL DEFAULT 0,
			certificate_authority INTEGER NOT NULL DEFAULT 0,
			self_signed INTEGER NOT NULL DEFAULT 0,
			generated INTEGER NOT NULL DEFAULT 0
		)
		"#,
		"CREATE INDEX IF NOT EXISTS idx_credential_versions_credential \
		 ON credential_versions(credential_uuid, version_created_at)",
		"CREATE INDEX IF NOT EXISTS idx_credential_versions_ca_name ON credential_versions(ca_name)",
		"CREATE INDEX IF NOT EXISTS idx_credential_versions_key ON credential_versions(encryption_key_uuid)",
		r#"
		CREATE TABLE IF NOT EXISTS encryption_key_canaries (
			uuid TEXT PRIMARY KEY NOT NULL,
			encrypted_value BLOB NOT NULL,
			nonce BLOB NOT NULL
		)
		"#,
	];

	for statement in statements {
		sqlx::query(statement).execute(pool).await?;
	}

	tracing::debug!("credential schema migrated");
	Ok(())
}

/// Credential store over a SQLite pool.
#[derive(Clone)]
pub struct SqliteCredentialStore {
	pool: SqlitePool,
}

impl SqliteCredentialStore {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Single-connection in-memory store with the schema applied.
	pub async fn in_memory() -> Result<Self> {
		let pool = SqlitePoolOptions::new()
			.max_connections(1)
			.idle_timeout(None)
			.max_lifetime(None)
			.connect(":memory:")
			.await?;
		migrate(&pool).await?;
		Ok(Self::new(pool))
	}

	pub fn pool(&self) -> &SqlitePool {
		&self.pool
	}
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
	async fn begin(&self) -> Result<Box<dyn CredentialTransaction>> {
		let tx = self.pool.begin().await?;
		Ok(Box::new(SqliteCredentialTransaction { tx }))
	}
}

pub struct SqliteCredentialTransaction {
	tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl CredentialTransaction for SqliteCredentialTransaction {
	async fn find_credential(&mut self, name: &str) -> Result<Option<Credential>> {
		let row = sqlx::query("SELECT uuid, name FROM credentials WHERE name = ?")
			.bind(name)
			.fetch_optional(&mut *self.tx)
			.await?;

		row.map(|r| parse_credential_row(&r)).transpose()
	}

	async fn find_credential_by_uuid(&mut self, uuid: Uuid) -> Result<Option<Credential>> {
		let row = sqlx::query("SELECT uuid, name FROM credentials WHERE uuid = ?")
			.bind(uuid.to_string())
			.fetch_optional(&mut *self.tx)
			.await?;

		row.map(|r| parse_credential_row(&r)).transpose()
	}

	#[tracing::instrument(skip(self))]
	async fn find_or_create_credential(&mut self, name: &str) -> Result<Credential> {
		if let Some(existing) = self.find_credential(name).await? {
			return Ok(existing);
		}

		let credential = Credential {
			uuid: Uuid::new_v4(),
			name: name.to_string(),
		};
		sqlx::query("INSERT INTO credentials (uuid, name, created_at) VALUES (?, ?, ?)")
			.bind(credential.uuid.to_string())
			.bind(&credential.name)
			.bind(format_timestamp(Utc::now()))
			.execute(&mut *self.tx)
			.await?;

		tracing::debug!(credential_uuid = %credential.uuid, "credential created");
		Ok(credential)
	}

	#[tracing::instrument(skip(self))]
	async fn delete_credential(&mut self, name: &str) -> Result<bool> {
		let Some(credential) = self.find_credential(name).await? else {
			return Ok(false);
		};

		sqlx::query("DELETE FROM credential_versions WHERE credential_uuid = ?")
			.bind(credential.uuid.to_string())
			.execute(&mut *self.tx)
			.await?;
		let result = sqlx::query("DELETE FROM credentials WHERE uuid = ?")
			.bind(credential.uuid.to_string())
			.execute(&mut *self.tx)
			.await?;

		Ok(result.rows_affected() > 0)
	}

	#[tracing::instrument(skip(self, version), fields(version_uuid = %version.uuid, kind = %version.kind))]
	async fn save_version(&mut self, version: &CredentialVersion) -> Result<()> {
		let cert = version.certificate.as_ref();
		sqlx::query(
			r#"
			INSERT INTO credential_versions (
				uuid, credential_uuid, kind, version_created_at, encryption_key_uuid,
				encrypted_value, nonce, certificate, ca, ca_name, transitional,
				certificate_authority, self_signed, generated
			) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(version.uuid.to_string())
		.bind(version.credential_uuid.to_string())
		.bind(version.kind.as_str())
		.bind(format_timestamp(version.version_created_at))
		.bind(version.encryption_key_uuid.to_string())
		.bind(version.encrypted_value.as_slice())
		.bind(version.nonce.as_slice())
		.bind(cert.map(|c| c.certificate.as_str()))
		.bind(cert.and_then(|c| c.ca.as_deref()))
		.bind(cert.and_then(|c| c.ca_name.as_deref()))
		.bind(cert.is_some_and(|c| c.transitional))
		.bind(cert.is_some_and(|c| c.certificate_authority))
		.bind(cert.is_some_and(|c| c.self_signed))
		.bind(cert.is_some_and(|c| c.generated))
		.execute(&mut *self.tx)
		.await?;

		tracing::debug!("credential version saved");
		Ok(())
	}

	async fn find_version(&mut self, uuid: Uuid) -> Result<Option<CredentialVersion>> {
		let row = sqlx::query(concat!(
			"SELECT ",
			version_columns!(),
			" FROM credential_versions v WHERE v.uuid = ?"
		))
		.bind(uuid.to_string())
		.fetch_optional(&mut *self.tx)
		.await?;

		row.map(|r| parse_version_row(&r)).transpose()
	}

	async fn delete_version(&mut self, uuid: Uuid) -> Result<bool> {
		let result = sqlx::query("DELETE FROM credential_versions WHERE uuid = ?")
			.bind(uuid.to_string())
			.execute(&mut *self.tx)
			.await?;
		Ok(result.rows_affected() > 0)
	}

	async fn set_transitional(&mut self, version_uuid: Uuid, transitional: bool) -> Result<()> {
		sqlx::query("UPDATE credential_versions SET transitional = ? WHERE uuid = ?")
			.bind(transitional)
			.bind(version_uuid.to_string())
			.execute(&mut *self.tx)
			.await?;
		Ok(())
	}

	async fn find_most_recent(&mut self, name: &str) -> Result<Option<CredentialVersion>> {
		Ok(self.find_all_by_name(name).await?.into_iter().next())
	}

	async fn find_all_by_name(&mut self, name: &str) -> Result<Vec<CredentialVersion>> {
		let sql = format!(
			"SELECT {} FROM credential_versions v \
			 JOIN credentials c ON c.uuid = v.credential_uuid \
			 WHERE c.name = ? {ORDER_MOST_RECENT}",
			version_columns!()
		);
		let rows = sqlx::query(&sql)
			.bind(name)
			.fetch_all(&mut *self.tx)
			.await?;

		rows.iter().map(parse_version_row).collect()
	}

	async fn find_all_by_credential_uuid(
		&mut self,
		credential_uuid: Uuid,
	) -> Result<Vec<CredentialVersion>> {
		let sql = format!(
			"SELECT {} FROM credential_versions v WHERE v.credential_uuid = ? {ORDER_MOST_RECENT}",
			version_columns!()
		);
		let rows = sqlx::query(&sql)
			.bind(credential_uuid.to_string())
			.fetch_all(&mut *self.tx)
			.await?;

		rows.iter().map(parse_version_row).collect()
	}

	async fn find_latest_non_transitional(
		&mut self,
		credential_uuid: Uuid,
	) -> Result<Option<CredentialVersion>> {
		let sql = format!(
			"SELECT {} FROM credential_versions v \
			 WHERE v.credential_uuid = ? AND v.transitional = 0 {ORDER_MOST_RECENT} LIMIT 1",
			version_columns!()
		);
		let row = sqlx::query(&sql)
			.bind(credential_uuid.to_string())
			.fetch_optional(&mut *self.tx)
			.await?;

		row.map(|r| parse_version_row(&r)).transpose()
	}

	async fn find_transitional(
		&mut self,
		credential_uuid: Uuid,
	) -> Result<Option<CredentialVersion>> {
		let sql = format!(
			"SELECT {} FROM credential_versions v \
			 WHERE v.credential_uuid = ? AND v.transitional = 1 {ORDER_MOST_RECENT} LIMIT 1",
			version_columns!()
		);
		let row = sqlx::query(&sql)
			.bind(credential_uuid.to_string())
			.fetch_optional(&mut *self.tx)
			.await?;

		row.map(|r| parse_version_row(&r)).transpose()
	}

	async fn find_all_certificate_credentials_by_ca_name(
		&mut self,
		ca_name: &str,
	) -> Result<Vec<String>> {
		let rows = sqlx::query(
			r#"
			SELECT c.name AS name
			FROM credentials c
			JOIN credential_versions v ON v.credential_uuid = c.uuid
			WHERE v.kind = 'certificate'
			  AND v.ca_name = ?1
			  AND c.name <> ?1
			  AND v.uuid = (
				SELECT latest.uuid FROM credential_versions latest
				WHERE latest.credential_uuid = c.uuid
				ORDER BY latest.version_created_at DESC, latest.uuid DESC
				LIMIT 1
			  )
			ORDER BY c.name
			"#,
		)
		.bind(ca_name)
		.fetch_all(&mut *self.tx)
		.await?;

		Ok(rows.iter().map(|r| r.get::<String, _>("name")).collect())
	}

	async fn count_encrypted(&mut self) -> Result<i64> {
		let row = sqlx::query("SELECT COUNT(*) AS count FROM credential_versions")
			.fetch_one(&mut *self.tx)
			.await?;
		Ok(row.get("count"))
	}

	async fn count_encrypted_with_keys(&mut self, key_uuids: &[Uuid]) -> Result<i64> {
		if key_uuids.is_empty() {
			return Ok(0);
		}

		let mut qb = QueryBuilder::<Sqlite>::new(
			"SELECT COUNT(*) AS count FROM credential_versions WHERE encryption_key_uuid IN (",
		);
		let mut separated = qb.separated(", ");
		for id in key_uuids {
			separated.push_bind(id.to_string());
		}
		separated.push_unseparated(")");

		let row = qb.build().fetch_one(&mut *self.tx).await?;
		Ok(row.get("count"))
	}

	async fn find_encrypted_with_keys(
		&mut self,
		key_uuids: &[Uuid],
		after: Option<(DateTime<Utc>, Uuid)>,
		limit: i64,
	) -> Result<Vec<CredentialVersion>> {
		if key_uuids.is_empty() {
			return Ok(Vec::new());
		}

		let mut qb = QueryBuilder::<Sqlite>::new(concat!(
			"SELECT ",
			version_columns!(),
			" FROM credential_versions v WHERE v.encryption_key_uuid IN ("
		));
		let mut separated = qb.separated(", ");
		for id in key_uuids {
			separated.push_bind(id.to_string());
		}
		separated.push_unseparated(")");

		if let Some((created_at, uuid)) = after {
			qb.push(" AND (v.version_created_at, v.uuid) > (");
			qb.push_bind(format_timestamp(created_at));
			qb.push(", ");
			qb.push_bind(uuid.to_string());
			qb.push(")");
		}
		qb.push(" ORDER BY v.version_created_at ASC, v.uuid ASC LIMIT ");
		qb.push_bind(limit);

		let rows = qb.build().fetch_all(&mut *self.tx).await?;
		rows.iter().map(parse_version_row).collect()
	}

	async fn update_encryption(
		&mut self,
		version_uuid: Uuid,
		key_uuid: Uuid,
		encrypted: &EncryptedValue,
	) -> Result<()> {
		sqlx::query(
			"UPDATE credential_versions SET encryption_key_uuid = ?, encrypted_value = ?, nonce = ? \
			 WHERE uuid = ?",
		)
		.bind(key_uuid.to_string())
		.bind(encrypted.ciphertext.as_slice())
		.bind(encrypted.nonce.as_slice())
		.bind(version_uuid.to_string())
		.execute(&mut *self.tx)
		.await?;
		Ok(())
	}

	async fn find_canaries(&mut self) -> Result<Vec<EncryptionKeyCanary>> {
		let rows = sqlx::query("SELECT uuid, encrypted_value, nonce FROM encryption_key_canaries")
			.fetch_all(&mut *self.tx)
			.await?;

		rows
			.iter()
			.map(|row| {
				let uuid: String = row.get("uuid");
				Ok(EncryptionKeyCanary {
					uuid: parse_uuid(&uuid, "canary uuid")?,
					encrypted_value: row.get("encrypted_value"),
					nonce: row.get("nonce"),
				})
			})
			.collect()
	}

	async fn save_canary(&mut self, canary: &EncryptionKeyCanary) -> Result<()> {
		sqlx::query("INSERT INTO encryption_key_canaries (uuid, encrypted_value, nonce) VALUES (?, ?, ?)")
			.bind(canary.uuid.to_string())
			.bind(canary.encrypted_value.as_slice())
			.bind(canary.nonce.as_slice())
			.execute(&mut *self.tx)
			.await?;
		Ok(())
	}

	async fn commit(self: Box<Self>) -> Result<()> {
		self.tx.commit().await?;
		Ok(())
	}
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
	ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_uuid(value: &str, field: &str) -> Result<Uuid> {
	Uuid::parse_str(value).map_err(|e| CredentialError::Internal(format!("Invalid {field}: {e}")))
}

fn parse_credential_row(row: &SqliteRow) -> Result<Credential> {
	let uuid: String = row.get("uuid");
	Ok(Credential {
		uuid: parse_uuid(&uuid, "credential uuid")?,
		name: row.get("name"),
	})
}

fn parse_version_row(row: &SqliteRow) -> Result<CredentialVersion> {
	let uuid: String = row.get("uuid");
	let credential_uuid: String = row.get("credential_uuid");
	let kind: String = row.get("kind");
	let created_at: String = row.get("version_created_at");
	let key_uuid: String = row.get("encryption_key_uuid");
	let kind = CredentialKind::from_str(&kind)?;

	let version_created_at = DateTime::parse_from_rfc3339(&created_at)
		.map_err(|e| CredentialError::Internal(format!("Invalid version_created_at: {e}")))?
		.with_timezone(&Utc);

	let certificate = match kind {
		CredentialKind::Certificate => Some(CertificateColumns {
			certificate: row.get::<Option<String>, _>("certificate").unwrap_or_default(),
			ca: row.get("ca"),
			ca_name: row.get("ca_name"),
			transitional: row.get("transitional"),
			certificate_authority: row.get("certificate_authority"),
			self_signed: row.get("self_signed"),
			generated: row.get("generated"),
		}),
		_ => None,
	};

	Ok(CredentialVersion {
		uuid: parse_uuid(&uuid, "version uuid")?,
		credential_uuid: parse_uuid(&credential_uuid, "credential uuid")?,
		kind,
		version_created_at,
		encryption_key_uuid: parse_uuid(&key_uuid, "encryption key uuid")?,
		encrypted_value: row.get("encrypted_value"),
		nonce: row.get("nonce"),
		certificate,
	})
}
