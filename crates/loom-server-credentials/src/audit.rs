// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditOperation {
	CredentialSave,
	CredentialDelete,
	VersionDelete,
	TransitionalUpdate,
	ChildRegenerate,
}

impl fmt::Display for AuditOperation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			AuditOperation::CredentialSave => "credential_save",
			AuditOperation::CredentialDelete => "credential_delete",
			AuditOperation::VersionDelete => "version_delete",
			AuditOperation::TransitionalUpdate => "transitional_update",
			AuditOperation::ChildRegenerate => "child_regenerate",
		};
		f.write_str(s)
	}
}

/// A resource touched by a committed operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
	pub operation: AuditOperation,
	pub resource_name: String,
	pub resource_uuid: Uuid,
	pub version_uuid: Option<Uuid>,
}

impl AuditEvent {
	pub fn new(
		operation: AuditOperation,
		resource_name: impl Into<String>,
		resource_uuid: Uuid,
		version_uuid: Option<Uuid>,
	) -> Self {
		Self {
			operation,
			resource_name: resource_name.into(),
			resource_uuid,
			version_uuid,
		}
	}
}

/// Receives audit events. Fire-and-forget: recording never fails the caller.
pub trait AuditRecorder: Send + Sync {
	fn record(&self, event: AuditEvent);
}

/// Emits one structured log line per event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditRecorder;

impl AuditRecorder for TracingAuditRecorder {
	fn record(&self, event: AuditEvent) {
		tracing::info!(
			target: "audit",
			operation = %event.operation,
			resource_name = %event.resource_name,
			resource_uuid = %event.resource_uuid,
			version_uuid = ?event.version_uuid,
			"credential audit event"
		);
	}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditRecorder;

impl AuditRecorder for NoopAuditRecorder {
	fn record(&self, _event: AuditEvent) {}
}
