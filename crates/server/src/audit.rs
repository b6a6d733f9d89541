//! Audit trail recording.
//!
//! Audit writes must never fail the operation being audited: errors are
//! logged and swallowed.

use crate::entity::audit_log;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, DatabaseConnection};
use time::OffsetDateTime;

/// A single audit event to record.
#[derive(Debug, Default)]
pub struct AuditEvent {
    pub user_id: Option<String>,
    pub action: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub success: bool,
    pub error_message: Option<String>,
}

impl AuditEvent {
    pub fn success(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            success: true,
            ..Default::default()
        }
    }

    pub fn failure(action: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            success: false,
            error_message: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Record an audit event, logging (not propagating) any storage failure.
#[tracing::instrument(skip(db, event), fields(action = %event.action, success = event.success))]
pub async fn record(db: &DatabaseConnection, event: AuditEvent) {
    let row = audit_log::ActiveModel {
        id: Set(uuid::Uuid::new_v4().to_string()),
        user_id: Set(event.user_id),
        action: Set(event.action.clone()),
        ip_address: Set(event.ip_address),
        user_agent: Set(event.user_agent),
        metadata: Set(event.metadata.map(|m| m.to_string())),
        success: Set(event.success),
        error_message: Set(event.error_message),
        created_at: Set(OffsetDateTime::now_utc()),
    };

    if let Err(e) = row.insert(db).await {
        tracing::warn!(action = %event.action, "Failed to write audit log entry: {}", e);
    }
}
