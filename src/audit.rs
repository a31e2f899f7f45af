use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{ContentRecord, User},
    session::Session,
};

/// Moderation actions that leave an audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Approve,
    ApproveOverride,
    Reject,
    Reopen,
    Edit,
    Delete,
    ChangeRole,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Approve => "approve",
            AuditAction::ApproveOverride => "approve_override",
            AuditAction::Reject => "reject",
            AuditAction::Reopen => "reopen",
            AuditAction::Edit => "edit",
            AuditAction::Delete => "delete",
            AuditAction::ChangeRole => "change_role",
        }
    }
}

/// AuditEntry
///
/// A stored row of the `audit_logs` table.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct AuditEntry {
    pub id: Uuid,
    pub action: String,
    pub performed_by: String,
    pub entity: String,
    pub entity_id: String,
    #[ts(type = "string")]
    pub timestamp: DateTime<Utc>,
    pub details: String,
}

/// NewAuditEntry
///
/// Input accepted by the audit sink. `timestamp` defaults to now.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct NewAuditEntry {
    pub action: String,
    pub performed_by: String,
    pub entity: String,
    pub entity_id: String,
    #[serde(default)]
    #[ts(type = "string | null")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub details: String,
}

impl NewAuditEntry {
    /// Entry for an action one session took on one content record.
    pub fn for_content(
        action: AuditAction,
        session: &Session,
        record: &ContentRecord,
        details: impl Into<String>,
    ) -> Self {
        Self {
            action: action.as_str().to_string(),
            performed_by: session.user_id().to_string(),
            entity: entity_name(record),
            entity_id: record.id.to_string(),
            timestamp: None,
            details: details.into(),
        }
    }

    /// Entry for a role change made on a profile.
    pub fn for_profile(
        action: AuditAction,
        session: &Session,
        profile: &User,
        details: impl Into<String>,
    ) -> Self {
        Self {
            action: action.as_str().to_string(),
            performed_by: session.user_id().to_string(),
            entity: "profile".to_string(),
            entity_id: profile.id.to_string(),
            timestamp: None,
            details: details.into(),
        }
    }

    /// Schema checks: `action` 3-100 chars, `performed_by` and `entity` at least 3,
    /// `entity_id` present, `details` at most 500.
    pub fn validate(&self) -> Result<(), AppError> {
        let action_len = self.action.trim().chars().count();
        if !(3..=100).contains(&action_len) {
            return Err(AppError::Validation(
                "audit action must be 3-100 characters".to_string(),
            ));
        }
        if self.performed_by.trim().chars().count() < 3 {
            return Err(AppError::Validation(
                "audit performed_by must be at least 3 characters".to_string(),
            ));
        }
        if self.entity.trim().chars().count() < 3 {
            return Err(AppError::Validation(
                "audit entity must be at least 3 characters".to_string(),
            ));
        }
        if self.entity_id.trim().is_empty() {
            return Err(AppError::Validation("audit entity_id is required".to_string()));
        }
        if self.details.chars().count() > 500 {
            return Err(AppError::Validation(
                "audit details must be at most 500 characters".to_string(),
            ));
        }
        Ok(())
    }

    /// Validates and fills the default timestamp.
    pub fn into_entry(self) -> Result<AuditEntry, AppError> {
        self.validate()?;
        Ok(AuditEntry {
            id: Uuid::new_v4(),
            action: self.action,
            performed_by: self.performed_by,
            entity: self.entity,
            entity_id: self.entity_id,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            details: self.details,
        })
    }
}

fn entity_name(record: &ContentRecord) -> String {
    match record.kind {
        crate::models::ContentKind::Law => "law",
        crate::models::ContentKind::Scheme => "scheme",
        crate::models::ContentKind::Article => "article",
    }
    .to_string()
}

/// Truncates free text so it fits the `details` column.
pub fn clip_details(text: &str) -> String {
    text.chars().take(500).collect()
}
