use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{error::AppError, session::Role};

// --- Enumerations ---

/// ContentKind
///
/// The three kinds of awareness content that go through moderation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, sqlx::Type, Default,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "content_kind", rename_all = "snake_case")]
#[ts(export)]
pub enum ContentKind {
    #[default]
    Law,
    Scheme,
    Article,
}

/// ContentStatus
///
/// The authoritative moderation state. Only the moderation workflow writes it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, sqlx::Type, Default,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "content_status", rename_all = "snake_case")]
#[ts(export)]
pub enum ContentStatus {
    #[default]
    Pending,
    AiVerifying,
    Approved,
    Rejected,
}

impl ContentStatus {
    /// States an admin decision (approve/reject) may be taken from.
    pub const REVIEWABLE: [ContentStatus; 2] = [ContentStatus::Pending, ContentStatus::AiVerifying];

    pub fn is_terminal(&self) -> bool {
        matches!(self, ContentStatus::Approved | ContentStatus::Rejected)
    }

    /// The legal edges of the moderation state machine. `reopen` is the only way
    /// out of a terminal state.
    pub fn can_transition_to(&self, next: ContentStatus) -> bool {
        use ContentStatus::*;
        matches!(
            (self, next),
            (Pending, AiVerifying)
                | (Pending, Approved)
                | (Pending, Rejected)
                | (AiVerifying, Approved)
                | (AiVerifying, Rejected)
                | (Approved, Pending)
                | (Rejected, Pending)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Pending => "pending",
            ContentStatus::AiVerifying => "ai_verifying",
            ContentStatus::Approved => "approved",
            ContentStatus::Rejected => "rejected",
        }
    }
}

/// VerificationResult
///
/// The advisory verdict of the verification worker. Independent of `ContentStatus`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, sqlx::Type, Default,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "verification_result", rename_all = "snake_case")]
#[ts(export)]
pub enum VerificationResult {
    #[default]
    None,
    Verified,
    NotVerified,
    Error,
}

// --- Core Schemas (Mapped to Database) ---

/// User
///
/// A profile row from `profiles`, the local mirror of the identity provider's user.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub role: Role,
}

/// ContentRecord
///
/// A law, scheme or article together with its moderation and verification state.
/// Every text field exists in English and Tamil (`*_ta`).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct ContentRecord {
    pub id: Uuid,
    pub kind: ContentKind,

    pub title: String,
    pub title_ta: String,
    pub description: String,
    pub description_ta: String,
    pub body: String,
    pub body_ta: String,

    // Classification only.
    pub category: String,
    pub tags: Vec<String>,

    pub status: ContentStatus,
    pub ai_verification_result: VerificationResult,
    pub ai_verification_notes: String,
    /// Set when an admin force-approved past an `error` verdict.
    pub approval_override: bool,
    /// Content revision; bumped by every content-changing edit.
    pub version: i32,

    pub created_by: Uuid,
    pub reviewed_by: Option<Uuid>,
    #[ts(type = "string | null")]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl ContentRecord {
    /// Visible on public read paths.
    pub fn is_public(&self) -> bool {
        self.status == ContentStatus::Approved
    }
}

/// A worker verdict ready to be written back onto a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Verdict {
    pub result: VerificationResult,
    pub notes: String,
}

// --- Request Payloads (Input Schemas) ---

/// SubmitContentRequest
///
/// Input payload for submitting a new content item (POST /content). May be pre-filled
/// by an external writing assist; it is validated like any other user input.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct SubmitContentRequest {
    pub kind: ContentKind,
    #[schema(example = "Equal Pay Act")]
    pub title: String,
    pub title_ta: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub description_ta: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub body_ta: String,
    #[schema(example = "employment")]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl SubmitContentRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_required_pair("title", &self.title, &self.title_ta)?;
        validate_optional_pair("description", &self.description, &self.description_ta)?;
        validate_optional_pair("body", &self.body, &self.body_ta)?;
        if self.category.trim().is_empty() {
            return Err(AppError::Validation("category is required".to_string()));
        }
        Ok(())
    }
}

/// UpdateContentRequest
///
/// Partial update payload (PUT /content/{id}). Bilingual fields travel as pairs so an
/// edit can never leave one language behind.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<LocalizedText>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<LocalizedText>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<LocalizedText>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl UpdateContentRequest {
    /// True when the edit touches text that a verdict or an approval covered.
    pub fn changes_content(&self) -> bool {
        self.title.is_some() || self.description.is_some() || self.body.is_some()
    }

    pub fn is_empty(&self) -> bool {
        !self.changes_content() && self.category.is_none() && self.tags.is_none()
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if let Some(title) = &self.title {
            validate_required_pair("title", &title.en, &title.ta)?;
        }
        if let Some(description) = &self.description {
            validate_optional_pair("description", &description.en, &description.ta)?;
        }
        if let Some(body) = &self.body {
            validate_optional_pair("body", &body.en, &body.ta)?;
        }
        if matches!(&self.category, Some(c) if c.trim().is_empty()) {
            return Err(AppError::Validation("category cannot be blank".to_string()));
        }
        Ok(())
    }
}

/// An English/Tamil text pair.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq, Eq)]
#[ts(export)]
pub struct LocalizedText {
    pub en: String,
    pub ta: String,
}

fn validate_required_pair(field: &str, en: &str, ta: &str) -> Result<(), AppError> {
    if en.trim().is_empty() || ta.trim().is_empty() {
        return Err(AppError::Validation(format!(
            "{field} is required in both English and Tamil"
        )));
    }
    Ok(())
}

fn validate_optional_pair(field: &str, en: &str, ta: &str) -> Result<(), AppError> {
    if en.trim().is_empty() != ta.trim().is_empty() {
        return Err(AppError::Validation(format!(
            "{field} must be provided in both English and Tamil, or neither"
        )));
    }
    Ok(())
}

/// ApproveRequest
///
/// Body of POST /admin/content/{id}/approve. `override_verification_error` must be set
/// explicitly to approve a record whose verdict is `error`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ApproveRequest {
    #[serde(default)]
    pub override_verification_error: bool,
    #[serde(default)]
    pub note: Option<String>,
}

/// RejectRequest
///
/// Body of POST /admin/content/{id}/reject.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct RejectRequest {
    #[serde(default)]
    pub note: Option<String>,
}

/// CreateSessionRequest
///
/// Body of POST /auth/session. `access_token` is the identity provider's JWT.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub access_token: Option<String>,
}

/// UpdateRoleRequest
///
/// Body of PUT /admin/users/{id}/role.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

// --- Output Schemas ---

/// SessionResponse
///
/// Result of a successful credential exchange. `token` identifies the session context
/// and must be sent back as `Authorization: Bearer <token>`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SessionResponse {
    pub identity: crate::session::Identity,
    pub role: Role,
    pub token: String,
    #[ts(type = "string")]
    pub issued_at: DateTime<Utc>,
    /// Only admin-class sessions carry an expiry.
    #[ts(type = "string | null")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// ModerationStats
///
/// Counters for the admin moderation queue (GET /admin/stats).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq, Eq)]
#[ts(export)]
pub struct ModerationStats {
    pub total: i64,
    pub pending: i64,
    pub ai_verifying: i64,
    pub approved: i64,
    pub rejected: i64,
    pub verification_errors: i64,
}

// --- Query Filters ---

/// ContentFilter
///
/// Query parameters of the public listing (GET /content). Only approved records are
/// ever returned, whatever the filter.
#[derive(Debug, Clone, Deserialize, Default, utoipa::IntoParams)]
pub struct ContentFilter {
    /// Restrict to one kind of content.
    pub kind: Option<ContentKind>,
    /// Exact category match.
    pub category: Option<String>,
    /// Case-insensitive search over both language variants of title and description.
    pub search: Option<String>,
    /// 1-based page number.
    pub page: Option<i64>,
    /// Page size, capped at 100.
    pub per_page: Option<i64>,
}

impl ContentFilter {
    pub const DEFAULT_PER_PAGE: i64 = 20;
    pub const MAX_PER_PAGE: i64 = 100;

    /// (limit, offset) for the requested page.
    pub fn limit_offset(&self) -> (i64, i64) {
        let per_page = self
            .per_page
            .unwrap_or(Self::DEFAULT_PER_PAGE)
            .clamp(1, Self::MAX_PER_PAGE);
        let page = self.page.unwrap_or(1).max(1);
        (per_page, (page - 1).saturating_mul(per_page))
    }
}

/// ModerationFilter
///
/// Query parameters of the admin queue (GET /admin/content).
#[derive(Debug, Clone, Deserialize, Default, utoipa::IntoParams)]
pub struct ModerationFilter {
    pub status: Option<ContentStatus>,
    pub kind: Option<ContentKind>,
    pub verdict: Option<VerificationResult>,
}

/// The authoritative decision written by approve/reject.
#[derive(Debug, Clone, Copy)]
pub struct Review {
    pub status: ContentStatus,
    pub reviewed_by: Uuid,
    pub approval_override: bool,
}

impl Review {
    /// Approving over an `error` verdict is only allowed with the explicit override.
    pub fn requires_clean_verdict(&self) -> bool {
        self.status == ContentStatus::Approved && !self.approval_override
    }
}
