use crate::{
    AppState,
    audit::AuditEntry,
    auth::{self, AdminSession, AuthSession},
    error::{AppError, ErrorResponse},
    models::{
        ApproveRequest, ContentFilter, ContentRecord, CreateSessionRequest, ModerationFilter,
        ModerationStats, RejectRequest, SessionResponse, SubmitContentRequest,
        UpdateContentRequest, UpdateRoleRequest, User,
    },
    session::{ADMIN_SESSION_TTL_HOURS, Session},
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Query Structs ---

/// AuditLogQuery
///
/// Query parameters of GET /admin/audit-logs.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct AuditLogQuery {
    /// Maximum number of entries, newest first. Defaults to 50, capped at 500.
    pub limit: Option<i64>,
}

const DEFAULT_AUDIT_LIMIT: i64 = 50;
const MAX_AUDIT_LIMIT: i64 = 500;

/// HealthResponse
#[derive(Serialize, Deserialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

fn session_response(context: Uuid, session: &Session) -> SessionResponse {
    let expires_at = session
        .role()
        .is_admin_class()
        .then(|| session.issued_at + Duration::hours(ADMIN_SESSION_TTL_HOURS));
    SessionResponse {
        identity: session.identity.clone(),
        role: session.role(),
        token: context.to_string(),
        issued_at: session.issued_at,
        expires_at,
    }
}

// --- Public Handlers ---

/// health
///
/// [Public Route] Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// list_content
///
/// [Public Route] Approved content only, filtered and paginated.
#[utoipa::path(
    get,
    path = "/content",
    params(ContentFilter),
    responses((status = 200, description = "Approved content", body = [ContentRecord]))
)]
pub async fn list_content(
    State(state): State<AppState>,
    Query(filter): Query<ContentFilter>,
) -> Json<Vec<ContentRecord>> {
    Json(state.repo.list_public_content(&filter).await)
}

/// get_content
///
/// [Public Route] A single approved record. Anything not approved is reported as
/// missing so its existence does not leak.
#[utoipa::path(
    get,
    path = "/content/{id}",
    responses(
        (status = 200, description = "Content", body = ContentRecord),
        (status = 404, description = "Not Found", body = ErrorResponse)
    )
)]
pub async fn get_content(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ContentRecord>, AppError> {
    state
        .repo
        .get_public_content(id)
        .await
        .map(Json)
        .ok_or(AppError::NotFound)
}

/// create_session
///
/// [Public Route] Login. Exchanges an identity-provider token for a session. A caller
/// that already holds a session context keeps it, and the new session replaces the
/// one of the other role class in that context.
#[utoipa::path(
    post,
    path = "/auth/session",
    request_body = CreateSessionRequest,
    responses(
        (status = 201, description = "Session issued", body = SessionResponse),
        (status = 401, description = "Credentials rejected", body = ErrorResponse)
    )
)]
pub async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), AppError> {
    let identity = auth::resolve_identity(
        &headers,
        payload.access_token.as_deref(),
        &state.repo,
        &state.config,
    )
    .await?;

    // A presented context is only reused while the store still holds it.
    let context = match auth::session_context(&headers) {
        Some(context) if state.sessions.current(context).await.is_some() => context,
        _ => Uuid::new_v4(),
    };
    let session = state.sessions.issue(context, identity).await?;

    tracing::info!(
        user_id = %session.user_id(),
        role = session.role().as_str(),
        "session issued"
    );
    Ok((StatusCode::CREATED, Json(session_response(context, &session))))
}

/// get_session
///
/// [Authenticated Route] The caller's live session.
#[utoipa::path(
    get,
    path = "/auth/session",
    responses(
        (status = 200, description = "Current session", body = SessionResponse),
        (status = 401, description = "No session or session expired", body = ErrorResponse)
    )
)]
pub async fn get_session(AuthSession { context, session }: AuthSession) -> Json<SessionResponse> {
    Json(session_response(context, &session))
}

/// delete_session
///
/// [Public Route] Logout. Clearing an unknown or absent context is not an error.
#[utoipa::path(
    delete,
    path = "/auth/session",
    responses((status = 204, description = "Session cleared"))
)]
pub async fn delete_session(State(state): State<AppState>, headers: HeaderMap) -> StatusCode {
    if let Some(context) = auth::session_context(&headers) {
        state.sessions.clear(context).await;
    }
    StatusCode::NO_CONTENT
}

// --- Authenticated Handlers ---

/// submit_content
///
/// [Authenticated Route] Submits a law, scheme or article for moderation. The record
/// always starts `pending`.
#[utoipa::path(
    post,
    path = "/content",
    request_body = SubmitContentRequest,
    responses(
        (status = 201, description = "Submitted", body = ContentRecord),
        (status = 422, description = "Invalid bilingual content", body = ErrorResponse)
    )
)]
pub async fn submit_content(
    AuthSession { session, .. }: AuthSession,
    State(state): State<AppState>,
    Json(payload): Json<SubmitContentRequest>,
) -> Result<(StatusCode, Json<ContentRecord>), AppError> {
    let receipt = state.workflow().submit(&session, payload).await?;
    Ok((StatusCode::CREATED, Json(receipt.record)))
}

/// get_my_content
///
/// [Authenticated Route] The caller's own submissions in every status.
#[utoipa::path(
    get,
    path = "/me/content",
    responses((status = 200, description = "My submissions", body = [ContentRecord]))
)]
pub async fn get_my_content(
    AuthSession { session, .. }: AuthSession,
    State(state): State<AppState>,
) -> Json<Vec<ContentRecord>> {
    Json(state.repo.list_content_by_author(session.user_id()).await)
}

/// update_content
///
/// [Authenticated Route] Edits an undecided record. Text changes discard the
/// previous verdict.
#[utoipa::path(
    put,
    path = "/content/{id}",
    request_body = UpdateContentRequest,
    responses(
        (status = 200, description = "Updated", body = ContentRecord),
        (status = 403, description = "Not the submitter", body = ErrorResponse),
        (status = 409, description = "Record already decided", body = ErrorResponse)
    )
)]
pub async fn update_content(
    AuthSession { session, .. }: AuthSession,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateContentRequest>,
) -> Result<Json<ContentRecord>, AppError> {
    let receipt = state.workflow().edit(&session, id, payload).await?;
    Ok(Json(receipt.record))
}

/// request_verification
///
/// [Authenticated Route] Editors and admins queue a record for verification. The
/// verdict arrives later; the response reflects the record at dispatch time.
#[utoipa::path(
    post,
    path = "/content/{id}/verification",
    responses(
        (status = 202, description = "Verification dispatched", body = ContentRecord),
        (status = 403, description = "Role may not request verification", body = ErrorResponse),
        (status = 409, description = "Record already decided", body = ErrorResponse)
    )
)]
pub async fn request_verification(
    AuthSession { session, .. }: AuthSession,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<ContentRecord>), AppError> {
    let receipt = state.workflow().request_verification(&session, id).await?;
    Ok((StatusCode::ACCEPTED, Json(receipt.record)))
}

// --- Admin Handlers ---

/// get_admin_content
///
/// [Admin Route] The moderation queue, in every status.
#[utoipa::path(
    get,
    path = "/admin/content",
    params(ModerationFilter),
    responses((status = 200, description = "All content", body = [ContentRecord]))
)]
pub async fn get_admin_content(
    AdminSession { .. }: AdminSession,
    State(state): State<AppState>,
    Query(filter): Query<ModerationFilter>,
) -> Json<Vec<ContentRecord>> {
    Json(state.repo.list_content(&filter).await)
}

/// get_admin_stats
///
/// [Admin Route] Queue counters.
#[utoipa::path(
    get,
    path = "/admin/stats",
    responses((status = 200, description = "Moderation counters", body = ModerationStats))
)]
pub async fn get_admin_stats(
    AdminSession { .. }: AdminSession,
    State(state): State<AppState>,
) -> Json<ModerationStats> {
    Json(state.repo.get_stats().await)
}

/// approve_content
///
/// [Admin Route] Publishes a record. Approving over a verification error requires
/// `override_verification_error: true`.
#[utoipa::path(
    post,
    path = "/admin/content/{id}/approve",
    request_body = ApproveRequest,
    responses(
        (status = 200, description = "Approved", body = ContentRecord),
        (status = 404, description = "Not Found", body = ErrorResponse),
        (status = 409, description = "Not reviewable or verification error not overridden", body = ErrorResponse)
    )
)]
pub async fn approve_content(
    AdminSession { session, .. }: AdminSession,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ApproveRequest>,
) -> Result<Json<ContentRecord>, AppError> {
    state.workflow().approve(&session, id, payload).await.map(Json)
}

/// reject_content
///
/// [Admin Route]
#[utoipa::path(
    post,
    path = "/admin/content/{id}/reject",
    request_body = RejectRequest,
    responses(
        (status = 200, description = "Rejected", body = ContentRecord),
        (status = 404, description = "Not Found", body = ErrorResponse),
        (status = 409, description = "Not reviewable", body = ErrorResponse)
    )
)]
pub async fn reject_content(
    AdminSession { session, .. }: AdminSession,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RejectRequest>,
) -> Result<Json<ContentRecord>, AppError> {
    state.workflow().reject(&session, id, payload).await.map(Json)
}

/// reopen_content
///
/// [Admin Route] Sends a decided record back to `pending`.
#[utoipa::path(
    post,
    path = "/admin/content/{id}/reopen",
    responses(
        (status = 200, description = "Reopened", body = ContentRecord),
        (status = 409, description = "Record is not decided", body = ErrorResponse)
    )
)]
pub async fn reopen_content(
    AdminSession { session, .. }: AdminSession,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ContentRecord>, AppError> {
    state.workflow().reopen(&session, id).await.map(Json)
}

/// delete_content
///
/// [Admin Route] Subject to the configured delete policy.
#[utoipa::path(
    delete,
    path = "/admin/content/{id}",
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Delete policy refuses this role", body = ErrorResponse),
        (status = 404, description = "Not Found", body = ErrorResponse)
    )
)]
pub async fn delete_content(
    AdminSession { session, .. }: AdminSession,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.workflow().delete(&session, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// get_audit_logs
///
/// [Admin Route] Most recent audit entries first.
#[utoipa::path(
    get,
    path = "/admin/audit-logs",
    params(AuditLogQuery),
    responses((status = 200, description = "Audit trail", body = [AuditEntry]))
)]
pub async fn get_audit_logs(
    AdminSession { .. }: AdminSession,
    State(state): State<AppState>,
    Query(query): Query<AuditLogQuery>,
) -> Json<Vec<AuditEntry>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_AUDIT_LIMIT)
        .clamp(1, MAX_AUDIT_LIMIT);
    Json(state.repo.list_audit(limit).await)
}

/// update_user_role
///
/// [Admin Route] Super-admin only.
#[utoipa::path(
    put,
    path = "/admin/users/{id}/role",
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = User),
        (status = 403, description = "Not a super-admin", body = ErrorResponse),
        (status = 404, description = "Not Found", body = ErrorResponse)
    )
)]
pub async fn update_user_role(
    AdminSession { session, .. }: AdminSession,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRoleRequest>,
) -> Result<Json<User>, AppError> {
    state
        .workflow()
        .change_role(&session, id, payload.role)
        .await
        .map(Json)
}
