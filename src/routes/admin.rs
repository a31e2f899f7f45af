use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, post, put},
};

/// Admin Router Module
///
/// Moderation and oversight. Wrapped in `admin_middleware`: an expired admin session
/// gets a login redirect, a non-admin one a redirect home.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin/content?status=...&kind=...&verdict=...
        .route("/content", get(handlers::get_admin_content))
        // GET /admin/stats
        .route("/stats", get(handlers::get_admin_stats))
        // POST /admin/content/{id}/approve
        // A verification error blocks approval unless explicitly overridden.
        .route("/content/{id}/approve", post(handlers::approve_content))
        // POST /admin/content/{id}/reject
        .route("/content/{id}/reject", post(handlers::reject_content))
        // POST /admin/content/{id}/reopen
        .route("/content/{id}/reopen", post(handlers::reopen_content))
        // DELETE /admin/content/{id}
        // Governed by CONTENT_DELETE_POLICY.
        .route("/content/{id}", delete(handlers::delete_content))
        // GET /admin/audit-logs?limit=...
        .route("/audit-logs", get(handlers::get_audit_logs))
        // PUT /admin/users/{id}/role
        // Super-admin only.
        .route("/users/{id}/role", put(handlers::update_user_role))
}
