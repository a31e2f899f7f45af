use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Authenticated Router Module
///
/// Endpoints for any role with a live session. Wrapped in `auth_middleware`, which
/// answers with a login redirect before the handler runs.
pub fn authenticated_routes() -> Router<AppState> {
    Router::new()
        // GET /auth/session
        // The caller's current session, including its expiry if admin-class.
        .route("/auth/session", get(handlers::get_session))
        // POST /content
        // New submissions always start pending, whatever the submitter's role.
        .route("/content", post(handlers::submit_content))
        // GET /me/content
        .route("/me/content", get(handlers::get_my_content))
        // PUT /content/{id}
        // Owner, editor or admin; refused once the record is decided.
        .route("/content/{id}", put(handlers::update_content))
        // POST /content/{id}/verification
        // Editors and admins only; the role check happens in the workflow.
        .route(
            "/content/{id}/verification",
            post(handlers::request_verification),
        )
}
