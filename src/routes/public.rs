use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a session. Content reads here only ever see approved
/// records; the repository's public queries filter on status.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        .route("/health", get(handlers::health))
        // GET /content?kind=...&category=...&search=...&page=...&per_page=...
        .route("/content", get(handlers::list_content))
        // GET /content/{id}
        // 404 for anything not approved.
        .route("/content/{id}", get(handlers::get_content))
        // POST /auth/session (login), DELETE /auth/session (logout)
        .route(
            "/auth/session",
            post(handlers::create_session).delete(handlers::delete_session),
        )
}
