use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod audit;
pub mod auth;
pub mod config;
pub mod error;
pub mod guard;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod session;
pub mod verification;
pub mod workflow;

// Module for routing segregation (Public, Authenticated, Admin).
pub mod routes;
use auth::{AdminSession, AuthSession};
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::AppError;
pub use repository::{MemoryRepository, PostgresRepository, RepositoryState};
pub use session::{MemorySessionStore, PostgresSessionStore, SessionState};
pub use verification::{
    EvaluationState, HttpEvaluationClient, OfflineEvaluator, VerificationWorker, Verifier,
};
pub use workflow::ModerationWorkflow;

/// ApiDoc
///
/// Aggregates every `#[utoipa::path]` handler and `ToSchema` model into the OpenAPI
/// document served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health, handlers::list_content, handlers::get_content,
        handlers::create_session, handlers::get_session, handlers::delete_session,
        handlers::submit_content, handlers::get_my_content, handlers::update_content,
        handlers::request_verification, handlers::get_admin_content, handlers::get_admin_stats,
        handlers::approve_content, handlers::reject_content, handlers::reopen_content,
        handlers::delete_content, handlers::get_audit_logs, handlers::update_user_role
    ),
    components(
        schemas(
            models::ContentRecord, models::ContentKind, models::ContentStatus,
            models::VerificationResult, models::SubmitContentRequest,
            models::UpdateContentRequest, models::LocalizedText, models::ApproveRequest,
            models::RejectRequest, models::CreateSessionRequest, models::UpdateRoleRequest,
            models::SessionResponse, models::ModerationStats, models::User,
            session::Identity, session::Role, audit::AuditEntry,
            error::ErrorResponse, handlers::HealthResponse,
        )
    ),
    tags(
        (name = "sakhi-portal", description = "Bilingual legal awareness content and moderation API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single shared container of services and configuration, cloned into every
/// request. Everything inside is either an `Arc` or cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Content, profiles and the audit trail.
    pub repo: RepositoryState,
    /// Session contexts and their regular/admin slots.
    pub sessions: SessionState,
    /// External evaluation service used by the verification worker.
    pub evaluator: EvaluationState,
    pub config: AppConfig,
}

impl AppState {
    pub fn verifier(&self) -> Verifier {
        Verifier::new(self.evaluator.clone(), self.config.verification_retry_delay)
    }

    pub fn worker(&self) -> VerificationWorker {
        VerificationWorker::new(self.repo.clone(), self.verifier())
    }

    pub fn workflow(&self) -> ModerationWorkflow {
        ModerationWorkflow::new(self.repo.clone(), self.worker(), &self.config)
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for SessionState {
    fn from_ref(app_state: &AppState) -> SessionState {
        app_state.sessions.clone()
    }
}

impl FromRef<AppState> for EvaluationState {
    fn from_ref(app_state: &AppState) -> EvaluationState {
        app_state.evaluator.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Runs the access check for the authenticated routes. A failed `AuthSession`
/// extraction short-circuits with the guard's error response.
async fn auth_middleware(_session: AuthSession, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// admin_middleware
///
/// Same as `auth_middleware`, restricted to admin-class sessions.
async fn admin_middleware(_session: AdminSession, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the public, authenticated and admin routers with their access layers,
/// then wraps everything in request-id, tracing and CORS.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .nest(
            "/admin",
            admin::admin_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                admin_middleware,
            )),
        )
        .with_state(state);

    // Request ids are set before the trace span opens so every log line carries one.
    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span factory for `TraceLayer`: method, URI and the `x-request-id` as `req_id`.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
