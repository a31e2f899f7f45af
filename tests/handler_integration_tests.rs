use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use sakhi_portal::{
    AppState,
    auth::Claims,
    config::{AppConfig, Env},
    create_router,
    error::ErrorResponse,
    models::{ContentRecord, ContentStatus, ModerationStats, SessionResponse, User},
    repository::{MemoryRepository, Repository, RepositoryState},
    session::{Identity, MemorySessionStore, Role, SessionState, SessionStore},
    verification::{EvaluationState, MockEvaluationService},
};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

// --- Test App ---

struct TestApp {
    router: Router,
    repo: Arc<MemoryRepository>,
    sessions: Arc<MemorySessionStore>,
    config: AppConfig,
}

fn spawn_app(config: AppConfig) -> TestApp {
    let repo = Arc::new(MemoryRepository::new());
    let sessions = Arc::new(MemorySessionStore::new());
    let state = AppState {
        repo: repo.clone() as RepositoryState,
        sessions: sessions.clone() as SessionState,
        evaluator: Arc::new(MockEvaluationService::verifying()) as EvaluationState,
        config: config.clone(),
    };
    TestApp {
        router: create_router(state),
        repo,
        sessions,
        config,
    }
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn seed_user(&self, role: Role) -> User {
        let id = Uuid::new_v4();
        let user = User {
            id,
            email: format!("{}@example.org", role.as_str()),
            display_name: format!("{} tester", role.as_str()),
            role,
        };
        self.repo.insert_user(user.clone()).await;
        user
    }

    /// Logs in through the local `x-user-id` bypass and returns the bearer token.
    async fn login(&self, user: &User) -> String {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/auth/session")
            .header("x-user-id", user.id.to_string())
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let response = self.send(request).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let session: SessionResponse = read_json(response).await;
        session.token
    }

    async fn login_as(&self, role: Role) -> (User, String) {
        let user = self.seed_user(role).await;
        let token = self.login(&user).await;
        (user, token)
    }
}

fn json_request(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn empty_request(method: Method, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn read_json<T: DeserializeOwned>(response: Response) -> T {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn law_payload() -> Value {
    json!({
        "kind": "law",
        "title": "Equal Pay Act",
        "title_ta": "சம ஊதியச் சட்டம்",
        "category": "employment",
        "tags": ["wages"]
    })
}

async fn submit_law(app: &TestApp, token: &str) -> ContentRecord {
    let response = app
        .send(json_request(Method::POST, "/content", Some(token), law_payload()))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    read_json(response).await
}

// --- Public ---

#[tokio::test]
async fn health_check() {
    let app = spawn_app(AppConfig::default());
    let response = app.send(empty_request(Method::GET, "/health", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = spawn_app(AppConfig::default());
    let response = app
        .send(empty_request(Method::GET, "/api-docs/openapi.json", None))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let doc: Value = read_json(response).await;
    assert!(doc["paths"]["/admin/content/{id}/approve"].is_object());
}

#[tokio::test]
async fn anonymous_submission_redirects_to_login() {
    let app = spawn_app(AppConfig::default());
    let response = app
        .send(json_request(Method::POST, "/content", None, law_payload()))
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: ErrorResponse = read_json(response).await;
    assert_eq!(body.error, "authentication_required");
    assert_eq!(body.redirect.as_deref(), Some("/login"));
}

// --- Full moderation flow ---

#[tokio::test]
async fn far_page_of_public_content_is_empty() {
    let app = spawn_app(AppConfig::default());

    let response = app
        .send(empty_request(
            Method::GET,
            "/content?page=9223372036854775807&per_page=100",
            None,
        ))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let public: Vec<ContentRecord> = read_json(response).await;
    assert!(public.is_empty());
}

#[tokio::test]
async fn content_is_public_only_after_approval() {
    let app = spawn_app(AppConfig::default());
    let (_user, user_token) = app.login_as(Role::User).await;
    let (_admin, admin_token) = app.login_as(Role::Admin).await;

    let record = submit_law(&app, &user_token).await;
    assert_eq!(record.status, ContentStatus::Pending);

    let detail_uri = format!("/content/{}", record.id);
    let hidden = app.send(empty_request(Method::GET, &detail_uri, None)).await;
    assert_eq!(hidden.status(), StatusCode::NOT_FOUND);

    let listing = app.send(empty_request(Method::GET, "/content", None)).await;
    let public: Vec<ContentRecord> = read_json(listing).await;
    assert!(public.is_empty());

    let mine = app
        .send(empty_request(Method::GET, "/me/content", Some(&user_token)))
        .await;
    let mine: Vec<ContentRecord> = read_json(mine).await;
    assert_eq!(mine.len(), 1);

    let approve = app
        .send(json_request(
            Method::POST,
            &format!("/admin/content/{}/approve", record.id),
            Some(&admin_token),
            json!({}),
        ))
        .await;
    assert_eq!(approve.status(), StatusCode::OK);

    let visible = app.send(empty_request(Method::GET, &detail_uri, None)).await;
    assert_eq!(visible.status(), StatusCode::OK);
    let visible: ContentRecord = read_json(visible).await;
    assert_eq!(visible.title_ta, "சம ஊதியச் சட்டம்");

    let filtered = app
        .send(empty_request(
            Method::GET,
            "/content?kind=law&category=employment&search=equal",
            None,
        ))
        .await;
    let filtered: Vec<ContentRecord> = read_json(filtered).await;
    assert_eq!(filtered.len(), 1);

    let audit = app
        .send(empty_request(Method::GET, "/admin/audit-logs", Some(&admin_token)))
        .await;
    let audit: Vec<Value> = read_json(audit).await;
    assert_eq!(audit[0]["action"], "approve");
}

#[tokio::test]
async fn user_session_cannot_reach_admin_routes() {
    let app = spawn_app(AppConfig::default());
    let (_user, token) = app.login_as(Role::User).await;
    let record = submit_law(&app, &token).await;

    let response = app
        .send(json_request(
            Method::POST,
            &format!("/admin/content/{}/approve", record.id),
            Some(&token),
            json!({}),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: ErrorResponse = read_json(response).await;
    assert_eq!(body.redirect.as_deref(), Some("/"));
    assert_eq!(
        app.repo.get_content(record.id).await.unwrap().status,
        ContentStatus::Pending
    );
}

#[tokio::test]
async fn editor_can_request_verification() {
    let app = spawn_app(AppConfig::default());
    let (_editor, token) = app.login_as(Role::Editor).await;
    let record = submit_law(&app, &token).await;

    let response = app
        .send(empty_request(
            Method::POST,
            &format!("/content/{}/verification", record.id),
            Some(&token),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body: ContentRecord = read_json(response).await;
    assert_eq!(body.status, ContentStatus::AiVerifying);
}

#[tokio::test]
async fn invalid_bilingual_payload_is_unprocessable() {
    let app = spawn_app(AppConfig::default());
    let (_user, token) = app.login_as(Role::User).await;

    let response = app
        .send(json_request(
            Method::POST,
            "/content",
            Some(&token),
            json!({
                "kind": "scheme",
                "title": "Maternity Benefit Scheme",
                "title_ta": "",
                "category": "health"
            }),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn approving_twice_conflicts() {
    let app = spawn_app(AppConfig::default());
    let (_user, user_token) = app.login_as(Role::User).await;
    let (_admin, admin_token) = app.login_as(Role::SuperAdmin).await;
    let record = submit_law(&app, &user_token).await;
    let uri = format!("/admin/content/{}/approve", record.id);

    let first = app
        .send(json_request(Method::POST, &uri, Some(&admin_token), json!({})))
        .await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .send(json_request(Method::POST, &uri, Some(&admin_token), json!({})))
        .await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn admin_stats_count_the_queue() {
    let app = spawn_app(AppConfig::default());
    let (_user, user_token) = app.login_as(Role::User).await;
    let (_admin, admin_token) = app.login_as(Role::Admin).await;
    submit_law(&app, &user_token).await;
    submit_law(&app, &user_token).await;

    let response = app
        .send(empty_request(Method::GET, "/admin/stats", Some(&admin_token)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let stats: ModerationStats = read_json(response).await;
    assert_eq!(stats.total, 2);
    assert_eq!(stats.pending, 2);
}

// --- Sessions ---

#[tokio::test]
async fn expired_admin_session_is_cleared_and_redirected() {
    let app = spawn_app(AppConfig::default());
    let admin = app.seed_user(Role::Admin).await;
    let context = Uuid::new_v4();
    app.sessions
        .issue_at(
            context,
            Identity {
                user_id: admin.id,
                display_name: admin.display_name.clone(),
                role: Role::Admin,
            },
            Utc::now() - Duration::hours(25),
        )
        .await
        .unwrap();

    let response = app
        .send(empty_request(
            Method::GET,
            "/admin/stats",
            Some(&context.to_string()),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: ErrorResponse = read_json(response).await;
    assert_eq!(body.error, "session_expired");
    assert_eq!(body.message, "Your session has expired. Please log in again.");
    assert_eq!(body.redirect.as_deref(), Some("/login"));
    assert!(app.sessions.current(context).await.is_none());
}

#[tokio::test]
async fn admin_login_reports_expiry() {
    let app = spawn_app(AppConfig::default());
    let admin = app.seed_user(Role::Admin).await;
    let token = app.login(&admin).await;

    let response = app
        .send(empty_request(Method::GET, "/auth/session", Some(&token)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let session: SessionResponse = read_json(response).await;
    assert_eq!(session.role, Role::Admin);
    assert_eq!(
        session.expires_at,
        Some(session.issued_at + Duration::hours(24))
    );
}

#[tokio::test]
async fn logout_clears_the_session() {
    let app = spawn_app(AppConfig::default());
    let (_user, token) = app.login_as(Role::User).await;

    let logout = app
        .send(empty_request(Method::DELETE, "/auth/session", Some(&token)))
        .await;
    assert_eq!(logout.status(), StatusCode::NO_CONTENT);

    let after = app
        .send(empty_request(Method::GET, "/auth/session", Some(&token)))
        .await;
    assert_eq!(after.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn identity_token_login_creates_a_user_profile() {
    let app = spawn_app(AppConfig::default());
    let subject = Uuid::new_v4();
    let now = Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: subject,
        exp: now + 3600,
        iat: now,
        email: Some("meena@example.org".to_string()),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(app.config.jwt_secret.as_bytes()),
    )
    .unwrap();

    let response = app
        .send(json_request(
            Method::POST,
            "/auth/session",
            None,
            json!({ "access_token": token }),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let session: SessionResponse = read_json(response).await;
    assert_eq!(session.identity.user_id, subject);
    assert_eq!(session.role, Role::User);
    assert_eq!(session.expires_at, None);

    let profile = app.repo.get_user(subject).await.unwrap();
    assert_eq!(profile.display_name, "meena");
}

#[tokio::test]
async fn forged_identity_token_is_rejected() {
    let app = spawn_app(AppConfig::default());
    let now = Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: Uuid::new_v4(),
        exp: now + 3600,
        iat: now,
        email: None,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"not-the-shared-secret"),
    )
    .unwrap();

    let response = app
        .send(json_request(
            Method::POST,
            "/auth/session",
            None,
            json!({ "access_token": token }),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(app.sessions.is_empty().await);
}

#[tokio::test]
async fn local_bypass_is_disabled_in_production() {
    let config = AppConfig {
        env: Env::Production,
        ..AppConfig::default()
    };
    let app = spawn_app(config);
    let admin = app.seed_user(Role::Admin).await;

    let response = app
        .send(
            Request::builder()
                .method(Method::POST)
                .uri("/auth/session")
                .header("x-user-id", admin.id.to_string())
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn only_super_admin_may_change_roles() {
    let app = spawn_app(AppConfig::default());
    let target = app.seed_user(Role::User).await;
    let (_admin, admin_token) = app.login_as(Role::Admin).await;
    let (_root, root_token) = app.login_as(Role::SuperAdmin).await;
    let uri = format!("/admin/users/{}/role", target.id);

    let denied = app
        .send(json_request(
            Method::PUT,
            &uri,
            Some(&admin_token),
            json!({ "role": "editor" }),
        ))
        .await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let granted = app
        .send(json_request(
            Method::PUT,
            &uri,
            Some(&root_token),
            json!({ "role": "editor" }),
        ))
        .await;
    assert_eq!(granted.status(), StatusCode::OK);
    let user: User = read_json(granted).await;
    assert_eq!(user.role, Role::Editor);
}

fn login_request(user: &User, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/auth/session")
        .header("x-user-id", user.id.to_string())
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from("{}")).unwrap()
}

#[tokio::test]
async fn login_ignores_an_unknown_bearer_context() {
    let app = spawn_app(AppConfig::default());
    let admin = app.seed_user(Role::Admin).await;
    let planted = "00000000-0000-0000-0000-000000000001";

    let response = app.send(login_request(&admin, Some(planted))).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let session: SessionResponse = read_json(response).await;

    assert_ne!(session.token, planted);
    let planted_id = Uuid::parse_str(planted).unwrap();
    assert!(app.sessions.current(planted_id).await.is_none());
}

#[tokio::test]
async fn login_reuses_a_live_context() {
    let app = spawn_app(AppConfig::default());
    let (_admin, token) = app.login_as(Role::Admin).await;
    let user = app.seed_user(Role::User).await;

    let response = app.send(login_request(&user, Some(&token))).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let session: SessionResponse = read_json(response).await;
    assert_eq!(session.token, token);

    let context = Uuid::parse_str(&token).unwrap();
    let current = app.sessions.current(context).await.unwrap();
    assert_eq!(current.role(), Role::User);
}
