use sakhi_portal::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    repository::{PostgresRepository, RepositoryState},
    session::{PostgresSessionStore, SessionState},
    verification::{EvaluationState, HttpEvaluationClient, OfflineEvaluator},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, sets up logging, connects and migrates Postgres, wires the
/// stores and the evaluation client into `AppState`, and serves HTTP on port 3000.
#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // RUST_LOG wins over the defaults.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "sakhi_portal=debug,tower_http=info,axum=trace".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("FATAL: Failed to apply database migrations.");

    let repo = Arc::new(PostgresRepository::new(pool.clone())) as RepositoryState;
    let sessions = Arc::new(PostgresSessionStore::new(pool)) as SessionState;

    let evaluator: EvaluationState = match &config.evaluator_url {
        Some(url) => Arc::new(
            HttpEvaluationClient::new(
                url,
                config.evaluator_api_key.clone(),
                config.evaluator_timeout,
            )
            .expect("FATAL: Failed to build the evaluation client."),
        ),
        None => {
            tracing::warn!("EVALUATOR_URL not set, verification relies on screening only");
            Arc::new(OfflineEvaluator)
        }
    };

    let app_state = AppState {
        repo,
        sessions,
        evaluator,
        config,
    };

    let app = create_router(app_state);

    let listener = TcpListener::bind("0.0.0.0:3000")
        .await
        .expect("FATAL: Failed to bind 0.0.0.0:3000");

    tracing::info!("Listening on 0.0.0.0:3000");
    tracing::info!("API Documentation (Swagger UI) available at: http://localhost:3000/swagger-ui");

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated unexpectedly");
}
