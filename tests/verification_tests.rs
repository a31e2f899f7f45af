use axum::{Json, Router, http::StatusCode, routing::post};
use sakhi_portal::{
    models::{ContentKind, ContentRecord, VerificationResult},
    verification::{
        EvaluationError, EvaluationRequest, EvaluationService, EvaluationState,
        HttpEvaluationClient, MockBehavior, MockEvaluationService, Verifier,
    },
};
use serde_json::{Value, json};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;

fn record() -> ContentRecord {
    ContentRecord {
        kind: ContentKind::Scheme,
        title: "Maternity Benefit Scheme".to_string(),
        title_ta: "மகப்பேறு நலத் திட்டம்".to_string(),
        category: "health".to_string(),
        ..Default::default()
    }
}

fn verifier(evaluator: Arc<MockEvaluationService>) -> Verifier {
    Verifier::new(evaluator as EvaluationState, Duration::from_millis(1))
}

#[tokio::test]
async fn verification_is_idempotent_on_unchanged_input() {
    let evaluator = Arc::new(MockEvaluationService::verifying());
    let verifier = verifier(evaluator.clone());
    let record = record();

    let first = verifier.verify(&record).await;
    let second = verifier.verify(&record).await;

    assert_eq!(first.result, VerificationResult::Verified);
    assert_eq!(first.result, second.result);
    assert_eq!(evaluator.calls(), 2);
}

#[tokio::test]
async fn a_single_failure_is_retried() {
    let evaluator = Arc::new(MockEvaluationService::new(MockBehavior::FailTimes(1)));
    let verdict = verifier(evaluator.clone()).verify(&record()).await;

    assert_eq!(verdict.result, VerificationResult::Verified);
    assert_eq!(evaluator.calls(), 2);
}

#[tokio::test]
async fn two_failures_yield_an_error_verdict() {
    let evaluator = Arc::new(MockEvaluationService::failing());
    let verdict = verifier(evaluator.clone()).verify(&record()).await;

    assert_eq!(verdict.result, VerificationResult::Error);
    assert!(verdict.notes.contains("review this item manually"));
    // One attempt plus exactly one retry.
    assert_eq!(evaluator.calls(), 2);
}

#[tokio::test]
async fn evaluator_rejection_is_not_verified() {
    let evaluator = Arc::new(MockEvaluationService::new(MockBehavior::Reject(
        "Scheme was withdrawn in 2019".to_string(),
    )));
    let verdict = verifier(evaluator).verify(&record()).await;

    assert_eq!(verdict.result, VerificationResult::NotVerified);
    assert_eq!(verdict.notes, "Scheme was withdrawn in 2019");
}

#[tokio::test]
async fn screening_failures_skip_the_evaluator() {
    let evaluator = Arc::new(MockEvaluationService::verifying());
    let mut record = record();
    record.title_ta = record.title.clone();

    let verdict = verifier(evaluator.clone()).verify(&record).await;

    assert_eq!(verdict.result, VerificationResult::NotVerified);
    assert!(verdict.notes.contains("no Tamil script"));
    assert!(verdict.notes.contains("identical"));
    assert_eq!(evaluator.calls(), 0);
}

// --- HTTP client against a local stub ---

async fn spawn_stub(status: StatusCode, body: Value) -> String {
    let app = Router::new().route(
        "/evaluate",
        post(move |Json(_payload): Json<Value>| {
            let body = body.clone();
            async move { (status, Json(body)) }
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://127.0.0.1:{}/evaluate", port)
}

#[tokio::test]
async fn http_client_parses_verdicts() {
    let url = spawn_stub(
        StatusCode::OK,
        json!({"verdict": "verified", "rationale": "Listed on the ministry portal"}),
    )
    .await;
    let client =
        HttpEvaluationClient::new(&url, Some("key".to_string()), Duration::from_secs(5)).unwrap();

    let assessment = client
        .evaluate(&EvaluationRequest::from(&record()))
        .await
        .unwrap();

    assert!(assessment.verified);
    assert_eq!(assessment.rationale, "Listed on the ministry portal");
}

#[tokio::test]
async fn http_client_reports_upstream_status() {
    let url = spawn_stub(StatusCode::SERVICE_UNAVAILABLE, json!({})).await;
    let client = HttpEvaluationClient::new(&url, None, Duration::from_secs(5)).unwrap();

    let result = client.evaluate(&EvaluationRequest::from(&record())).await;

    assert!(matches!(result, Err(EvaluationError::Upstream(503))));
}

#[tokio::test]
async fn http_client_rejects_unknown_verdicts() {
    let url = spawn_stub(StatusCode::OK, json!({"verdict": "maybe"})).await;
    let client = HttpEvaluationClient::new(&url, None, Duration::from_secs(5)).unwrap();

    let result = client.evaluate(&EvaluationRequest::from(&record())).await;

    assert!(matches!(result, Err(EvaluationError::Malformed(_))));
}
