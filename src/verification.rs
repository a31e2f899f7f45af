use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use thiserror::Error;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{ContentKind, ContentRecord, Verdict, VerificationResult},
    repository::RepositoryState,
};

const TITLE_MIN_CHARS: usize = 3;
const TITLE_MAX_CHARS: usize = 300;

/// EvaluationError
///
/// Why the external evaluation service could not produce an assessment.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvaluationError {
    #[error("evaluation service unreachable: {0}")]
    Unreachable(String),
    #[error("evaluation service returned status {0}")]
    Upstream(u16),
    #[error("evaluation service sent a malformed response: {0}")]
    Malformed(String),
}

/// The payload sent to the evaluation service.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationRequest {
    pub kind: ContentKind,
    pub category: String,
    pub title: String,
    pub title_ta: String,
    pub description: String,
    pub description_ta: String,
    pub body: String,
    pub body_ta: String,
}

impl From<&ContentRecord> for EvaluationRequest {
    fn from(record: &ContentRecord) -> Self {
        Self {
            kind: record.kind,
            category: record.category.clone(),
            title: record.title.clone(),
            title_ta: record.title_ta.clone(),
            description: record.description.clone(),
            description_ta: record.description_ta.clone(),
            body: record.body.clone(),
            body_ta: record.body_ta.clone(),
        }
    }
}

/// The evaluation service's judgement of one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assessment {
    pub verified: bool,
    pub rationale: String,
}

// 1. EvaluationService Contract
/// EvaluationService
///
/// The automated reviewer consulted by the verification worker once a submission has
/// passed the local screening. Swappable so tests never need the network.
#[async_trait]
pub trait EvaluationService: Send + Sync {
    async fn evaluate(&self, request: &EvaluationRequest) -> Result<Assessment, EvaluationError>;
}

/// EvaluationState
///
/// The shared handle to the evaluation service held in `AppState`.
pub type EvaluationState = Arc<dyn EvaluationService>;

// 2. The Real Implementation (HTTP)
/// HttpEvaluationClient
///
/// Posts the submission as JSON to the configured endpoint and expects
/// `{"verdict": "verified" | "not_verified", "rationale": "..."}` back.
#[derive(Clone)]
pub struct HttpEvaluationClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct EvaluationResponse {
    verdict: String,
    #[serde(default)]
    rationale: String,
}

impl HttpEvaluationClient {
    pub fn new(
        endpoint: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, EvaluationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EvaluationError::Unreachable(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl EvaluationService for HttpEvaluationClient {
    async fn evaluate(&self, request: &EvaluationRequest) -> Result<Assessment, EvaluationError> {
        let mut call = self.client.post(&self.endpoint).json(request);
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key);
        }

        let response = call
            .send()
            .await
            .map_err(|e| EvaluationError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EvaluationError::Upstream(response.status().as_u16()));
        }

        let body = response
            .json::<EvaluationResponse>()
            .await
            .map_err(|e| EvaluationError::Malformed(e.to_string()))?;

        match body.verdict.as_str() {
            "verified" => Ok(Assessment {
                verified: true,
                rationale: body.rationale,
            }),
            "not_verified" => Ok(Assessment {
                verified: false,
                rationale: body.rationale,
            }),
            other => Err(EvaluationError::Malformed(format!("unknown verdict '{other}'"))),
        }
    }
}

/// OfflineEvaluator
///
/// Used when no evaluation endpoint is configured: the local screening is the only check.
#[derive(Clone, Default)]
pub struct OfflineEvaluator;

#[async_trait]
impl EvaluationService for OfflineEvaluator {
    async fn evaluate(&self, _request: &EvaluationRequest) -> Result<Assessment, EvaluationError> {
        Ok(Assessment {
            verified: true,
            rationale: "Automated checks passed; no external evaluator configured".to_string(),
        })
    }
}

// 3. The Mock Implementation (For Tests)
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MockBehavior {
    Verify,
    Reject(String),
    /// Fails this many calls, then verifies.
    FailTimes(usize),
    AlwaysFail,
}

/// MockEvaluationService
///
/// Scripted evaluator that counts how often it was called.
pub struct MockEvaluationService {
    behavior: MockBehavior,
    calls: AtomicUsize,
}

impl MockEvaluationService {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn verifying() -> Self {
        Self::new(MockBehavior::Verify)
    }

    pub fn failing() -> Self {
        Self::new(MockBehavior::AlwaysFail)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EvaluationService for MockEvaluationService {
    async fn evaluate(&self, _request: &EvaluationRequest) -> Result<Assessment, EvaluationError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            MockBehavior::Verify => Ok(Assessment {
                verified: true,
                rationale: "Matches official sources".to_string(),
            }),
            MockBehavior::Reject(reason) => Ok(Assessment {
                verified: false,
                rationale: reason.clone(),
            }),
            MockBehavior::FailTimes(n) if call < *n => Err(EvaluationError::Unreachable(
                "Mock Evaluation Error: Simulation requested".to_string(),
            )),
            MockBehavior::FailTimes(_) => Ok(Assessment {
                verified: true,
                rationale: "Matches official sources".to_string(),
            }),
            MockBehavior::AlwaysFail => Err(EvaluationError::Unreachable(
                "Mock Evaluation Error: Simulation requested".to_string(),
            )),
        }
    }
}

// --- Screening ---

fn contains_tamil(text: &str) -> bool {
    text.chars().any(|c| ('\u{0B80}'..='\u{0BFF}').contains(&c))
}

/// screen
///
/// Deterministic checks every submission must pass before it is worth sending to the
/// evaluation service. Returns the list of problems found.
pub fn screen(record: &ContentRecord) -> Vec<String> {
    let mut issues = Vec::new();

    let title_len = record.title.trim().chars().count();
    if !(TITLE_MIN_CHARS..=TITLE_MAX_CHARS).contains(&title_len) {
        issues.push(format!(
            "English title must be {TITLE_MIN_CHARS}-{TITLE_MAX_CHARS} characters"
        ));
    }

    let pairs = [
        ("title", &record.title, &record.title_ta),
        ("description", &record.description, &record.description_ta),
        ("body", &record.body, &record.body_ta),
    ];
    for (field, en, ta) in pairs {
        if ta.trim().is_empty() {
            continue;
        }
        if !contains_tamil(ta) {
            issues.push(format!("Tamil {field} contains no Tamil script"));
        }
        if en.trim() == ta.trim() {
            issues.push(format!("Tamil {field} is identical to the English {field}"));
        }
    }

    issues
}

/// Verifier
///
/// Produces the advisory verdict for one record: local screening first, then the
/// evaluation service with a single retry.
#[derive(Clone)]
pub struct Verifier {
    evaluator: EvaluationState,
    retry_delay: Duration,
}

impl Verifier {
    pub fn new(evaluator: EvaluationState, retry_delay: Duration) -> Self {
        Self {
            evaluator,
            retry_delay,
        }
    }

    pub async fn verify(&self, record: &ContentRecord) -> Verdict {
        let issues = screen(record);
        if !issues.is_empty() {
            return Verdict {
                result: VerificationResult::NotVerified,
                notes: issues.join("; "),
            };
        }

        let request = EvaluationRequest::from(record);
        match self.evaluate_with_retry(&request).await {
            Ok(assessment) if assessment.verified => Verdict {
                result: VerificationResult::Verified,
                notes: assessment.rationale,
            },
            Ok(assessment) => Verdict {
                result: VerificationResult::NotVerified,
                notes: assessment.rationale,
            },
            Err(e) => Verdict {
                result: VerificationResult::Error,
                notes: format!("{e}. An administrator needs to review this item manually."),
            },
        }
    }

    /// One attempt plus at most one retry.
    async fn evaluate_with_retry(
        &self,
        request: &EvaluationRequest,
    ) -> Result<Assessment, AppError> {
        match self.evaluator.evaluate(request).await {
            Ok(assessment) => Ok(assessment),
            Err(first) => {
                tracing::warn!("evaluation failed, retrying once: {}", first);
                tokio::time::sleep(self.retry_delay).await;
                self.evaluator
                    .evaluate(request)
                    .await
                    .map_err(|e| AppError::VerificationUnavailable(e.to_string()))
            }
        }
    }
}

/// VerificationWorker
///
/// Runs verification out-of-band. The worker only ever writes the verdict columns,
/// bound to the content version it evaluated.
#[derive(Clone)]
pub struct VerificationWorker {
    repo: RepositoryState,
    verifier: Verifier,
}

impl VerificationWorker {
    pub fn new(repo: RepositoryState, verifier: Verifier) -> Self {
        Self { repo, verifier }
    }

    /// Spawns `run` detached. Callers may drop the handle.
    pub fn dispatch(&self, id: Uuid) -> JoinHandle<()> {
        let worker = self.clone();
        tokio::spawn(async move {
            worker.run(id).await;
        })
    }

    /// Verifies the current revision of `id` and writes the verdict back. Returns the
    /// verdict if it was stored.
    pub async fn run(&self, id: Uuid) -> Option<Verdict> {
        let Some(record) = self.repo.get_content(id).await else {
            tracing::info!(content_id = %id, "verification skipped, record no longer exists");
            return None;
        };

        if record.status.is_terminal() {
            tracing::info!(
                content_id = %id,
                status = record.status.as_str(),
                "verification skipped, record already decided"
            );
            return None;
        }

        let verdict = self.verifier.verify(&record).await;

        if self.repo.record_verdict(id, record.version, &verdict).await {
            tracing::info!(
                content_id = %id,
                version = record.version,
                result = ?verdict.result,
                "verification verdict recorded"
            );
            Some(verdict)
        } else {
            tracing::info!(
                content_id = %id,
                version = record.version,
                "verification verdict dropped, record deleted, edited or decided meanwhile"
            );
            None
        }
    }
}
