use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{
    audit::{AuditAction, NewAuditEntry, clip_details},
    config::{AppConfig, DeletePolicy},
    error::{AppError, Redirect},
    models::{
        ApproveRequest, ContentRecord, ContentStatus, RejectRequest, Review, SubmitContentRequest,
        UpdateContentRequest, User, VerificationResult,
    },
    repository::RepositoryState,
    session::{Role, Session},
    verification::VerificationWorker,
};

/// SubmissionReceipt
///
/// What a submission or a verification request hands back: the record as stored, and
/// the detached verification task if one was started. Handlers drop the handle; tests
/// may await it.
pub struct SubmissionReceipt {
    pub record: ContentRecord,
    pub verification: Option<JoinHandle<()>>,
}

/// ModerationWorkflow
///
/// The content state machine. Every command takes a session that already passed the
/// access guard and re-checks the role the command itself needs. Status changes go
/// through conditional repository writes, so a command that loses a race is refused
/// instead of overwriting a decision.
///
/// ```text
/// pending ──► ai_verifying ──► approved | rejected
///    └──────────────────────► approved | rejected
/// approved | rejected ──reopen──► pending
/// ```
#[derive(Clone)]
pub struct ModerationWorkflow {
    repo: RepositoryState,
    worker: VerificationWorker,
    auto_verify: bool,
    delete_policy: DeletePolicy,
}

fn require_admin_class(session: &Session) -> Result<(), AppError> {
    if session.role().is_admin_class() {
        Ok(())
    } else {
        Err(AppError::denied_to_home())
    }
}

impl ModerationWorkflow {
    pub fn new(repo: RepositoryState, worker: VerificationWorker, config: &AppConfig) -> Self {
        Self {
            repo,
            worker,
            auto_verify: config.auto_verify_submissions,
            delete_policy: config.delete_policy,
        }
    }

    /// submit
    ///
    /// Any authenticated role may submit. Every submission starts `pending` with no
    /// verdict, whoever sent it; with auto-verification on it moves straight to
    /// `ai_verifying` and the worker is dispatched.
    pub async fn submit(
        &self,
        session: &Session,
        req: SubmitContentRequest,
    ) -> Result<SubmissionReceipt, AppError> {
        req.validate()?;

        let record = self.repo.create_content(req, session.user_id()).await?;
        tracing::info!(
            content_id = %record.id,
            kind = ?record.kind,
            submitted_by = %session.user_id(),
            "content submitted"
        );

        if !self.auto_verify {
            return Ok(SubmissionReceipt {
                record,
                verification: None,
            });
        }

        match self.repo.begin_verification(record.id).await {
            Some(verifying) => {
                let handle = self.worker.dispatch(verifying.id);
                Ok(SubmissionReceipt {
                    record: verifying,
                    verification: Some(handle),
                })
            }
            // Someone else moved it already; the submission itself still succeeded.
            None => Ok(SubmissionReceipt {
                record,
                verification: None,
            }),
        }
    }

    /// request_verification
    ///
    /// Editors and admins route a record to the worker. Re-requesting on a record that
    /// is already `ai_verifying` simply re-runs the worker, which overwrites the prior
    /// advisory verdict.
    pub async fn request_verification(
        &self,
        session: &Session,
        id: Uuid,
    ) -> Result<SubmissionReceipt, AppError> {
        if !(session.role() == Role::Editor || session.role().is_admin_class()) {
            return Err(AppError::denied_to_home());
        }

        let record = self.repo.get_content(id).await.ok_or(AppError::NotFound)?;

        let record = match record.status {
            ContentStatus::Pending => match self.repo.begin_verification(id).await {
                Some(updated) => updated,
                None => self.refetch_verifying(id).await?,
            },
            ContentStatus::AiVerifying => record,
            status => {
                return Err(AppError::InvalidTransition(format!(
                    "cannot verify a record that is already {}",
                    status.as_str()
                )));
            }
        };

        tracing::info!(
            content_id = %id,
            requested_by = %session.user_id(),
            "verification requested"
        );
        let handle = self.worker.dispatch(id);

        Ok(SubmissionReceipt {
            record,
            verification: Some(handle),
        })
    }

    async fn refetch_verifying(&self, id: Uuid) -> Result<ContentRecord, AppError> {
        match self.repo.get_content(id).await {
            Some(r) if r.status == ContentStatus::AiVerifying => Ok(r),
            Some(r) => Err(AppError::InvalidTransition(format!(
                "cannot verify a record that is already {}",
                r.status.as_str()
            ))),
            None => Err(AppError::NotFound),
        }
    }

    /// approve
    ///
    /// Admin-class only. A record whose verdict is `error` can only be approved with
    /// `override_verification_error`, which is stored on the record and audited.
    pub async fn approve(
        &self,
        session: &Session,
        id: Uuid,
        req: ApproveRequest,
    ) -> Result<ContentRecord, AppError> {
        require_admin_class(session)?;
        let record = self.reviewable(id, ContentStatus::Approved).await?;

        let errored = record.ai_verification_result == VerificationResult::Error;
        if errored && !req.override_verification_error {
            return Err(AppError::InvalidTransition(
                "verification reported an error; set override_verification_error to approve anyway"
                    .to_string(),
            ));
        }

        let review = Review {
            status: ContentStatus::Approved,
            reviewed_by: session.user_id(),
            approval_override: errored,
        };
        let updated = self.apply_review(id, review).await?;

        let action = if errored {
            AuditAction::ApproveOverride
        } else {
            AuditAction::Approve
        };
        let details = review_details(&record, ContentStatus::Approved, req.note.as_deref());
        self.emit(NewAuditEntry::for_content(action, session, &updated, details))
            .await;

        tracing::info!(
            content_id = %id,
            approved_by = %session.user_id(),
            override = errored,
            "content approved"
        );
        Ok(updated)
    }

    /// reject
    ///
    /// Admin-class only. Rejected content stays off every public read path until an
    /// admin explicitly reopens it.
    pub async fn reject(
        &self,
        session: &Session,
        id: Uuid,
        req: RejectRequest,
    ) -> Result<ContentRecord, AppError> {
        require_admin_class(session)?;
        let record = self.reviewable(id, ContentStatus::Rejected).await?;

        let review = Review {
            status: ContentStatus::Rejected,
            reviewed_by: session.user_id(),
            approval_override: false,
        };
        let updated = self.apply_review(id, review).await?;

        let details = review_details(&record, ContentStatus::Rejected, req.note.as_deref());
        self.emit(NewAuditEntry::for_content(
            AuditAction::Reject,
            session,
            &updated,
            details,
        ))
        .await;

        tracing::info!(content_id = %id, rejected_by = %session.user_id(), "content rejected");
        Ok(updated)
    }

    async fn reviewable(&self, id: Uuid, target: ContentStatus) -> Result<ContentRecord, AppError> {
        let record = self.repo.get_content(id).await.ok_or(AppError::NotFound)?;
        if !record.status.can_transition_to(target) {
            return Err(AppError::InvalidTransition(format!(
                "cannot move a {} record to {}",
                record.status.as_str(),
                target.as_str()
            )));
        }
        Ok(record)
    }

    async fn apply_review(&self, id: Uuid, review: Review) -> Result<ContentRecord, AppError> {
        match self.repo.set_review(id, review).await {
            Some(updated) => Ok(updated),
            None => match self.repo.get_content(id).await {
                Some(current) => Err(AppError::InvalidTransition(format!(
                    "record changed during review and is now {} with verdict {:?}",
                    current.status.as_str(),
                    current.ai_verification_result
                ))),
                None => Err(AppError::NotFound),
            },
        }
    }

    /// reopen
    ///
    /// Admin-class only. The one way out of a terminal state.
    pub async fn reopen(&self, session: &Session, id: Uuid) -> Result<ContentRecord, AppError> {
        require_admin_class(session)?;

        let record = self.repo.get_content(id).await.ok_or(AppError::NotFound)?;
        if !record.status.is_terminal() {
            return Err(AppError::InvalidTransition(format!(
                "only approved or rejected records can be reopened, this one is {}",
                record.status.as_str()
            )));
        }

        let updated = match self.repo.reopen_content(id).await {
            Some(updated) => updated,
            None => {
                return Err(AppError::InvalidTransition(
                    "record changed while it was being reopened".to_string(),
                ));
            }
        };

        self.emit(NewAuditEntry::for_content(
            AuditAction::Reopen,
            session,
            &updated,
            format!("{} -> pending", record.status.as_str()),
        ))
        .await;

        tracing::info!(content_id = %id, reopened_by = %session.user_id(), "content reopened");
        Ok(updated)
    }

    /// edit
    ///
    /// The submitter may edit their own undecided record; editors and admins may edit
    /// any undecided record. Decided records are never edited in place: they must be
    /// reopened first so changed text always goes back through review. Changing the
    /// text of a record under verification re-dispatches the worker for the new version.
    pub async fn edit(
        &self,
        session: &Session,
        id: Uuid,
        req: UpdateContentRequest,
    ) -> Result<SubmissionReceipt, AppError> {
        if req.is_empty() {
            return Err(AppError::Validation("no changes supplied".to_string()));
        }
        req.validate()?;

        let record = self.repo.get_content(id).await.ok_or(AppError::NotFound)?;

        let privileged = session.role() == Role::Editor || session.role().is_admin_class();
        if !privileged && record.created_by != session.user_id() {
            return Err(AppError::denied_to_home());
        }

        if record.status.is_terminal() {
            return Err(AppError::InvalidTransition(format!(
                "{} records must be reopened before they can be edited",
                record.status.as_str()
            )));
        }

        let updated = match self.repo.update_content(id, &req).await {
            Some(updated) => updated,
            None => {
                return Err(AppError::InvalidTransition(
                    "record was decided while the edit was in flight".to_string(),
                ));
            }
        };

        let details = if req.changes_content() {
            format!("content revised to version {}", updated.version)
        } else {
            "classification updated".to_string()
        };
        self.emit(NewAuditEntry::for_content(
            AuditAction::Edit,
            session,
            &updated,
            details,
        ))
        .await;

        let reverify = updated.status == ContentStatus::AiVerifying && req.changes_content();
        let verification = if reverify {
            tracing::info!(
                content_id = %id,
                version = updated.version,
                "content revised during verification, re-dispatching"
            );
            Some(self.worker.dispatch(id))
        } else {
            None
        };

        Ok(SubmissionReceipt {
            record: updated,
            verification,
        })
    }

    /// delete
    ///
    /// Governed by the configured `DeletePolicy`, identically for every content kind.
    /// An in-flight verification of the deleted record finds nothing to write to.
    pub async fn delete(&self, session: &Session, id: Uuid) -> Result<(), AppError> {
        let allowed = match self.delete_policy {
            DeletePolicy::AnyAdmin => session.role().is_admin_class(),
            DeletePolicy::SuperAdminOnly => session.role() == Role::SuperAdmin,
        };
        if !allowed {
            let redirect = if session.role().is_admin_class() {
                Redirect::AdminHome
            } else {
                Redirect::Home
            };
            return Err(AppError::AuthorizationDenied { redirect });
        }

        let record = self.repo.get_content(id).await.ok_or(AppError::NotFound)?;
        if !self.repo.delete_content(id).await {
            return Err(AppError::NotFound);
        }

        self.emit(NewAuditEntry::for_content(
            AuditAction::Delete,
            session,
            &record,
            format!("deleted while {}", record.status.as_str()),
        ))
        .await;

        tracing::info!(content_id = %id, deleted_by = %session.user_id(), "content deleted");
        Ok(())
    }

    /// change_role
    ///
    /// Super-admin only. Sessions already issued keep the role they were issued with
    /// until the user logs in again.
    pub async fn change_role(
        &self,
        session: &Session,
        user_id: Uuid,
        role: Role,
    ) -> Result<User, AppError> {
        if session.role() != Role::SuperAdmin {
            return Err(AppError::AuthorizationDenied {
                redirect: Redirect::AdminHome,
            });
        }

        let previous = self.repo.get_user(user_id).await.ok_or(AppError::NotFound)?;
        let updated = self
            .repo
            .set_user_role(user_id, role)
            .await
            .ok_or(AppError::NotFound)?;

        self.emit(NewAuditEntry::for_profile(
            AuditAction::ChangeRole,
            session,
            &updated,
            format!("{} -> {}", previous.role.as_str(), role.as_str()),
        ))
        .await;

        tracing::info!(
            user_id = %user_id,
            role = role.as_str(),
            changed_by = %session.user_id(),
            "role changed"
        );
        Ok(updated)
    }

    /// The transition already happened; a failing audit write is logged, not surfaced.
    async fn emit(&self, entry: NewAuditEntry) {
        match entry.into_entry() {
            Ok(entry) => {
                if let Err(e) = self.repo.record_audit(entry).await {
                    tracing::error!("audit write failed: {}", e);
                }
            }
            Err(e) => tracing::error!("audit entry rejected: {}", e),
        }
    }
}

fn review_details(record: &ContentRecord, target: ContentStatus, note: Option<&str>) -> String {
    let mut details = format!(
        "{} -> {}; verdict {:?}",
        record.status.as_str(),
        target.as_str(),
        record.ai_verification_result
    );
    if let Some(note) = note.filter(|n| !n.trim().is_empty()) {
        details.push_str("; note: ");
        details.push_str(note.trim());
    }
    clip_details(&details)
}
