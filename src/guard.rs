use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::{AppError, Redirect},
    session::{Expiry, Role, Session, SessionState},
};

/// Why a caller is being sent to the login page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginReason {
    MustAuthenticate,
    SessionExpired,
}

impl LoginReason {
    pub fn message(&self) -> &'static str {
        match self {
            LoginReason::MustAuthenticate => "must authenticate",
            LoginReason::SessionExpired => "session expired",
        }
    }
}

/// The outcome of an access check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow(Session),
    RedirectLogin(LoginReason),
    RedirectHome,
    RedirectAdminHome,
}

impl Decision {
    /// Collapses the decision into the error taxonomy used by handlers.
    pub fn into_result(self) -> Result<Session, AppError> {
        match self {
            Decision::Allow(session) => Ok(session),
            Decision::RedirectLogin(LoginReason::MustAuthenticate) => {
                Err(AppError::AuthenticationRequired)
            }
            Decision::RedirectLogin(LoginReason::SessionExpired) => Err(AppError::SessionExpired),
            Decision::RedirectHome => Err(AppError::AuthorizationDenied {
                redirect: Redirect::Home,
            }),
            Decision::RedirectAdminHome => Err(AppError::AuthorizationDenied {
                redirect: Redirect::AdminHome,
            }),
        }
    }
}

/// Step 3/4 of the access check, for a session already known to be live.
pub fn role_decision(session: Session, required: &[Role]) -> Decision {
    if session.role().accepted_by(required) {
        Decision::Allow(session)
    } else if session.role().is_admin_class() {
        Decision::RedirectAdminHome
    } else {
        Decision::RedirectHome
    }
}

/// AccessGuard
///
/// Decides, per request, whether the caller behind a session context may proceed.
/// Expiry is always resolved before the role check, so an expired admin is sent to
/// re-authenticate rather than to a page for some other role.
#[derive(Clone)]
pub struct AccessGuard {
    sessions: SessionState,
}

impl AccessGuard {
    pub fn new(sessions: SessionState) -> Self {
        Self { sessions }
    }

    pub async fn authorize(&self, context: Option<Uuid>, required: &[Role]) -> Decision {
        self.authorize_at(context, required, Utc::now()).await
    }

    pub async fn authorize_at(
        &self,
        context: Option<Uuid>,
        required: &[Role],
        now: DateTime<Utc>,
    ) -> Decision {
        let Some(context) = context else {
            return Decision::RedirectLogin(LoginReason::MustAuthenticate);
        };
        let Some(session) = self.sessions.current(context).await else {
            return Decision::RedirectLogin(LoginReason::MustAuthenticate);
        };

        if session.role().is_admin_class()
            && self.sessions.expire_at(context, &session, now).await == Expiry::Expired
        {
            return Decision::RedirectLogin(LoginReason::SessionExpired);
        }

        role_decision(session, required)
    }

    /// `authorize` for handlers: anything but `Allow` becomes the matching `AppError`.
    pub async fn require(
        &self,
        context: Option<Uuid>,
        required: &[Role],
    ) -> Result<Session, AppError> {
        let decision = self.authorize(context, required).await;
        if let Decision::RedirectLogin(reason) = &decision {
            tracing::debug!(reason = reason.message(), "access check redirected to login");
        }
        decision.into_result()
    }
}
