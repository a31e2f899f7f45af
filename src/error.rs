use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Where the client should navigate after an access decision that did not allow the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirect {
    Login,
    Home,
    AdminHome,
}

impl Redirect {
    pub fn path(&self) -> &'static str {
        match self {
            Redirect::Login => "/login",
            Redirect::Home => "/",
            Redirect::AdminHome => "/admin",
        }
    }
}

/// AppError
///
/// The error taxonomy shared by the access boundary and the moderation workflow.
/// Every variant maps to a JSON body; access failures always carry a `redirect`
/// hint so the client navigates instead of rendering a broken page.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Your session has expired. Please log in again.")]
    SessionExpired,

    #[error("You do not have permission to perform this action")]
    AuthorizationDenied { redirect: Redirect },

    /// Only ever produced inside the verification worker; it is recorded on the
    /// record as an `error` verdict and never returned to the submitter.
    #[error("Verification service unavailable: {0}")]
    VerificationUnavailable(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found")]
    NotFound,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl AppError {
    pub fn denied_to_home() -> Self {
        AppError::AuthorizationDenied {
            redirect: Redirect::Home,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::AuthenticationRequired => "authentication_required",
            AppError::SessionExpired => "session_expired",
            AppError::AuthorizationDenied { .. } => "authorization_denied",
            AppError::VerificationUnavailable(_) => "verification_unavailable",
            AppError::InvalidTransition(_) => "invalid_transition",
            AppError::Validation(_) => "validation_failed",
            AppError::NotFound => "not_found",
            AppError::Database(_) => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::AuthenticationRequired | AppError::SessionExpired => StatusCode::UNAUTHORIZED,
            AppError::AuthorizationDenied { .. } => StatusCode::FORBIDDEN,
            AppError::VerificationUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InvalidTransition(_) => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn redirect(&self) -> Option<Redirect> {
        match self {
            AppError::AuthenticationRequired | AppError::SessionExpired => Some(Redirect::Login),
            AppError::AuthorizationDenied { redirect } => Some(*redirect),
            _ => None,
        }
    }
}

/// ErrorResponse
///
/// JSON body returned for every failed request.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Database details stay in the logs, the client gets a generic message.
        let message = match &self {
            AppError::Database(e) => {
                tracing::error!("database error: {:?}", e);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorResponse {
            error: self.code().to_string(),
            message,
            redirect: self.redirect().map(|r| r.path().to_string()),
        };

        (status, Json(body)).into_response()
    }
}
