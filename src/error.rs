use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::{dao::storage::StorageError, state::state_machine::PlanError};

/// User-facing validation failures with a stable machine-readable code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    /// The quiz has no questions to play.
    #[error("this quiz has no questions yet; add at least one question before hosting it")]
    NoQuestions,
    /// A private quiz can only be hosted by its owner.
    #[error("this quiz is private; only its owner can host it")]
    NotQuizOwner,
    /// No open session uses the PIN.
    #[error("no open game uses this PIN; check the code and try again")]
    InvalidPin,
    /// Another participant already uses the nickname.
    #[error("this nickname is already taken in this game; pick another one")]
    DuplicateNickname,
    /// The game already started.
    #[error("this game has already started; late joins are not allowed")]
    LateJoin,
    /// Self-paced sessions have a single implicit player.
    #[error("this game does not accept players through the lobby")]
    RosterClosed,
    /// Answers are only accepted once play starts.
    #[error("the game has not started yet")]
    NotStarted,
    /// The session clock ran out.
    #[error("time is up; answers are no longer accepted")]
    TimeExpired,
    /// The game is over.
    #[error("this game is finished")]
    SessionClosed,
    /// Generation prompt too short.
    #[error("the prompt must be at least 20 characters long")]
    InvalidPrompt,
    /// Generation prompt too vague.
    #[error("the prompt is too generic; describe a specific topic")]
    GenericPrompt,
}

impl Rejection {
    /// Stable snake_case code returned to clients.
    pub fn code(self) -> &'static str {
        match self {
            Rejection::NoQuestions => "no_questions",
            Rejection::NotQuizOwner => "not_quiz_owner",
            Rejection::InvalidPin => "invalid_pin",
            Rejection::DuplicateNickname => "duplicate_nickname",
            Rejection::LateJoin => "late_join",
            Rejection::RosterClosed => "roster_closed",
            Rejection::NotStarted => "not_started",
            Rejection::TimeExpired => "time_expired",
            Rejection::SessionClosed => "session_closed",
            Rejection::InvalidPrompt => "invalid_prompt",
            Rejection::GenericPrompt => "generic_prompt",
        }
    }

    fn status(self) -> StatusCode {
        match self {
            Rejection::NoQuestions | Rejection::InvalidPrompt | Rejection::GenericPrompt => {
                StatusCode::BAD_REQUEST
            }
            Rejection::NotQuizOwner => StatusCode::FORBIDDEN,
            Rejection::InvalidPin => StatusCode::NOT_FOUND,
            Rejection::DuplicateNickname
            | Rejection::LateJoin
            | Rejection::RosterClosed
            | Rejection::NotStarted
            | Rejection::TimeExpired
            | Rejection::SessionClosed => StatusCode::CONFLICT,
        }
    }
}

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Request refused for a reason the user can act on.
    #[error(transparent)]
    Rejected(Rejection),
    /// Caller identity is missing.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Caller is known but not allowed to do this.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// A third-party service failed or answered garbage.
    #[error("upstream failure: {0}")]
    Upstream(String),
    /// Operation exceeded its timeout limit.
    #[error("operation timed out")]
    Timeout,
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict { message } => ServiceError::InvalidState(message),
            other => ServiceError::Unavailable(other),
        }
    }
}

impl From<Rejection> for ServiceError {
    fn from(rejection: Rejection) -> Self {
        ServiceError::Rejected(rejection)
    }
}

impl From<PlanError> for ServiceError {
    fn from(err: PlanError) -> Self {
        ServiceError::InvalidState(err.to_string())
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Missing caller identity.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Caller not allowed.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Actionable refusal carrying its code.
    #[error("{0}")]
    Rejected(Rejection),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::Rejected(rejection) => AppError::Rejected(rejection),
            ServiceError::Unauthorized(message) => AppError::Unauthorized(message),
            ServiceError::Forbidden(message) => AppError::Forbidden(message),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::InvalidState(message) => AppError::Conflict(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::Upstream(message) => AppError::Internal(message),
            ServiceError::Timeout => AppError::ServiceUnavailable("operation timed out".into()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, code) = match &self {
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, None),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, None),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, None),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, None),
            AppError::Conflict(_) => (StatusCode::CONFLICT, None),
            AppError::Rejected(rejection) => (rejection.status(), Some(rejection.code())),
            AppError::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, None),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, None),
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
            code,
        });

        (status, payload).into_response()
    }
}
