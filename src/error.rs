use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;

use crate::dao::storage::StorageError;

/// Failures produced by the match coordinator and its registry.
///
/// Every variant is recovered at the gateway boundary and turned into an
/// `error` event on the offending connection; none of them tears down a
/// session or affects other players.
#[derive(Debug, Error)]
pub enum MatchError {
    /// A command was issued before a successful `authenticate`.
    #[error("not authenticated")]
    NotAuthenticated,
    /// The quiz is missing, inactive, or the content backend failed.
    #[error("quiz content unavailable: {0}")]
    ContentUnavailable(String),
    /// The quiz has zero questions; an unplayable session must never start.
    #[error("quiz has no questions")]
    NoQuestions,
    /// The command is incompatible with the current session status.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// The session already holds its maximum number of players.
    #[error("match is full")]
    SessionFull,
    /// The user is already registered in another live session.
    #[error("already in an active match")]
    AlreadyInSession,
    /// Unknown session id or join code.
    #[error("match not found: {0}")]
    SessionNotFound(String),
    /// The player already submitted an answer for the current question.
    #[error("answer already submitted for this question")]
    DuplicateAnswer,
    /// Join-code generation exhausted its collision retries.
    #[error("could not allocate a unique join code")]
    JoinCodeExhausted,
}

impl MatchError {
    /// Wrap a content-backend failure.
    pub fn content(err: StorageError) -> Self {
        MatchError::ContentUnavailable(err.to_string())
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Unauthorized access attempt.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<MatchError> for AppError {
    fn from(err: MatchError) -> Self {
        match err {
            MatchError::NotAuthenticated => AppError::Unauthorized("not authenticated".into()),
            MatchError::ContentUnavailable(message) => AppError::NotFound(message),
            MatchError::NoQuestions => AppError::BadRequest("quiz has no questions".into()),
            MatchError::InvalidState(message) => AppError::Conflict(message),
            MatchError::SessionFull => AppError::Conflict("match is full".into()),
            MatchError::AlreadyInSession => {
                AppError::Conflict("already in an active match".into())
            }
            MatchError::SessionNotFound(message) => AppError::NotFound(message),
            MatchError::DuplicateAnswer => {
                AppError::Conflict("answer already submitted for this question".into())
            }
            MatchError::JoinCodeExhausted => {
                AppError::ServiceUnavailable("could not allocate a unique join code".into())
            }
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {err}"))
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
