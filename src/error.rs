use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Validation error: {0}")]
    ValidationErrors(#[from] validator::ValidationErrors),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("State conflict: {0}")]
    StateConflict(String),

    #[error("Attempt limit exceeded: {0}")]
    AttemptLimitExceeded(String),

    #[error("Attempt already in progress: {0}")]
    AttemptAlreadyInProgress(String),

    #[error("Retake not allowed: {0}")]
    RetakeNotAllowed(String),

    /// Aggregate version moved under us. The only retryable class.
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("Forbidden: {0}")]
    Policy(String),

    /// A stored answer key is malformed. Aborts the submission instead of
    /// committing a wrong score.
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn slug(&self) -> &'static str {
        match self {
            Error::Config(_) => "config_error",
            Error::Validation(_) | Error::ValidationErrors(_) => "validation_failed",
            Error::NotFound(_) => "not_found",
            Error::StateConflict(_) => "state_conflict",
            Error::AttemptLimitExceeded(_) => "attempt_limit_exceeded",
            Error::AttemptAlreadyInProgress(_) => "attempt_already_in_progress",
            Error::RetakeNotAllowed(_) => "retake_not_allowed",
            Error::ConcurrencyConflict(_) => "concurrency_conflict",
            Error::Policy(_) => "forbidden",
            Error::DataIntegrity(_) => "data_integrity",
            Error::Json(_) => "invalid_json",
            Error::Anyhow(_) => "bad_request",
            Error::Io(_) => "io_error",
            Error::Internal(_) => "internal_error",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ConcurrencyConflict(_))
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            Error::Validation(_) | Error::ValidationErrors(_) | Error::Json(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::StateConflict(_)
            | Error::AttemptLimitExceeded(_)
            | Error::AttemptAlreadyInProgress(_)
            | Error::RetakeNotAllowed(_)
            | Error::ConcurrencyConflict(_) => StatusCode::CONFLICT,
            Error::Policy(_) => StatusCode::FORBIDDEN,
            Error::Anyhow(_) => StatusCode::BAD_REQUEST,
            Error::Config(_)
            | Error::DataIntegrity(_)
            | Error::Io(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.slug(), "message": self.to_string() }));
        (status, body).into_response()
    }
}
