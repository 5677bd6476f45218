use mongodb::error::{ErrorKind, WriteFailure};
use serde::Serialize;
use thiserror::Error;

/// MongoDB server code for a unique index violation.
const DUPLICATE_KEY_CODE: i32 = 11000;

#[derive(Debug, Clone, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Attempt limit exceeded: {0}")]
    AttemptLimitExceeded(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Concurrent update, retry: {0}")]
    ConflictRetryable(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl AppError {
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::AccessDenied(_) => "ACCESS_DENIED",
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::AttemptLimitExceeded(_) => "ATTEMPT_LIMIT_EXCEEDED",
            AppError::AlreadyExists(_) => "ALREADY_EXISTS",
            AppError::ConflictRetryable(_) => "CONFLICT_RETRYABLE",
            AppError::InvalidState(_) => "INVALID_STATE",
            AppError::Timeout(_) => "TIMEOUT",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// Errors a caller may resend unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::ConflictRetryable(_) | AppError::Timeout(_))
    }
}

/// Body shape handed to whatever transport sits in front of the engine.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    pub retryable: bool,
}

impl From<&AppError> for ErrorResponse {
    fn from(err: &AppError) -> Self {
        ErrorResponse {
            error: err.to_string(),
            code: err.error_code(),
            retryable: err.is_retryable(),
        }
    }
}

pub fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => {
            write_error.code == DUPLICATE_KEY_CODE
        }
        ErrorKind::Command(command_error) => command_error.code == DUPLICATE_KEY_CODE,
        _ => false,
    }
}

impl From<mongodb::error::Error> for AppError {
    fn from(err: mongodb::error::Error) -> Self {
        if is_duplicate_key(&err) {
            AppError::AlreadyExists(err.to_string())
        } else {
            AppError::DatabaseError(err.to_string())
        }
    }
}
impl From<mongodb::bson::ser::Error> for AppError {
    fn from(err: mongodb::bson::ser::Error) -> Self {
        AppError::InternalError(format!("BSON serialization error: {}", err))
    }
}
impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::ValidationError(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
