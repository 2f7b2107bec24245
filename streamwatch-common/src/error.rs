// ================================================================
// File: streamwatch-common/src/error.rs
// ================================================================

use thiserror::Error;

use crate::models::batch::BatchFailure;

#[derive(Debug, Error)]
pub enum Error {
    /// A role, rule, member or broadcaster that the caller named does not exist.
    #[error("Not found error: {0}")]
    NotFound(String),

    /// A transient failure of the provider, Discord or the store. Retryable.
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// A batch finished, but some items failed. Carries the failed subset.
    #[error("Partial failure: {0}")]
    PartialFailure(BatchFailure),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Uuid error: {0}")]
    Uuid(#[from] uuid::Error),
}

impl Error {
    /// True when the caller may simply try the same call again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Unavailable(_) | Error::Database(_) | Error::Http(_)
        )
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Parse(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Parse(s.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Parse(e.to_string())
    }
}

impl From<chrono::format::ParseError> for Error {
    fn from(err: chrono::format::ParseError) -> Self {
        Error::Parse(err.to_string())
    }
}
