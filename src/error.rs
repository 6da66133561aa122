//! Typed error taxonomy for the ingestion and retrieval core.
//!
//! Adapters and pipeline stages return [`CoreError`]; the CLI boundary
//! converts it into `anyhow::Error` for display, matching the rest of the
//! crate's convention of typed errors internally and `anyhow` at the edge.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("bad input: {0}")]
    BadInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::BadInput(_) => "bad_input",
            CoreError::NotFound(_) => "not_found",
            CoreError::Forbidden(_) => "forbidden",
            CoreError::Conflict(_) => "conflict",
            CoreError::Upstream(_) => "upstream",
            CoreError::Extraction(_) => "extraction",
            CoreError::Embedding(_) => "embedding",
            CoreError::Storage(_) => "storage",
            CoreError::Internal(_) => "internal",
        }
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(e: sqlx::Error) -> Self {
        CoreError::Storage(e.to_string())
    }
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::Storage(e.to_string())
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        CoreError::Upstream(e.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_strings_are_stable() {
        assert_eq!(CoreError::BadInput("x".into()).kind(), "bad_input");
        assert_eq!(CoreError::Conflict("x".into()).kind(), "conflict");
        assert_eq!(CoreError::Internal("x".into()).kind(), "internal");
    }

    #[test]
    fn storage_error_wraps_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: CoreError = io_err.into();
        assert_eq!(err.kind(), "storage");
    }
}
