//! Unified error types for the vstab ecosystem
//!
//! This module provides a common error type [`CoreError`] that can represent
//! errors from any part of the system. Domain-specific error types convert to
//! `CoreError` for uniform handling at API boundaries.

use thiserror::Error;

/// Unified error type for model-level operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// I/O errors (file access etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Data validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Network structure errors
    #[error("Network error: {0}")]
    Network(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Parse(err.to_string())
    }
}

impl From<String> for CoreError {
    fn from(s: String) -> Self {
        CoreError::Other(s)
    }
}

impl From<&str> for CoreError {
    fn from(s: &str) -> Self {
        CoreError::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CoreError::Validation("bus 3 has no type".into());
        assert!(err.to_string().contains("Validation error"));
    }

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CoreError = io_err.into();
        assert!(matches!(err, CoreError::Io(_)));
    }

    #[test]
    fn question_mark_operator() {
        fn inner() -> CoreResult<()> {
            Err(CoreError::Network("island".into()))
        }
        fn outer() -> CoreResult<()> {
            inner()?;
            Ok(())
        }
        assert!(outer().is_err());
    }
}
