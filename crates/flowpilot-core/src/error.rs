//! Unified error types for Flowpilot

use std::time::Duration;
use thiserror::Error;

/// Unified error type for all Flowpilot operations
#[derive(Error, Debug)]
pub enum FlowError {
    // Browser errors
    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("Timed out after {waited:?} waiting for {what}")]
    WaitTimeout { what: String, waited: Duration },

    #[error("Submit control '{label}' never became enabled within {waited:?}")]
    SubmitDisabled { label: String, waited: Duration },

    // Generation errors
    #[error("Backend still reports '{label}' after {attempts} attempts")]
    BackendBroken { label: String, attempts: u32 },

    #[error("Expected at least {expected} new results, found {found}")]
    NoResults { expected: usize, found: usize },

    #[error("Invalid poll transition: {0}")]
    InvalidTransition(String),

    // Artifact errors
    #[error("Download failed: {0}")]
    Download(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

/// Result type alias using FlowError
pub type Result<T> = std::result::Result<T, FlowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_broken_message_carries_label() {
        let err = FlowError::BackendBroken {
            label: "Something went wrong".to_string(),
            attempts: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("Something went wrong"));
        assert!(msg.contains('3'));
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: FlowError = io.into();
        assert!(matches!(err, FlowError::Io(_)));
    }
}
