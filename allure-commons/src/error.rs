//! Error types for Allure operations.
//!
//! Lifecycle operations never return these to instrumented code; they surface
//! from results sinks, attachment writers and configuration, and the lifecycle
//! logs them.

use thiserror::Error;

/// Result type alias for Allure operations.
pub type AllureResult<T> = Result<T, AllureError>;

/// Errors that can occur during Allure operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AllureError {
    /// I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error with a descriptive message.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Attachment content could not be accepted.
    #[error("Invalid attachment: {0}")]
    InvalidAttachment(String),
}

impl AllureError {
    /// Creates a new configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        AllureError::Configuration(message.into())
    }

    /// Creates a new invalid attachment error.
    pub fn invalid_attachment(message: impl Into<String>) -> Self {
        AllureError::InvalidAttachment(message.into())
    }
}
