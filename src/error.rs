//! Error types for deusflow
//!
//! Centralized error handling using thiserror.

use std::time::Duration;

use thiserror::Error;

use crate::feedback::Feedback;
use crate::generator::GeneratorError;

/// All error types that can occur in deusflow
#[derive(Debug, Error)]
pub enum DeusError {
    /// Generator text could not be parsed into the expected shape
    #[error("Malformed output for {field}: {reason}")]
    MalformedOutput { field: String, reason: String },

    /// The refine loop hit its attempt cap without an accepted candidate
    #[error("Retry exhausted for {field} after {attempts} attempts: {}", last.message())]
    RetryExhausted {
        field: String,
        attempts: u32,
        last: Feedback,
    },

    /// Transport or authentication failure at the generator boundary
    #[error("Service error: {0}")]
    Service(String),

    /// A suspension point (generator or human) did not answer in time
    #[error("Timed out after {0:?}")]
    GeneratorTimeout(Duration),

    /// The session was cancelled by its caller
    #[error("Cancelled")]
    Cancelled,

    /// The human answered the reserved "stop" sentinel
    #[error("Scope gathering aborted by user")]
    ScopeAborted,

    /// A feedback bundle was read before anything was appended
    #[error("Feedback bundle is empty")]
    EmptyBundle,

    /// Invalid state transition or operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Prompt template rendering failed
    #[error("Template error: {0}")]
    Template(String),

    /// Tool catalog or executor error
    #[error("Tool error: {0}")]
    Tool(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DeusError {
    /// Build a malformed-output error for the named field.
    pub fn malformed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedOutput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Errors that must abort the current phase outright rather than being
    /// folded into a failed feedback.
    pub fn aborts_phase(&self) -> bool {
        !matches!(self, DeusError::RetryExhausted { .. })
    }
}

impl From<GeneratorError> for DeusError {
    fn from(err: GeneratorError) -> Self {
        match err {
            GeneratorError::Timeout(d) => DeusError::GeneratorTimeout(d),
            GeneratorError::Cancelled => DeusError::Cancelled,
            other => DeusError::Service(other.to_string()),
        }
    }
}

/// Result type alias for deusflow operations
pub type Result<T> = std::result::Result<T, DeusError>;
