// Domain error types - user-facing messages never carry backend detail

use std::time::Duration;
use thiserror::Error;

/// Main error type for the data-access layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TodoError {
    /// Target item does not exist for the principal (HTTP 404)
    #[error("Todo not found")]
    NotFound,

    /// Circuit open or durable store unreachable (HTTP 503)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Malformed input (HTTP 400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unexpected failure while processing (HTTP 500)
    #[error("Internal error: {0}")]
    Internal(String),

    /// No authenticated principal supplied (HTTP 401)
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Configuration error (HTTP 500)
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl TodoError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            TodoError::NotFound => 404,
            TodoError::ServiceUnavailable(_) => 503,
            TodoError::Validation(_) => 400,
            TodoError::Internal(_) => 500,
            TodoError::Unauthenticated(_) => 401,
            TodoError::Configuration(_) => 500,
        }
    }

    /// Get user-friendly error message (no sensitive information)
    pub fn user_message(&self) -> String {
        match self {
            TodoError::NotFound => "Todo not found".to_string(),
            TodoError::ServiceUnavailable(_) => "Service unavailable".to_string(),
            TodoError::Validation(reason) => format!("Invalid request: {}", reason),
            TodoError::Internal(_) => "Internal server error".to_string(),
            TodoError::Unauthenticated(_) => "Unauthorized".to_string(),
            TodoError::Configuration(_) => "Internal server error".to_string(),
        }
    }
}

/// Failures raised by the durable store collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Connection-level failure (pool exhausted, socket closed, TLS)
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Uniqueness constraint rejected the write
    #[error("store conflict: {0}")]
    Conflict(String),

    #[error("store query failed: {0}")]
    Query(String),

    #[error("store returned malformed data: {0}")]
    Decode(String),
}

/// Failures raised by the cache collaborator. Always absorbed by the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache connection failed: {0}")]
    Connection(String),

    #[error("cache command failed: {0}")]
    Command(String),
}

/// Failure to hand an event to the pub/sub channel
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to publish to channel '{channel}': {reason}")]
pub struct PublishError {
    pub channel: String,
    pub reason: String,
}

/// Outcome of a call that went through a circuit breaker
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BreakerError<E> {
    /// Breaker is open; the wrapped operation was not invoked
    #[error("circuit breaker '{operation}' is open")]
    Open { operation: String },

    /// Wrapped operation exceeded its wall-clock budget
    #[error("circuit breaker '{operation}' timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    /// Wrapped operation failed on its own
    #[error("{0}")]
    Inner(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }
}

impl From<BreakerError<StoreError>> for TodoError {
    fn from(err: BreakerError<StoreError>) -> Self {
        match err {
            BreakerError::Open { operation } => TodoError::ServiceUnavailable(format!(
                "circuit breaker for '{}' is open",
                operation
            )),
            BreakerError::Timeout { operation, after } => TodoError::ServiceUnavailable(format!(
                "store operation '{}' timed out after {:?}",
                operation, after
            )),
            BreakerError::Inner(StoreError::Unavailable(reason)) => {
                TodoError::ServiceUnavailable(reason)
            }
            BreakerError::Inner(other) => TodoError::Internal(other.to_string()),
        }
    }
}
