//! Kvasir error types

use std::time::Duration;

/// Kvasir error types
#[derive(Debug, thiserror::Error)]
pub enum KvasirError {
    // Upstream/network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("model not found: {0}")]
    ModelNotFound(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("empty response from upstream")]
    EmptyResponse,

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    // Collaborator errors
    #[error("cache store error: {0}")]
    Cache(String),

    #[error("classifier error: {0}")]
    Classifier(String),

    // Task execution errors
    /// The question task failed on every attempt.
    #[error("task failed after {attempts} attempts: {message}")]
    TaskFailed { attempts: u32, message: String },

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("task queue is shut down")]
    QueueClosed,
}

impl KvasirError {
    /// Whether a retry of the same operation could plausibly succeed.
    ///
    /// Throttling, transport failures, unparseable upstream bodies and 5xx
    /// responses are transient. Authentication, bad input and configuration
    /// problems are not.
    pub fn is_transient(&self) -> bool {
        match self {
            KvasirError::RateLimited { .. }
            | KvasirError::Http(_)
            | KvasirError::Json(_)
            | KvasirError::Cache(_)
            | KvasirError::Classifier(_)
            | KvasirError::EmptyResponse
            | KvasirError::TimedOut(_) => true,
            KvasirError::Api { status, .. } => *status >= 500 || *status == 408,
            _ => false,
        }
    }

    /// Upstream back-off hint, if the error carried one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            KvasirError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for KvasirError {
    fn from(err: reqwest::Error) -> Self {
        KvasirError::Http(err.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for KvasirError {
    fn from(err: redis::RedisError) -> Self {
        KvasirError::Cache(err.to_string())
    }
}

/// Result type alias for Kvasir operations
pub type Result<T> = std::result::Result<T, KvasirError>;
