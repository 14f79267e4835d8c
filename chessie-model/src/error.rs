//! Error types for `chessie-model`.

use thiserror::Error;

/// Errors that can occur when calling a language-model backend.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The client could not be configured (missing key, bad URL).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The HTTP request could not be sent or the connection failed.
    #[error("Request to {backend} failed: {message}")]
    Request {
        /// The backend that was being called.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The backend answered with a non-success status.
    #[error("{backend} API returned {status}: {message}")]
    Api {
        /// The backend that produced the error.
        backend: String,
        /// HTTP status code.
        status: u16,
        /// Error detail extracted from the response body.
        message: String,
    },

    /// The backend did not answer in time.
    #[error("{backend} did not respond within {seconds}s")]
    Timeout {
        /// The backend that timed out.
        backend: String,
        /// The timeout that elapsed.
        seconds: u64,
    },

    /// The backend answered, but the body could not be understood.
    #[error("Invalid response from {backend}: {message}")]
    InvalidResponse {
        /// The backend that produced the response.
        backend: String,
        /// A description of what was wrong.
        message: String,
    },
}

impl LlmError {
    /// Whether retrying the same request may succeed.
    ///
    /// Client errors other than rate limiting (`429`) are permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::InvalidConfig(_) | LlmError::InvalidResponse { .. } => false,
            LlmError::Api { status, .. } => *status == 429 || *status >= 500,
            LlmError::Request { .. } | LlmError::Timeout { .. } => true,
        }
    }
}

/// A convenience result type for model operations.
pub type Result<T> = std::result::Result<T, LlmError>;
