//! Generation backend error classification.

use std::time::Duration;

/// Errors from the generation service, kept apart by cause.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// No complete response within the allotted time.
    #[error("generation timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// The service answered with a non-2xx status.
    #[error("generation service returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// The request never produced a response (connect, DNS, TLS, reset).
    #[error("generation service unreachable: {0}")]
    Transport(String),

    /// A 2xx response whose body is not a supported image.
    #[error("generation service returned no image: {0}")]
    InvalidPayload(String),
}

impl BackendError {
    /// Short machine-friendly kind name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            BackendError::Timeout(_) => "timeout",
            BackendError::HttpStatus { .. } => "http_status",
            BackendError::Transport(_) => "transport",
            BackendError::InvalidPayload(_) => "invalid_payload",
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            BackendError::Timeout(timeout)
        } else {
            BackendError::Transport(err.to_string())
        }
    }
}
