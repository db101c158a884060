//! Error taxonomy for inference calls.
//!
//! `InferenceError` classifies what went wrong on a single attempt; the
//! retry policy decides on it. `CallFailed` is the terminal, per-call
//! failure handed back to the caller once the policy gives up.

use thiserror::Error;

/// What went wrong on one attempt.
#[derive(Debug, Clone, Error)]
pub enum InferenceError {
    /// Connection refused, DNS, TLS, timeouts, a body cut off mid-stream.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// The endpoint answered 2xx with a body we cannot interpret.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The request could not be constructed locally.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl InferenceError {
    /// Transport and status errors may succeed on another attempt; a bad
    /// body or a bad request will not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::HttpStatus { .. })
    }

    /// Status codes that signal a problem with the request itself rather
    /// than with the server's current state.
    pub fn is_permanent_client_error(&self) -> bool {
        matches!(self, Self::HttpStatus { status: 400 | 401 | 403 | 404 | 422, .. })
    }
}

impl From<reqwest::Error> for InferenceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            InferenceError::Transport(format!("timed out: {err}"))
        } else if err.is_builder() {
            InferenceError::InvalidRequest(err.to_string())
        } else {
            InferenceError::Transport(err.to_string())
        }
    }
}

/// One failed attempt, kept for the failure report.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    /// Zero-based attempt index.
    pub attempt: u32,
    pub error: InferenceError,
}

/// Terminal failure of a call after the retry policy gave up.
#[derive(Debug, Clone, Error)]
#[error("call failed after {attempts} attempt(s): {last_error}")]
pub struct CallFailed {
    pub attempts: u32,
    pub last_error: InferenceError,
    pub history: Vec<AttemptRecord>,
}

pub type InferenceResult<T> = Result<T, InferenceError>;
