//! Error taxonomy for the commit pipeline.
//!
//! Service failures are split into retryable (rate limited, server side) and
//! everything else; [`ServiceError::is_retryable`] is the only classifier the
//! retry loop consults. Downstream failures during a commit never escape as
//! errors: they are collected as [`PipelineWarning`]s on the report.

use std::time::Duration;

use scribe_core::CoreError;
use scribe_renderer::RenderError;
use thiserror::Error;

/// Errors from the recognition, validation and speech services.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// HTTP 429.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// HTTP 5xx.
    #[error("server error {status}: {message}")]
    ServerError {
        /// HTTP status code.
        status: u16,
        /// Response body or error code.
        message: String,
    },

    /// HTTP 400: the request was malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// HTTP 401/403.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// HTTP 413.
    #[error("payload too large")]
    PayloadTooLarge,

    /// The service is missing credentials or configuration.
    #[error("service misconfigured: {0}")]
    Misconfigured(String),

    /// HTTP 422: the service could not interpret its own model output.
    #[error("service could not parse result: {0}")]
    ParseFailed(String),

    /// Any other non-success status.
    #[error("request rejected with {status}: {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body or error code.
        message: String,
    },

    /// Connection-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The request or the whole retry sequence ran out of time.
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The response was missing required fields or had the wrong types.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The configured endpoint URL is invalid.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl ServiceError {
    /// Returns true if this error is retryable (rate limits and server errors).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::ServerError { .. })
    }

    /// Classify a non-success HTTP response.
    #[must_use]
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = error_message(body);
        match status {
            429 => Self::RateLimited(message),
            500..=599 if names_missing_credentials(body) => Self::Misconfigured(message),
            500..=599 => Self::ServerError { status, message },
            400 => Self::InvalidRequest(message),
            401 | 403 => Self::Unauthorized(message),
            413 => Self::PayloadTooLarge,
            422 => Self::ParseFailed(message),
            _ => Self::Rejected { status, message },
        }
    }

    /// HTTP status the error was classified from, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RateLimited(_) => Some(429),
            Self::ServerError { status, .. } | Self::Rejected { status, .. } => Some(*status),
            Self::InvalidRequest(_) => Some(400),
            Self::PayloadTooLarge => Some(413),
            Self::ParseFailed(_) => Some(422),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Pull a short message out of an error body (`{"error": ..}` or raw text).
fn error_message(body: &str) -> String {
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
    let field = parsed.as_ref().and_then(|v| {
        ["message", "error", "msg"]
            .iter()
            .find_map(|k| v.get(k).and_then(serde_json::Value::as_str))
    });
    let text = field.unwrap_or(body).trim();
    if text.is_empty() {
        "no details".to_string()
    } else {
        text.chars().take(300).collect()
    }
}

fn names_missing_credentials(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    lower.contains("misconfigured") || lower.contains("api_key")
}

/// Errors from the persistence/object-storage backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The backend answered with a non-success status.
    #[error("backend returned {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body.
        message: String,
    },

    /// Connection-level failure.
    #[error("backend transport error: {0}")]
    Transport(String),

    /// The backend URL is invalid.
    #[error("invalid backend URL: {0}")]
    InvalidUrl(String),

    /// Local persistence I/O failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

/// The upload client gave up.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Retries were exhausted.
    #[error("upload failed after {attempts} attempts: {source}")]
    Failed {
        /// Number of attempts made.
        attempts: u32,
        /// Last backend error.
        #[source]
        source: BackendError,
    },
}

/// Failures that abort a session-level operation.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Another commit is in flight.
    #[error("a commit is already in progress")]
    Busy,

    /// Backend access failed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Local state rejected the operation.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A service client could not be built.
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// A stage of a commit that failed without losing the committed step.
#[derive(Debug, Error)]
pub enum PipelineWarning {
    /// No snapshot could be produced; the step is committed locally only.
    #[error("snapshot capture failed: {0}")]
    Capture(#[source] RenderError),

    /// The in-progress attempt could not be found or created.
    #[error("attempt unavailable: {0}")]
    Attempt(#[source] BackendError),

    /// Raster or row upload failed.
    #[error(transparent)]
    Upload(#[from] UploadError),

    /// Transcription failed.
    #[error("recognition failed: {0}")]
    Recognition(#[source] ServiceError),

    /// The validation service could not produce a status.
    #[error("validation unavailable: {0}")]
    ValidationUnavailable(#[source] ServiceError),

    /// Hint audio could not be synthesized or re-signed.
    #[error("hint audio unavailable: {0}")]
    Speech(#[source] ServiceError),

    /// Results were computed but could not be written back.
    #[error("failed to persist {stage}: {source}")]
    Persist {
        /// What was being written.
        stage: &'static str,
        /// Backend error.
        #[source]
        source: BackendError,
    },

    /// Looking up the linked problem or previous step failed.
    #[error("lookup failed: {0}")]
    Lookup(#[source] BackendError),

    /// There is no problem statement to validate against.
    #[error("no problem statement available; step left unvalidated")]
    MissingProblem,

    /// Persisted steps have gaps in their indices.
    #[error("persisted steps are not contiguous: {0}")]
    StepGap(String),
}
