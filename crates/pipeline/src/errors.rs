//! Error taxonomy and retry-policy types for the AutoDoc pipeline domain.
//!
//! [`FailureKind`] names the stage-level failure categories a run can end in.
//! Port-level errors ([`RemoteError`] for the repository host, [`GenerationError`]
//! for the text-generation backend) are produced by infrastructure crates and
//! classified through [`Retryable`] so the orchestrator can decide, in one place,
//! whether an operation is worth another attempt.
//!
//! [`RetryPolicy`] is a cross-cutting concern: any error type that participates
//! in retry decisions must be able to produce a [`RetryPolicy`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// Returned by infrastructure error types to let the orchestrator decide
/// whether to re-invoke an operation.
///
/// - `Retryable`: transport failures, timeouts, rate limits, 5xx responses.
/// - `NonRetryable`: unknown commits, permission failures, conflicts, malformed
///   responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    ///
    /// `after` optionally specifies the minimum delay before retrying (e.g.
    /// derived from a `Retry-After` response header).
    Retryable {
        /// Minimum back-off before the next attempt. `None` means apply the
        /// caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// The operation must not be retried.
    NonRetryable,
}

impl RetryPolicy {
    /// Returns `true` for [`RetryPolicy::Retryable`].
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }
}

/// Errors that can be classified for retry and synthesised on timeout.
///
/// Implemented by every port error type so a single retry executor can wrap
/// any outbound call.
pub trait Retryable: std::error::Error + Send + Sync + 'static {
    /// How the orchestrator should treat this error.
    fn retry_policy(&self) -> RetryPolicy;

    /// Builds the error reported when a call exceeded its deadline.
    fn timed_out(after: Duration) -> Self
    where
        Self: Sized;
}

// ---------------------------------------------------------------------------
// Port errors
// ---------------------------------------------------------------------------

/// Failure of a call against the remote repository hosting API.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RemoteError {
    /// The request never produced an HTTP response (DNS, connect, reset).
    #[error("transport failure: {message}")]
    Transport { message: String },

    /// The call did not complete within its deadline.
    #[error("request timed out after {after:?}")]
    Timeout { after: Duration },

    /// The host throttled the caller.
    #[error("rate limited by the remote API")]
    RateLimited { retry_after: Option<Duration> },

    /// The host failed with a 5xx status.
    #[error("remote server error {status}: {message}")]
    Server { status: u16, message: String },

    /// The requested commit, ref, or file does not exist.
    #[error("not found: {resource}")]
    NotFound { resource: String },

    /// The object being created already exists (ref, pull request).
    #[error("already exists: {message}")]
    AlreadyExists { message: String },

    /// The write conflicts with the current remote state (stale blob SHA).
    #[error("conflict: {message}")]
    Conflict { message: String },

    /// The credential is missing, invalid, or lacks permission.
    #[error("unauthorized ({status}): {message}")]
    Unauthorized { status: u16, message: String },

    /// The host rejected the request as invalid.
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The response body could not be interpreted.
    #[error("malformed response: {message}")]
    Malformed { message: String },
}

impl Retryable for RemoteError {
    fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::Transport { .. } | Self::Timeout { .. } | Self::Server { .. } => {
                RetryPolicy::Retryable { after: None }
            }
            Self::RateLimited { retry_after } => RetryPolicy::Retryable {
                after: *retry_after,
            },
            Self::NotFound { .. }
            | Self::AlreadyExists { .. }
            | Self::Conflict { .. }
            | Self::Unauthorized { .. }
            | Self::Rejected { .. }
            | Self::Malformed { .. } => RetryPolicy::NonRetryable,
        }
    }

    fn timed_out(after: Duration) -> Self {
        Self::Timeout { after }
    }
}

/// Failure of a call against the text-generation backend.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerationError {
    #[error("transport failure: {message}")]
    Transport { message: String },

    #[error("generation timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("rate limited by the generation backend")]
    RateLimited { retry_after: Option<Duration> },

    #[error("generation backend error {status}: {message}")]
    Server { status: u16, message: String },

    /// The backend refused the request (bad credential, invalid model, content
    /// policy).
    #[error("generation request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed generation response: {message}")]
    Malformed { message: String },
}

impl Retryable for GenerationError {
    fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::Transport { .. } | Self::Timeout { .. } | Self::Server { .. } => {
                RetryPolicy::Retryable { after: None }
            }
            Self::RateLimited { retry_after } => RetryPolicy::Retryable {
                after: *retry_after,
            },
            Self::Rejected { .. } | Self::Malformed { .. } => RetryPolicy::NonRetryable,
        }
    }

    fn timed_out(after: Duration) -> Self {
        Self::Timeout { after }
    }
}

// ---------------------------------------------------------------------------
// Ingestion and state errors
// ---------------------------------------------------------------------------

/// A push payload is missing required fields or carries malformed values.
///
/// Raised at ingestion; the run never starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required field '{field}'")]
    MissingField { field: &'static str },

    #[error("malformed value for '{field}': {value:?}")]
    Malformed { field: &'static str, value: String },

    #[error("payload is not valid JSON: {message}")]
    InvalidJson { message: String },
}

impl ValidationError {
    pub fn missing(field: &'static str) -> Self {
        Self::MissingField { field }
    }

    pub fn malformed(field: &'static str, value: impl Into<String>) -> Self {
        Self::Malformed {
            field,
            value: value.into(),
        }
    }
}

/// An attempted [`crate::PipelineState`] transition would break one of its
/// invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateViolation {
    /// A field that is assigned once was assigned again.
    #[error("'{field}' is already set")]
    AlreadySet { field: &'static str },

    /// The generated document was empty or whitespace.
    #[error("generated document is blank")]
    BlankDocument,

    /// A field was assigned before the field it depends on.
    #[error("'{field}' requires '{requires}' to be set first")]
    MissingPrerequisite {
        field: &'static str,
        requires: &'static str,
    },
}

/// Pipeline configuration failed validation. Produced at load time; no run
/// starts with an invalid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Configuration error: {message}")]
pub struct ConfigError {
    pub message: String,
}

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Stage failure categories
// ---------------------------------------------------------------------------

/// The category a failed run is reported under.
///
/// Serialised with the names operators see in run results and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// The event was missing required fields; no run was started.
    WebhookValidationError,
    /// The diff could not be fetched (unknown SHA, exhausted retries).
    DiffFetchError,
    /// Generation failed or produced an empty document. No remote writes.
    SynthesisError,
    /// The documentation branch could not be created. No remote writes.
    BranchCreateError,
    /// The document write failed after the branch was created.
    CommitWriteError,
    /// The pull request could not be opened.
    #[serde(rename = "PRCreateError")]
    PrCreateError,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WebhookValidationError => "WebhookValidationError",
            Self::DiffFetchError => "DiffFetchError",
            Self::SynthesisError => "SynthesisError",
            Self::BranchCreateError => "BranchCreateError",
            Self::CommitWriteError => "CommitWriteError",
            Self::PrCreateError => "PRCreateError",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
