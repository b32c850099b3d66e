//! Core orchestration domain for AutoDoc.
//!
//! AutoDoc turns a repository push into a pull request that updates the
//! project's documentation. This crate contains every domain concept used
//! along the way: newtype identifiers, the [`PipelineState`] threaded through
//! the stages, the error taxonomy, typed configuration, and the port traits
//! infrastructure crates implement.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype domain identifiers (`BranchName`, `CommitSha`, etc.) |
//! | [`types`] | Shared value types (`FileDiff`, `ChangeSet`, `PushEvent`, etc.) |
//! | [`state`] | [`PipelineState`] and the derived [`PipelineStage`] |
//! | [`errors`] | Error taxonomy and retry-policy types |
//! | [`config`] | Typed, validated pipeline configuration |
//! | [`ports`] | Traits for the repository host, text generation, and time |

pub mod config;
pub mod errors;
pub mod identifiers;
pub mod ports;
pub mod state;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use config::{PipelineConfig, PublishConfig, RetryConfig, SynthesisConfig, TriggerConfig};
pub use errors::{
    ConfigError, FailureKind, GenerationError, RemoteError, RetryPolicy, Retryable,
    StateViolation, ValidationError,
};
pub use identifiers::{
    BranchName, CommitSha, DocumentPath, PipelineRunId, PullRequestNumber, RepositoryName,
    RepositoryOwner, DOC_BRANCH_PREFIX,
};
pub use ports::{Clock, CodeRepository, Prompt, SystemClock, TextGenerator};
#[cfg(feature = "test-mocks")]
pub use ports::{MockClock, MockCodeRepository, MockTextGenerator};
pub use state::{PipelineStage, PipelineState};
pub use types::{
    ChangeSet, FileDiff, FileStatus, FileWrite, NewPullRequest, PullRequestRef, PushEvent,
    RepositoryRef, Timestamp,
};
