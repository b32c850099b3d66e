//! Port traits: what the pipeline needs from the outside world.
//!
//! Infrastructure crates implement these traits (`github` implements
//! [`CodeRepository`], `llm` implements [`TextGenerator`]); the orchestration
//! layer only ever holds `Arc<dyn Trait>` handles, injected at construction.
//!
//! Implementations must be safe for concurrent use by many pipeline runs and
//! must not keep per-run state. Each method performs exactly one logical remote
//! operation and never retries on its own; retry and deadline decisions belong
//! to the orchestrator.
//!
//! With the `test-mocks` feature enabled, `mockall` generates
//! `MockCodeRepository`, `MockTextGenerator`, and `MockClock`.

use async_trait::async_trait;

use crate::{
    BranchName, ChangeSet, CommitSha, DocumentPath, FileWrite, GenerationError, NewPullRequest,
    PullRequestRef, RemoteError, RepositoryRef, Timestamp,
};

/// Remote repository hosting API.
#[cfg_attr(feature = "test-mocks", mockall::automock)]
#[async_trait]
pub trait CodeRepository: Send + Sync {
    /// Per-file diff between `base` and `head`.
    ///
    /// Returns [`RemoteError::NotFound`] if either commit cannot be resolved.
    async fn compare(
        &self,
        repo: &RepositoryRef,
        base: &CommitSha,
        head: &CommitSha,
    ) -> Result<ChangeSet, RemoteError>;

    /// Commit SHA at the tip of `branch`.
    async fn branch_tip(
        &self,
        repo: &RepositoryRef,
        branch: &BranchName,
    ) -> Result<CommitSha, RemoteError>;

    /// Creates `refs/heads/<branch>` pointing at `at`.
    ///
    /// Returns [`RemoteError::AlreadyExists`] if the ref exists.
    async fn create_branch(
        &self,
        repo: &RepositoryRef,
        branch: &BranchName,
        at: &CommitSha,
    ) -> Result<(), RemoteError>;

    /// Deletes `refs/heads/<branch>`.
    async fn delete_branch(
        &self,
        repo: &RepositoryRef,
        branch: &BranchName,
    ) -> Result<(), RemoteError>;

    /// Blob SHA of `path` on `branch`, or `None` if the file does not exist.
    async fn file_blob(
        &self,
        repo: &RepositoryRef,
        path: &DocumentPath,
        branch: &BranchName,
    ) -> Result<Option<String>, RemoteError>;

    /// Creates or replaces a file on a branch, returning the new commit SHA.
    async fn write_file(
        &self,
        repo: &RepositoryRef,
        write: &FileWrite,
    ) -> Result<CommitSha, RemoteError>;

    /// Opens a pull request.
    ///
    /// Returns [`RemoteError::AlreadyExists`] if one is already open for the
    /// same head and base.
    async fn create_pull_request(
        &self,
        repo: &RepositoryRef,
        request: &NewPullRequest,
    ) -> Result<PullRequestRef, RemoteError>;

    /// The open pull request from `head` into `base`, if any.
    async fn find_open_pull_request(
        &self,
        repo: &RepositoryRef,
        head: &BranchName,
        base: &BranchName,
    ) -> Result<Option<PullRequestRef>, RemoteError>;
}

/// A prompt for the text-generation capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// Standing instructions (persona, output format).
    pub system: String,
    /// The request itself.
    pub user: String,
}

/// Text-generation capability: `synthesize(prompt) -> text`.
#[cfg_attr(feature = "test-mocks", mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Returns the generated text. The text is returned as produced; callers
    /// trim and validate it.
    async fn complete(&self, prompt: &Prompt) -> Result<String, GenerationError>;
}

/// Source of wall-clock time, injectable for deterministic branch names.
#[cfg_attr(feature = "test-mocks", mockall::automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// [`Clock`] backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}
