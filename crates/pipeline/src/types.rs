//! Shared value types for the AutoDoc pipeline domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types group
//! several values together (a repository coordinate, a per-file diff, a pull
//! request handle) and are what the ports exchange with infrastructure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    BranchName, CommitSha, PullRequestNumber, RepositoryName, RepositoryOwner, ValidationError,
};

// ---------------------------------------------------------------------------
// Repository coordinates
// ---------------------------------------------------------------------------

/// A repository on the hosting service, identified by owner and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryRef {
    /// Owning account or organisation.
    pub owner: RepositoryOwner,
    /// Repository name.
    pub name: RepositoryName,
}

impl RepositoryRef {
    /// Creates a repository reference from its parts.
    pub fn new(owner: RepositoryOwner, name: RepositoryName) -> Self {
        Self { owner, name }
    }

    /// Parses an `"owner/name"` string.
    pub fn parse_full_name(full_name: &str) -> Result<Self, ValidationError> {
        let (owner, name) = full_name
            .split_once('/')
            .ok_or_else(|| ValidationError::malformed("repository.full_name", full_name))?;
        let owner = RepositoryOwner::new(owner)
            .ok_or_else(|| ValidationError::malformed("repository.full_name", full_name))?;
        if name.contains('/') {
            return Err(ValidationError::malformed("repository.full_name", full_name));
        }
        let name = RepositoryName::new(name)
            .ok_or_else(|| ValidationError::malformed("repository.full_name", full_name))?;
        Ok(Self { owner, name })
    }

    /// Returns `"owner/name"`.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl std::fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

// ---------------------------------------------------------------------------
// Diffs
// ---------------------------------------------------------------------------

/// How a file changed between the two compared commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// The file did not exist in the base commit.
    Added,
    /// The file's content changed.
    Modified,
    /// The file was deleted.
    Removed,
    /// The file moved; see [`FileDiff::previous_path`].
    Renamed,
}

impl FileStatus {
    /// Maps a GitHub compare API status string onto the four statuses AutoDoc
    /// distinguishes.
    ///
    /// GitHub also reports `copied`, `changed`, and `unchanged`; a copy is a new
    /// file and the other two are content changes. Unknown strings yield `None`.
    pub fn from_github(status: &str) -> Option<Self> {
        match status {
            "added" | "copied" => Some(Self::Added),
            "modified" | "changed" | "unchanged" => Some(Self::Modified),
            "removed" => Some(Self::Removed),
            "renamed" => Some(Self::Renamed),
            _ => None,
        }
    }

    /// Lower-case label used in prompts and PR bodies.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Removed => "removed",
            Self::Renamed => "renamed",
        }
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-file change between two commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    /// Path relative to the repository root, in the head commit.
    pub path: String,
    /// Kind of change.
    pub status: FileStatus,
    /// Lines added.
    pub additions: u32,
    /// Lines deleted.
    pub deletions: u32,
    /// Unified patch text. GitHub omits it for binary and very large files.
    pub patch: Option<String>,
    /// Path in the base commit when the file was renamed.
    pub previous_path: Option<String>,
}

/// Result of comparing two commits: the changed files plus a truncation flag.
///
/// `truncated` means the listing *may* be incomplete. Hosts that cap the list
/// without saying so are detected by length, so a comparison that exactly
/// fills the cap is flagged too. Downstream stages work with whatever is
/// present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub files: Vec<FileDiff>,
    pub truncated: bool,
}

impl ChangeSet {
    /// Total added lines across all files.
    pub fn total_additions(&self) -> u64 {
        self.files.iter().map(|f| u64::from(f.additions)).sum()
    }

    /// Total deleted lines across all files.
    pub fn total_deletions(&self) -> u64 {
        self.files.iter().map(|f| u64::from(f.deletions)).sum()
    }
}

// ---------------------------------------------------------------------------
// Pull requests
// ---------------------------------------------------------------------------

/// Identity of an opened (or pre-existing) pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRef {
    pub number: PullRequestNumber,
    /// Browser URL of the pull request.
    pub url: String,
}

/// Request to open a pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPullRequest {
    pub title: String,
    pub body: String,
    /// Branch containing the changes.
    pub head: BranchName,
    /// Branch the changes should be merged into.
    pub base: BranchName,
}

/// Request to create or update a single file on a branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileWrite {
    pub path: crate::DocumentPath,
    pub branch: BranchName,
    /// New file content (UTF-8 text).
    pub content: String,
    /// Commit message for the write.
    pub message: String,
    /// Blob SHA of the file being replaced. Required by GitHub when updating.
    pub existing_blob: Option<String>,
}

// ---------------------------------------------------------------------------
// Boundary input
// ---------------------------------------------------------------------------

/// A validated push notification, as handed to the pipeline by the webhook
/// boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    pub repository: RepositoryRef,
    /// Branch that received the push; the pull request targets it.
    pub base_branch: BranchName,
    /// Commit the branch pointed at before the push.
    pub before: CommitSha,
    /// Commit the branch points at after the push.
    pub after: CommitSha,
    /// Messages of the pushed commits, oldest first.
    pub commit_messages: Vec<String>,
    /// Name of the user who pushed.
    pub pusher: String,
    /// Browser URL comparing `before` and `after`, when the payload carried one.
    pub compare_url: Option<String>,
    /// Webhook delivery identifier (`X-GitHub-Delivery`), for log correlation.
    pub delivery_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly; the underlying representation can change without affecting the
/// domain API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }

    /// Seconds since the Unix epoch.
    pub fn unix_seconds(self) -> i64 {
        self.0.timestamp()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
