//! Newtype domain identifiers.
//!
//! Every domain concept that has an identity is represented as a distinct newtype
//! wrapping a primitive. This prevents accidentally interchanging, for example,
//! a [`BranchName`] with a [`CommitSha`] even though both are strings under the
//! hood.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Timestamp;

/// Prefix of every branch AutoDoc creates for a documentation update.
pub const DOC_BRANCH_PREFIX: &str = "autodoc-readme-update-";

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty
            /// or only whitespace.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.trim().is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers - GitHub-integer-backed
// ---------------------------------------------------------------------------

/// Identifies a GitHub Pull Request by its repository-scoped number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PullRequestNumber(u64);

impl PullRequestNumber {
    /// Creates a pull request number, returning `None` for zero (GitHub numbers
    /// start at 1).
    pub fn new(value: u64) -> Option<Self> {
        if value == 0 {
            None
        } else {
            Some(Self(value))
        }
    }

    /// Returns the underlying integer value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for PullRequestNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Identifiers - UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Identifies a single pipeline run (one push event driven to a terminal state).
///
/// Generated fresh for every run; propagated through spans so all activity from
/// a single run can be correlated in the logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineRunId(Uuid);

impl PipelineRunId {
    /// Generates a new random run identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a [`PipelineRunId`] from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for PipelineRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Identifiers - String-backed (GitHub / Git names)
// ---------------------------------------------------------------------------

string_id! {
    /// The account or organisation that owns a repository (e.g. `"acme"`).
    RepositoryOwner
}

string_id! {
    /// The repository name without its owner (e.g. `"widgets"`).
    RepositoryName
}

string_id! {
    /// A Git branch name without the `refs/heads/` prefix
    /// (e.g. `"main"`, `"feature/login"`).
    BranchName
}

string_id! {
    /// A Git commit SHA as reported by the remote (normally 40 lowercase hex
    /// characters).
    CommitSha
}

string_id! {
    /// A file path relative to the repository root (e.g. `"README.md"`).
    DocumentPath
}

impl BranchName {
    /// Derives the documentation branch name for a run started at `started`.
    ///
    /// The name is `autodoc-readme-update-<unix seconds>`. Uniqueness rests on
    /// second granularity only; two runs in the same second collide.
    pub fn for_documentation_update(started: Timestamp) -> Self {
        Self(format!("{DOC_BRANCH_PREFIX}{}", started.unix_seconds()))
    }

    /// Returns the fully qualified ref (`refs/heads/<name>`).
    pub fn to_ref(&self) -> String {
        format!("refs/heads/{}", self.0)
    }

    /// Returns the timestamp suffix if this is an AutoDoc documentation branch.
    pub fn documentation_timestamp(&self) -> Option<i64> {
        let digits = self.0.strip_prefix(DOC_BRANCH_PREFIX)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }
}

impl CommitSha {
    /// Returns the first seven characters, as GitHub abbreviates commit SHAs.
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(7)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }

    /// Returns `true` for the all-zero SHA GitHub sends when a ref is created
    /// or deleted.
    pub fn is_null(&self) -> bool {
        self.0.bytes().all(|b| b == b'0')
    }
}
