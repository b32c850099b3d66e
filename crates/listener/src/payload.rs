//! The subset of GitHub's `push` webhook payload that AutoDoc reads.
//!
//! Every field is optional at this level so that a missing field is reported
//! by name during validation instead of as a generic JSON error.

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushPayload {
    #[serde(rename = "ref")]
    pub git_ref: Option<String>,
    pub before: Option<String>,
    pub after: Option<String>,
    pub repository: Option<RepositoryPayload>,
    pub pusher: Option<PusherPayload>,
    #[serde(default)]
    pub commits: Vec<CommitPayload>,
    pub compare: Option<String>,
    #[serde(default)]
    pub created: bool,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RepositoryPayload {
    pub full_name: Option<String>,
    pub name: Option<String>,
    pub owner: Option<OwnerPayload>,
}

/// Push payloads carry both `login` and `name` for the owner; either may be
/// absent depending on the account type.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OwnerPayload {
    pub login: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PusherPayload {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommitPayload {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub message: String,
    pub author: Option<AuthorPayload>,
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub modified: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorPayload {
    pub name: Option<String>,
}

impl CommitPayload {
    /// Every path the commit added, modified, or removed.
    pub fn changed_paths(&self) -> impl Iterator<Item = &str> {
        self.added
            .iter()
            .chain(&self.modified)
            .chain(&self.removed)
            .map(String::as_str)
    }
}

impl PushPayload {
    /// Changed paths across all commits, in payload order.
    pub fn changed_paths(&self) -> impl Iterator<Item = &str> {
        self.commits.iter().flat_map(CommitPayload::changed_paths)
    }
}
