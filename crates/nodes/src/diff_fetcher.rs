//! Diff stage: fetches the per-file changes between the push's two commits.

use std::sync::Arc;
use std::time::Duration;

use pipeline::{ChangeSet, CodeRepository, CommitSha, RemoteError, RepositoryRef};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::Retrier;

/// The diff could not be fetched: an unresolvable commit, a permission
/// failure, or transient failures that outlasted the retry budget.
#[derive(Debug, Error)]
#[error("failed to fetch diff {before}...{after} for {repository}: {source}")]
pub struct DiffFetchError {
    pub repository: String,
    pub before: String,
    pub after: String,
    #[source]
    pub source: RemoteError,
}

/// Retrieves per-file diffs between two commit references.
///
/// Read-only; fetching twice against an unchanged remote yields equal results.
pub struct DiffFetcher {
    repository: Arc<dyn CodeRepository>,
    deadline: Duration,
}

impl DiffFetcher {
    pub fn new(repository: Arc<dyn CodeRepository>, deadline: Duration) -> Self {
        Self {
            repository,
            deadline,
        }
    }

    /// Fetches the change set. A truncated listing is returned as-is with its
    /// `truncated` flag set.
    #[instrument(skip_all, fields(repository = %repo, before = %before.short(), after = %after.short()))]
    pub async fn fetch(
        &self,
        retrier: &Retrier,
        repo: &RepositoryRef,
        before: &CommitSha,
        after: &CommitSha,
    ) -> Result<ChangeSet, DiffFetchError> {
        let changes = retrier
            .run("compare", self.deadline, || {
                self.repository.compare(repo, before, after)
            })
            .await
            .map_err(|source| DiffFetchError {
                repository: repo.full_name(),
                before: before.to_string(),
                after: after.to_string(),
                source,
            })?;

        if changes.truncated {
            warn!(
                files = changes.files.len(),
                "remote truncated the changed-file list, continuing with partial diff"
            );
        }
        info!(
            files = changes.files.len(),
            additions = changes.total_additions(),
            deletions = changes.total_deletions(),
            "diff fetched"
        );
        Ok(changes)
    }
}
