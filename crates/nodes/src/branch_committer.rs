//! Publish stage: creates the documentation branch and commits the document
//! onto it.
//!
//! Three remote steps, each independently fallible and each wrapped in the
//! orchestrator's retry policy:
//!
//! 1. resolve the tip of the base branch;
//! 2. create the documentation branch at that commit;
//! 3. write the document file on the new branch.
//!
//! Step 3 only starts once step 2 has returned successfully. If step 3 fails
//! the branch is left behind and the error says so; with rollback enabled the
//! committer tries to delete it first and records whether that worked.
//!
//! A retried step 2 may find the ref already present because an earlier
//! attempt landed on the remote after its deadline. The committer then reads
//! the branch tip: a branch at the base commit is ours and step 3 proceeds on
//! it; a tip that cannot be read is reported as an unconfirmed branch.

use std::sync::Arc;
use std::time::Duration;

use pipeline::{
    BranchName, CodeRepository, CommitSha, DocumentPath, FileWrite, RemoteError, RepositoryRef,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::Retrier;

/// What happened to a branch orphaned by a failed write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackOutcome {
    /// Rollback is disabled; the branch remains on the remote.
    NotAttempted,
    /// The branch was deleted.
    Deleted,
    /// Deletion was attempted and failed; the branch remains.
    Failed { reason: String },
}

impl RollbackOutcome {
    pub fn branch_removed(&self) -> bool {
        matches!(self, Self::Deleted)
    }
}

#[derive(Debug, Error)]
pub enum PublishError {
    /// Step 1 failed. Nothing was written.
    #[error("could not resolve base branch '{branch}': {source}")]
    BaseUnresolved {
        branch: BranchName,
        #[source]
        source: RemoteError,
    },

    /// Step 2 failed (typically because the ref already exists). Nothing was
    /// written.
    #[error("could not create branch '{branch}': {source}")]
    BranchCreate {
        branch: BranchName,
        #[source]
        source: RemoteError,
    },

    /// Step 2 was retried after a transient failure, the retry found the ref
    /// present, and its tip could not be read. The branch may be ours.
    #[error("branch '{branch}' may have been created by an earlier attempt but could not be confirmed: {source}")]
    BranchUnconfirmed {
        branch: BranchName,
        #[source]
        source: RemoteError,
    },

    /// Step 3 failed after the branch was created.
    #[error("could not write '{path}' on branch '{branch}': {source}")]
    CommitWrite {
        branch: BranchName,
        path: DocumentPath,
        #[source]
        source: RemoteError,
        rollback: RollbackOutcome,
    },
}

/// Creates a branch ref and writes the generated document into it.
pub struct BranchCommitter {
    repository: Arc<dyn CodeRepository>,
    document_path: DocumentPath,
    rollback_orphans: bool,
    deadline: Duration,
}

impl BranchCommitter {
    pub fn new(
        repository: Arc<dyn CodeRepository>,
        document_path: DocumentPath,
        rollback_orphans: bool,
        deadline: Duration,
    ) -> Self {
        Self {
            repository,
            document_path,
            rollback_orphans,
            deadline,
        }
    }

    pub fn document_path(&self) -> &DocumentPath {
        &self.document_path
    }

    /// Runs the three steps and returns the SHA of the document commit.
    #[instrument(skip_all, fields(repository = %repo, base = %base_branch, branch = %target_branch))]
    pub async fn publish(
        &self,
        retrier: &Retrier,
        repo: &RepositoryRef,
        base_branch: &BranchName,
        target_branch: &BranchName,
        document: &str,
    ) -> Result<CommitSha, PublishError> {
        let base_tip = retrier
            .run("branch_tip", self.deadline, || {
                self.repository.branch_tip(repo, base_branch)
            })
            .await
            .map_err(|source| PublishError::BaseUnresolved {
                branch: base_branch.clone(),
                source,
            })?;

        let mut create_attempts = 0u32;
        let created = retrier
            .run("create_branch", self.deadline, || {
                create_attempts += 1;
                self.repository.create_branch(repo, target_branch, &base_tip)
            })
            .await;
        match created {
            Ok(()) => info!(at = %base_tip.short(), "branch created"),
            Err(source @ RemoteError::AlreadyExists { .. }) if create_attempts > 1 => {
                self.claim_branch(retrier, repo, target_branch, &base_tip, source)
                    .await?;
            }
            Err(source) => {
                return Err(PublishError::BranchCreate {
                    branch: target_branch.clone(),
                    source,
                })
            }
        }

        match self.write_document(retrier, repo, target_branch, document).await {
            Ok(sha) => {
                info!(commit = %sha.short(), path = %self.document_path, "document committed");
                Ok(sha)
            }
            Err(source) => {
                error!(error = %source, "document write failed after branch creation");
                let rollback = self.roll_back(retrier, repo, target_branch).await;
                Err(PublishError::CommitWrite {
                    branch: target_branch.clone(),
                    path: self.document_path.clone(),
                    source,
                    rollback,
                })
            }
        }
    }

    /// Decides whether an existing `branch` was created by an earlier attempt
    /// of this run.
    async fn claim_branch(
        &self,
        retrier: &Retrier,
        repo: &RepositoryRef,
        branch: &BranchName,
        base_tip: &CommitSha,
        exists: RemoteError,
    ) -> Result<(), PublishError> {
        let tip = retrier
            .run("branch_tip", self.deadline, || {
                self.repository.branch_tip(repo, branch)
            })
            .await;
        match tip {
            Ok(tip) if &tip == base_tip => {
                warn!(at = %tip.short(), "branch was created by an earlier attempt, continuing on it");
                Ok(())
            }
            Ok(tip) => {
                debug!(at = %tip.short(), "existing branch does not point at the base commit");
                Err(PublishError::BranchCreate {
                    branch: branch.clone(),
                    source: exists,
                })
            }
            Err(source) => {
                error!(error = %source, "could not confirm ownership of existing branch");
                Err(PublishError::BranchUnconfirmed {
                    branch: branch.clone(),
                    source,
                })
            }
        }
    }

    async fn write_document(
        &self,
        retrier: &Retrier,
        repo: &RepositoryRef,
        branch: &BranchName,
        document: &str,
    ) -> Result<CommitSha, RemoteError> {
        let existing_blob = retrier
            .run("file_blob", self.deadline, || {
                self.repository.file_blob(repo, &self.document_path, branch)
            })
            .await?;

        let write = FileWrite {
            path: self.document_path.clone(),
            branch: branch.clone(),
            content: ensure_trailing_newline(document),
            message: format!("docs: update {} [autodoc]", self.document_path),
            existing_blob,
        };
        retrier
            .run("write_file", self.deadline, || {
                self.repository.write_file(repo, &write)
            })
            .await
    }

    async fn roll_back(
        &self,
        retrier: &Retrier,
        repo: &RepositoryRef,
        branch: &BranchName,
    ) -> RollbackOutcome {
        if !self.rollback_orphans {
            warn!("branch left on remote without a document commit");
            return RollbackOutcome::NotAttempted;
        }
        match retrier
            .run("delete_branch", self.deadline, || {
                self.repository.delete_branch(repo, branch)
            })
            .await
        {
            Ok(()) => {
                info!("orphaned branch deleted");
                RollbackOutcome::Deleted
            }
            Err(err) => {
                error!(error = %err, "could not delete orphaned branch");
                RollbackOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }
}

fn ensure_trailing_newline(document: &str) -> String {
    let mut content = document.to_owned();
    if !content.ends_with('\n') {
        content.push('\n');
    }
    content
}
