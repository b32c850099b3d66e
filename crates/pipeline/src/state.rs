//! The value object threaded through every pipeline stage.
//!
//! [`PipelineState`] is created once per [`PushEvent`] and grows as the run
//! advances. Fields are append-only: each `with_*` transition consumes the
//! state, checks that the field is still unset and that its prerequisites are
//! present, and returns the extended state. No transition clears a field a
//! previous stage committed.

use serde::Serialize;

use crate::{
    BranchName, ChangeSet, CommitSha, FileDiff, PipelineRunId, PullRequestRef, PushEvent,
    RepositoryRef, StateViolation,
};

/// Position of a run in the pipeline state machine.
///
/// Derived from which fields of [`PipelineState`] are populated, so it can
/// never disagree with the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Received,
    DiffFetched,
    DocumentSynthesized,
    BranchCommitted,
    PrPublished,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::DiffFetched => "diff_fetched",
            Self::DocumentSynthesized => "document_synthesized",
            Self::BranchCommitted => "branch_committed",
            Self::PrPublished => "pr_published",
        };
        f.write_str(name)
    }
}

/// Accumulated state of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineState {
    run_id: PipelineRunId,
    repository: RepositoryRef,
    base_branch: BranchName,
    before_sha: CommitSha,
    after_sha: CommitSha,
    commit_messages: Vec<String>,
    pusher: String,
    compare_url: Option<String>,

    changes: Option<ChangeSet>,
    generated_document: Option<String>,
    target_branch_name: Option<BranchName>,
    commit_sha: Option<CommitSha>,
    pull_request: Option<PullRequestRef>,
}

impl PipelineState {
    /// Creates the initial state for a run from a validated push event.
    pub fn new(run_id: PipelineRunId, event: PushEvent) -> Self {
        Self {
            run_id,
            repository: event.repository,
            base_branch: event.base_branch,
            before_sha: event.before,
            after_sha: event.after,
            commit_messages: event.commit_messages,
            pusher: event.pusher,
            compare_url: event.compare_url,
            changes: None,
            generated_document: None,
            target_branch_name: None,
            commit_sha: None,
            pull_request: None,
        }
    }

    // -- ingestion fields ---------------------------------------------------

    pub fn run_id(&self) -> PipelineRunId {
        self.run_id
    }

    pub fn repository(&self) -> &RepositoryRef {
        &self.repository
    }

    pub fn base_branch(&self) -> &BranchName {
        &self.base_branch
    }

    pub fn before_sha(&self) -> &CommitSha {
        &self.before_sha
    }

    pub fn after_sha(&self) -> &CommitSha {
        &self.after_sha
    }

    pub fn commit_messages(&self) -> &[String] {
        &self.commit_messages
    }

    pub fn pusher(&self) -> &str {
        &self.pusher
    }

    pub fn compare_url(&self) -> Option<&str> {
        self.compare_url.as_deref()
    }

    // -- stage outputs -------------------------------------------------------

    /// Changed files, empty until the diff has been fetched.
    pub fn changed_files(&self) -> &[FileDiff] {
        self.changes.as_ref().map_or(&[], |c| c.files.as_slice())
    }

    /// Whether the fetched diff may be incomplete.
    pub fn diff_truncated(&self) -> bool {
        self.changes.as_ref().is_some_and(|c| c.truncated)
    }

    pub fn has_diff(&self) -> bool {
        self.changes.is_some()
    }

    pub fn generated_document(&self) -> Option<&str> {
        self.generated_document.as_deref()
    }

    pub fn target_branch_name(&self) -> Option<&BranchName> {
        self.target_branch_name.as_ref()
    }

    pub fn commit_sha(&self) -> Option<&CommitSha> {
        self.commit_sha.as_ref()
    }

    pub fn pull_request(&self) -> Option<&PullRequestRef> {
        self.pull_request.as_ref()
    }

    /// Current position in the state machine.
    pub fn stage(&self) -> PipelineStage {
        if self.pull_request.is_some() {
            PipelineStage::PrPublished
        } else if self.commit_sha.is_some() {
            PipelineStage::BranchCommitted
        } else if self.generated_document.is_some() {
            PipelineStage::DocumentSynthesized
        } else if self.changes.is_some() {
            PipelineStage::DiffFetched
        } else {
            PipelineStage::Received
        }
    }

    // -- transitions ---------------------------------------------------------

    /// Records the fetched diff. An empty change set is valid.
    pub fn with_changes(mut self, changes: ChangeSet) -> Result<Self, StateViolation> {
        if self.changes.is_some() {
            return Err(StateViolation::AlreadySet {
                field: "changed_files",
            });
        }
        self.changes = Some(changes);
        Ok(self)
    }

    /// Records the generated document, trimmed. Blank documents are refused.
    pub fn with_document(mut self, document: &str) -> Result<Self, StateViolation> {
        if self.changes.is_none() {
            return Err(StateViolation::MissingPrerequisite {
                field: "generated_document",
                requires: "changed_files",
            });
        }
        if self.generated_document.is_some() {
            return Err(StateViolation::AlreadySet {
                field: "generated_document",
            });
        }
        let trimmed = document.trim();
        if trimmed.is_empty() {
            return Err(StateViolation::BlankDocument);
        }
        self.generated_document = Some(trimmed.to_owned());
        Ok(self)
    }

    /// Assigns the documentation branch name. Happens exactly once, after the
    /// document is in hand and before any remote write.
    pub fn with_target_branch(mut self, branch: BranchName) -> Result<Self, StateViolation> {
        if self.generated_document.is_none() {
            return Err(StateViolation::MissingPrerequisite {
                field: "target_branch_name",
                requires: "generated_document",
            });
        }
        if self.target_branch_name.is_some() {
            return Err(StateViolation::AlreadySet {
                field: "target_branch_name",
            });
        }
        self.target_branch_name = Some(branch);
        Ok(self)
    }

    /// Records the commit that wrote the document onto the target branch.
    pub fn with_commit(mut self, sha: CommitSha) -> Result<Self, StateViolation> {
        if self.target_branch_name.is_none() {
            return Err(StateViolation::MissingPrerequisite {
                field: "commit_sha",
                requires: "target_branch_name",
            });
        }
        if self.commit_sha.is_some() {
            return Err(StateViolation::AlreadySet {
                field: "commit_sha",
            });
        }
        self.commit_sha = Some(sha);
        Ok(self)
    }

    /// Records the pull request. Refused unless a commit has been recorded, so
    /// `pull_request` is never set without `commit_sha`.
    pub fn with_pull_request(mut self, pr: PullRequestRef) -> Result<Self, StateViolation> {
        if self.commit_sha.is_none() {
            return Err(StateViolation::MissingPrerequisite {
                field: "pull_request",
                requires: "commit_sha",
            });
        }
        if self.pull_request.is_some() {
            return Err(StateViolation::AlreadySet {
                field: "pull_request",
            });
        }
        self.pull_request = Some(pr);
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FileStatus, PullRequestNumber, RepositoryName, RepositoryOwner};

    fn event() -> PushEvent {
        PushEvent {
            repository: RepositoryRef::new(
                RepositoryOwner::new("acme").unwrap(),
                RepositoryName::new("widgets").unwrap(),
            ),
            base_branch: BranchName::new("main").unwrap(),
            before: CommitSha::new("a1").unwrap(),
            after: CommitSha::new("b2").unwrap(),
            commit_messages: vec!["fix bug".into()],
            pusher: "octocat".into(),
            compare_url: None,
            delivery_id: None,
        }
    }

    fn state() -> PipelineState {
        PipelineState::new(PipelineRunId::new_random(), event())
    }

    fn one_file() -> ChangeSet {
        ChangeSet {
            files: vec![FileDiff {
                path: "src/main.py".into(),
                status: FileStatus::Modified,
                additions: 2,
                deletions: 1,
                patch: Some("@@ -1 +1,2 @@".into()),
                previous_path: None,
            }],
            truncated: false,
        }
    }

    fn pr() -> PullRequestRef {
        PullRequestRef {
            number: PullRequestNumber::new(7).unwrap(),
            url: "https://github.com/acme/widgets/pull/7".into(),
        }
    }

    #[test]
    fn new_state_copies_ingestion_fields() {
        let s = state();
        assert_eq!(s.repository().full_name(), "acme/widgets");
        assert_eq!(s.base_branch().as_str(), "main");
        assert_eq!(s.commit_messages(), ["fix bug".to_string()]);
        assert_eq!(s.stage(), PipelineStage::Received);
        assert!(s.changed_files().is_empty());
    }

    #[test]
    fn full_transition_sequence_reaches_pr_published() {
        let s = state()
            .with_changes(one_file())
            .unwrap()
            .with_document("  # Widgets\n")
            .unwrap()
            .with_target_branch(BranchName::new("autodoc-readme-update-1").unwrap())
            .unwrap()
            .with_commit(CommitSha::new("c3").unwrap())
            .unwrap()
            .with_pull_request(pr())
            .unwrap();

        assert_eq!(s.stage(), PipelineStage::PrPublished);
        assert_eq!(s.generated_document(), Some("# Widgets"));
        assert_eq!(s.changed_files().len(), 1);
        assert_eq!(s.commit_sha().unwrap().as_str(), "c3");
    }

    #[test]
    fn empty_change_set_is_a_valid_diff() {
        let s = state().with_changes(ChangeSet::default()).unwrap();
        assert_eq!(s.stage(), PipelineStage::DiffFetched);
        assert!(s.has_diff());
        assert!(s.changed_files().is_empty());
    }

    #[test]
    fn fields_cannot_be_assigned_twice() {
        let s = state().with_changes(one_file()).unwrap();
        assert_eq!(
            s.clone().with_changes(ChangeSet::default()).unwrap_err(),
            StateViolation::AlreadySet {
                field: "changed_files"
            }
        );

        let s = s
            .with_document("doc")
            .unwrap()
            .with_target_branch(BranchName::new("autodoc-readme-update-1").unwrap())
            .unwrap();
        assert_eq!(
            s.with_target_branch(BranchName::new("autodoc-readme-update-2").unwrap())
                .unwrap_err(),
            StateViolation::AlreadySet {
                field: "target_branch_name"
            }
        );
    }

    #[test]
    fn blank_documents_are_refused() {
        let s = state().with_changes(one_file()).unwrap();
        assert_eq!(
            s.clone().with_document("").unwrap_err(),
            StateViolation::BlankDocument
        );
        assert_eq!(
            s.with_document(" \n\t ").unwrap_err(),
            StateViolation::BlankDocument
        );
    }

    #[test]
    fn pull_request_requires_a_commit() {
        let s = state()
            .with_changes(one_file())
            .unwrap()
            .with_document("doc")
            .unwrap()
            .with_target_branch(BranchName::new("autodoc-readme-update-1").unwrap())
            .unwrap();
        assert_eq!(
            s.with_pull_request(pr()).unwrap_err(),
            StateViolation::MissingPrerequisite {
                field: "pull_request",
                requires: "commit_sha"
            }
        );
    }

    #[test]
    fn branch_cannot_be_assigned_before_the_document() {
        let err = state()
            .with_changes(one_file())
            .unwrap()
            .with_target_branch(BranchName::new("autodoc-readme-update-1").unwrap())
            .unwrap_err();
        assert!(matches!(err, StateViolation::MissingPrerequisite { .. }));
    }
}
