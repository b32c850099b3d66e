//! Pull request stage: opens the pull request from the documentation branch
//! into the pushed branch.
//!
//! A pull request that already exists for the same head and base is not an
//! error: the publisher looks it up and reports it as reused.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use pipeline::{
    BranchName, CodeRepository, NewPullRequest, PipelineState, PullRequestRef, RemoteError,
    RepositoryRef,
};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::Retrier;

/// Maximum changed files listed in a pull request body.
const MAX_LISTED_FILES: usize = 50;

#[derive(Debug, Error)]
pub enum PrCreateError {
    /// The branch has no recorded commit; a pull request would be empty.
    #[error("no document commit recorded; refusing to open a pull request")]
    MissingCommit,

    #[error("could not open pull request from '{head}' into '{base}': {source}")]
    Api {
        head: BranchName,
        base: BranchName,
        #[source]
        source: RemoteError,
    },

    /// The host reported a duplicate but the existing pull request could not
    /// be found.
    #[error("a pull request from '{head}' into '{base}' already exists but could not be located")]
    DuplicateUnresolved {
        head: BranchName,
        base: BranchName,
        lookup_error: Option<RemoteError>,
    },
}

/// The pull request a run ended with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedPullRequest {
    pub pull_request: PullRequestRef,
    /// `true` when an already-open pull request was surfaced instead of a new one.
    pub reused: bool,
}

/// Builds the pull request title and body from the run state.
///
/// Fails with [`PrCreateError::MissingCommit`] unless the state records both a
/// target branch and a document commit.
pub fn draft_pull_request(state: &PipelineState) -> Result<NewPullRequest, PrCreateError> {
    let (Some(head), Some(commit)) = (state.target_branch_name(), state.commit_sha()) else {
        return Err(PrCreateError::MissingCommit);
    };

    let title = format!(
        "docs: update README for {} ({})",
        state.repository(),
        state.after_sha().short()
    );

    let mut body = String::new();
    // Writing into a String cannot fail.
    let _ = write_body(&mut body, state, commit.short());

    Ok(NewPullRequest {
        title,
        body,
        head: head.clone(),
        base: state.base_branch().clone(),
    })
}

fn write_body(out: &mut String, state: &PipelineState, commit: &str) -> std::fmt::Result {
    writeln!(
        out,
        "Automated documentation update for the push to `{}` ({}...{}).",
        state.base_branch(),
        state.before_sha().short(),
        state.after_sha().short()
    )?;
    if !state.pusher().is_empty() {
        writeln!(out, "\nPushed by @{}.", state.pusher())?;
    }
    if let Some(url) = state.compare_url() {
        writeln!(out, "Compare: {url}")?;
    }

    if !state.commit_messages().is_empty() {
        writeln!(out, "\n### Commits")?;
        for message in state.commit_messages() {
            writeln!(out, "- {}", message.lines().next().unwrap_or_default())?;
        }
    }

    let files = state.changed_files();
    writeln!(out, "\n### Changed files ({})", files.len())?;
    for file in files.iter().take(MAX_LISTED_FILES) {
        writeln!(
            out,
            "- `{}` ({}, +{}/-{})",
            file.path, file.status, file.additions, file.deletions
        )?;
    }
    if files.len() > MAX_LISTED_FILES {
        writeln!(out, "- ... and {} more", files.len() - MAX_LISTED_FILES)?;
    }
    if state.diff_truncated() {
        writeln!(
            out,
            "\n> The repository host may have truncated the diff; the document may have been generated from a partial change list."
        )?;
    }

    writeln!(out, "\nDocument commit: {commit}")?;
    Ok(())
}

/// Opens pull requests, surfacing existing ones for duplicate head/base pairs.
pub struct PullRequestPublisher {
    repository: Arc<dyn CodeRepository>,
    deadline: Duration,
}

impl PullRequestPublisher {
    pub fn new(repository: Arc<dyn CodeRepository>, deadline: Duration) -> Self {
        Self {
            repository,
            deadline,
        }
    }

    #[instrument(skip_all, fields(repository = %repo, head = %request.head, base = %request.base))]
    pub async fn open(
        &self,
        retrier: &Retrier,
        repo: &RepositoryRef,
        request: &NewPullRequest,
    ) -> Result<PublishedPullRequest, PrCreateError> {
        let created = retrier
            .run("create_pull_request", self.deadline, || {
                self.repository.create_pull_request(repo, request)
            })
            .await;

        match created {
            Ok(pull_request) => {
                info!(number = pull_request.number.as_u64(), url = %pull_request.url, "pull request opened");
                Ok(PublishedPullRequest {
                    pull_request,
                    reused: false,
                })
            }
            Err(RemoteError::AlreadyExists { .. }) => self.find_existing(retrier, repo, request).await,
            Err(source) => Err(PrCreateError::Api {
                head: request.head.clone(),
                base: request.base.clone(),
                source,
            }),
        }
    }

    async fn find_existing(
        &self,
        retrier: &Retrier,
        repo: &RepositoryRef,
        request: &NewPullRequest,
    ) -> Result<PublishedPullRequest, PrCreateError> {
        let found = retrier
            .run("find_open_pull_request", self.deadline, || {
                self.repository
                    .find_open_pull_request(repo, &request.head, &request.base)
            })
            .await;

        match found {
            Ok(Some(pull_request)) => {
                warn!(
                    number = pull_request.number.as_u64(),
                    "pull request already open for this branch pair, reusing it"
                );
                Ok(PublishedPullRequest {
                    pull_request,
                    reused: true,
                })
            }
            Ok(None) => Err(PrCreateError::DuplicateUnresolved {
                head: request.head.clone(),
                base: request.base.clone(),
                lookup_error: None,
            }),
            Err(err) => Err(PrCreateError::DuplicateUnresolved {
                head: request.head.clone(),
                base: request.base.clone(),
                lookup_error: Some(err),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use pipeline::{
        ChangeSet, CommitSha, FileDiff, FileStatus, MockCodeRepository, PipelineRunId,
        PullRequestNumber, PushEvent, RepositoryName, RepositoryOwner,
    };

    use super::*;

    fn repo() -> RepositoryRef {
        RepositoryRef::new(
            RepositoryOwner::new("acme").unwrap(),
            RepositoryName::new("widgets").unwrap(),
        )
    }

    fn base_state() -> PipelineState {
        let event = PushEvent {
            repository: repo(),
            base_branch: BranchName::new("main").unwrap(),
            before: CommitSha::new("a1a1a1a1a1").unwrap(),
            after: CommitSha::new("b2b2b2b2b2").unwrap(),
            commit_messages: vec!["fix bug\n\ndetails".into()],
            pusher: "octocat".into(),
            compare_url: Some("https://github.com/acme/widgets/compare/a1...b2".into()),
            delivery_id: None,
        };
        PipelineState::new(PipelineRunId::new_random(), event)
            .with_changes(ChangeSet {
                files: vec![FileDiff {
                    path: "app.py".into(),
                    status: FileStatus::Modified,
                    additions: 3,
                    deletions: 1,
                    patch: None,
                    previous_path: None,
                }],
                truncated: true,
            })
            .unwrap()
            .with_document("# Widgets")
            .unwrap()
            .with_target_branch(BranchName::new("autodoc-readme-update-9").unwrap())
            .unwrap()
    }

    fn pr(number: u64) -> PullRequestRef {
        PullRequestRef {
            number: PullRequestNumber::new(number).unwrap(),
            url: format!("https://github.com/acme/widgets/pull/{number}"),
        }
    }

    fn retrier() -> Retrier {
        Retrier::new(2, Duration::from_millis(1), Duration::from_millis(2))
    }

    #[test]
    fn draft_requires_a_commit() {
        assert!(matches!(
            draft_pull_request(&base_state()),
            Err(PrCreateError::MissingCommit)
        ));
    }

    #[test]
    fn draft_describes_the_push() {
        let state = base_state()
            .with_commit(CommitSha::new("c3c3c3c3c3").unwrap())
            .unwrap();
        let draft = draft_pull_request(&state).unwrap();

        assert_eq!(draft.title, "docs: update README for acme/widgets (b2b2b2b)");
        assert_eq!(draft.head.as_str(), "autodoc-readme-update-9");
        assert_eq!(draft.base.as_str(), "main");
        assert!(draft.body.contains("Pushed by @octocat."));
        assert!(draft.body.contains("- fix bug\n"));
        assert!(!draft.body.contains("details"));
        assert!(draft.body.contains("- `app.py` (modified, +3/-1)"));
        assert!(draft.body.contains("truncated the diff"));
        assert!(draft.body.contains("Document commit: c3c3c3c"));
    }

    fn request() -> NewPullRequest {
        let state = base_state()
            .with_commit(CommitSha::new("c3").unwrap())
            .unwrap();
        draft_pull_request(&state).unwrap()
    }

    #[tokio::test]
    async fn opens_a_new_pull_request() {
        let mut mock = MockCodeRepository::new();
        mock.expect_create_pull_request()
            .times(1)
            .returning(|_, _| Ok(pr(12)));
        mock.expect_find_open_pull_request().times(0);

        let published = PullRequestPublisher::new(Arc::new(mock), Duration::from_secs(1))
            .open(&retrier(), &repo(), &request())
            .await
            .unwrap();
        assert_eq!(published.pull_request, pr(12));
        assert!(!published.reused);
    }

    #[tokio::test]
    async fn duplicate_surfaces_the_existing_pull_request() {
        let mut mock = MockCodeRepository::new();
        mock.expect_create_pull_request().times(1).returning(|_, _| {
            Err(RemoteError::AlreadyExists {
                message: "A pull request already exists".into(),
            })
        });
        mock.expect_find_open_pull_request()
            .withf(|_, head, base| {
                head.as_str() == "autodoc-readme-update-9" && base.as_str() == "main"
            })
            .times(1)
            .returning(|_, _, _| Ok(Some(pr(5))));

        let published = PullRequestPublisher::new(Arc::new(mock), Duration::from_secs(1))
            .open(&retrier(), &repo(), &request())
            .await
            .unwrap();
        assert_eq!(published.pull_request, pr(5));
        assert!(published.reused);
    }

    #[tokio::test]
    async fn unlocatable_duplicate_is_a_failure() {
        let mut mock = MockCodeRepository::new();
        mock.expect_create_pull_request().returning(|_, _| {
            Err(RemoteError::AlreadyExists {
                message: "A pull request already exists".into(),
            })
        });
        mock.expect_find_open_pull_request()
            .returning(|_, _, _| Ok(None));

        let err = PullRequestPublisher::new(Arc::new(mock), Duration::from_secs(1))
            .open(&retrier(), &repo(), &request())
            .await
            .unwrap_err();
        assert!(matches!(err, PrCreateError::DuplicateUnresolved { .. }));
    }

    #[tokio::test]
    async fn api_errors_are_reported() {
        let mut mock = MockCodeRepository::new();
        mock.expect_create_pull_request().times(1).returning(|_, _| {
            Err(RemoteError::Rejected {
                status: 422,
                message: "Validation Failed".into(),
            })
        });

        let err = PullRequestPublisher::new(Arc::new(mock), Duration::from_secs(1))
            .open(&retrier(), &repo(), &request())
            .await
            .unwrap_err();
        assert!(matches!(err, PrCreateError::Api { .. }));
    }
}
