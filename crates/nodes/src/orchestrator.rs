//! Pipeline orchestrator: drives one push event through every stage.
//!
//! ```text
//! Received ─► DiffFetched ─► DocumentSynthesized ─► BranchCommitted ─► PrPublished ─► Done
//!     │            │                 │                     │                │
//!     └────────────┴─────────────────┴──────────┬──────────┴────────────────┘
//!                                               ▼
//!                                   Failed(stage, cause)
//! ```
//!
//! The orchestrator advances only on success and stops at the first failure.
//! It owns the [`Retrier`] applied to every outbound call and turns each stage
//! error into a [`RunOutcome`] naming the [`FailureKind`]. A document-write
//! failure after branch creation is a [`RunOutcome::PartialFailure`] because a
//! remote side effect (the branch) already exists.
//!
//! Collaborators are injected as `Arc<dyn Trait>`; one orchestrator can serve
//! many concurrent runs since it holds no per-run state.

use std::sync::Arc;

use pipeline::{
    BranchName, Clock, CodeRepository, ConfigError, FailureKind, PipelineConfig, PipelineRunId,
    PipelineStage, PipelineState, PushEvent, StateViolation, TextGenerator, ValidationError,
};
use serde::Serialize;
use tracing::{error, info, info_span, warn, Instrument};

use crate::{
    draft_pull_request, BranchCommitter, DiffFetcher, DocSynthesizer, PromptBuilder, PublishError,
    PullRequestPublisher, Retrier,
};

/// The external collaborators a run needs.
#[derive(Clone)]
pub struct Collaborators {
    /// Repository host client, shared by all runs.
    pub repository: Arc<dyn CodeRepository>,
    /// Text-generation capability, shared by all runs.
    pub generator: Arc<dyn TextGenerator>,
    /// Time source for branch naming.
    pub clock: Arc<dyn Clock>,
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Terminal result of a run, as reported to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum RunOutcome {
    /// A pull request is open for the generated document.
    #[serde(rename_all = "camelCase")]
    Success {
        pr_number: u64,
        pr_url: String,
        branch_name: String,
        commit_sha: String,
        /// The pull request already existed and was surfaced rather than created.
        reused_existing_pr: bool,
    },
    /// A remote side effect happened but the run did not complete.
    #[serde(rename_all = "camelCase")]
    PartialFailure {
        stage: FailureKind,
        branch_name: String,
        cause: String,
        /// The orphaned branch was deleted again.
        rolled_back: bool,
    },
    /// The run stopped before (or without) any lasting remote effect.
    Failure { stage: FailureKind, cause: String },
}

impl RunOutcome {
    /// Outcome for an event rejected at ingestion.
    pub fn rejected(err: &ValidationError) -> Self {
        Self::Failure {
            stage: FailureKind::WebhookValidationError,
            cause: err.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// The failure category, if the run did not succeed.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Success { .. } => None,
            Self::PartialFailure { stage, .. } | Self::Failure { stage, .. } => Some(*stage),
        }
    }
}

/// Everything a finished run leaves behind.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    #[serde(rename = "runId")]
    pub run_id: PipelineRunId,
    #[serde(flatten)]
    pub outcome: RunOutcome,
    /// Final pipeline state. Not serialised; it carries the full document.
    #[serde(skip)]
    pub state: PipelineState,
}

/// A stage failure on its way to becoming a [`RunOutcome`].
struct Halt {
    outcome: RunOutcome,
    reached: PipelineStage,
}

impl Halt {
    fn failure(stage: FailureKind, cause: impl ToString, reached: PipelineStage) -> Self {
        Self {
            outcome: RunOutcome::Failure {
                stage,
                cause: cause.to_string(),
            },
            reached,
        }
    }

    fn invariant(stage: FailureKind, violation: StateViolation, reached: PipelineStage) -> Self {
        Self::failure(stage, format!("pipeline state invariant: {violation}"), reached)
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives push events through the documentation pipeline.
pub struct PipelineOrchestrator {
    retrier: Retrier,
    clock: Arc<dyn Clock>,
    diff_fetcher: DiffFetcher,
    synthesizer: DocSynthesizer,
    committer: BranchCommitter,
    publisher: PullRequestPublisher,
}

impl PipelineOrchestrator {
    /// Builds an orchestrator after validating `config`.
    pub fn new(collaborators: Collaborators, config: &PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let document_path = config.publish.document_path()?;
        let request_deadline = config.retry.request_timeout();

        Ok(Self {
            retrier: Retrier::from_config(&config.retry),
            clock: collaborators.clock,
            diff_fetcher: DiffFetcher::new(collaborators.repository.clone(), request_deadline),
            synthesizer: DocSynthesizer::new(
                collaborators.generator,
                PromptBuilder::new(document_path.clone(), &config.synthesis),
                config.retry.synthesis_timeout(),
            ),
            committer: BranchCommitter::new(
                collaborators.repository.clone(),
                document_path,
                config.publish.rollback_orphaned_branches,
                request_deadline,
            ),
            publisher: PullRequestPublisher::new(collaborators.repository, request_deadline),
        })
    }

    /// Runs the pipeline for one event to a terminal outcome.
    pub async fn run(&self, event: PushEvent) -> RunReport {
        let run_id = PipelineRunId::new_random();
        let span = info_span!(
            "pipeline_run",
            %run_id,
            repository = %event.repository,
            branch = %event.base_branch,
            delivery = event.delivery_id.as_deref().unwrap_or("-"),
        );
        self.run_with_id(run_id, event).instrument(span).await
    }

    async fn run_with_id(&self, run_id: PipelineRunId, event: PushEvent) -> RunReport {
        info!(after = %event.after.short(), commits = event.commit_messages.len(), "run started");
        let mut state = PipelineState::new(run_id, event);

        let outcome = match self.drive(&mut state).await {
            Ok(outcome) => {
                info!(stage = %state.stage(), "run completed");
                outcome
            }
            Err(halt) => {
                error!(
                    reached = %halt.reached,
                    failure = ?halt.outcome.failure_kind(),
                    outcome = ?halt.outcome,
                    "run failed"
                );
                halt.outcome
            }
        };

        RunReport {
            run_id,
            outcome,
            state,
        }
    }

    /// Advances `state` stage by stage. `state` always holds the latest
    /// committed state, including when a later stage fails.
    async fn drive(&self, state: &mut PipelineState) -> Result<RunOutcome, Halt> {
        // Received -> DiffFetched
        let changes = self
            .diff_fetcher
            .fetch(
                &self.retrier,
                state.repository(),
                state.before_sha(),
                state.after_sha(),
            )
            .await
            .map_err(|e| Halt::failure(FailureKind::DiffFetchError, e, state.stage()))?;
        advance(state, |s| s.with_changes(changes), FailureKind::DiffFetchError)?;

        // DiffFetched -> DocumentSynthesized
        let document = self
            .synthesizer
            .generate(&self.retrier, state)
            .await
            .map_err(|e| Halt::failure(FailureKind::SynthesisError, e, state.stage()))?;
        advance(state, |s| s.with_document(&document), FailureKind::SynthesisError)?;

        // Name the branch once, before the first remote write.
        let branch = BranchName::for_documentation_update(self.clock.now());
        advance(
            state,
            |s| s.with_target_branch(branch.clone()),
            FailureKind::BranchCreateError,
        )?;

        // DocumentSynthesized -> BranchCommitted
        let document = state.generated_document().unwrap_or_default().to_owned();
        let commit = self
            .committer
            .publish(
                &self.retrier,
                state.repository(),
                state.base_branch(),
                &branch,
                &document,
            )
            .await
            .map_err(|e| publish_halt(e, &branch, state.stage()))?;
        advance(state, |s| s.with_commit(commit.clone()), FailureKind::CommitWriteError)?;

        // BranchCommitted -> PrPublished
        let request = draft_pull_request(state)
            .map_err(|e| Halt::failure(FailureKind::PrCreateError, e, state.stage()))?;
        let published = self
            .publisher
            .open(&self.retrier, state.repository(), &request)
            .await
            .map_err(|e| Halt::failure(FailureKind::PrCreateError, e, state.stage()))?;
        let pr = published.pull_request.clone();
        advance(state, |s| s.with_pull_request(pr), FailureKind::PrCreateError)?;

        Ok(RunOutcome::Success {
            pr_number: published.pull_request.number.as_u64(),
            pr_url: published.pull_request.url,
            branch_name: branch.to_string(),
            commit_sha: commit.to_string(),
            reused_existing_pr: published.reused,
        })
    }
}

/// Maps a publish failure: nothing written is a plain failure. A failed write
/// after branch creation, or a branch that may exist but could not be
/// confirmed, is a partial failure naming the branch.
fn publish_halt(err: PublishError, branch: &BranchName, reached: PipelineStage) -> Halt {
    match &err {
        PublishError::BaseUnresolved { .. } | PublishError::BranchCreate { .. } => {
            Halt::failure(FailureKind::BranchCreateError, &err, reached)
        }
        PublishError::BranchUnconfirmed { .. } => {
            warn!(%branch, "partial failure: branch may exist on remote");
            Halt {
                outcome: RunOutcome::PartialFailure {
                    stage: FailureKind::BranchCreateError,
                    branch_name: branch.to_string(),
                    cause: err.to_string(),
                    rolled_back: false,
                },
                reached,
            }
        }
        PublishError::CommitWrite { rollback, .. } => {
            let rolled_back = rollback.branch_removed();
            warn!(%branch, rolled_back, "partial failure: branch created without document commit");
            Halt {
                outcome: RunOutcome::PartialFailure {
                    stage: FailureKind::CommitWriteError,
                    branch_name: branch.to_string(),
                    cause: err.to_string(),
                    rolled_back,
                },
                reached,
            }
        }
    }
}

/// Applies a state transition in place, mapping an invariant breach to a halt
/// under `kind`.
fn advance(
    state: &mut PipelineState,
    transition: impl FnOnce(PipelineState) -> Result<PipelineState, StateViolation>,
    kind: FailureKind,
) -> Result<(), Halt> {
    let reached = state.stage();
    let next = transition(state.clone()).map_err(|v| Halt::invariant(kind, v, reached))?;
    *state = next;
    Ok(())
}
