//! AutoDoc pipeline stages and orchestrator.
//!
//! This crate provides the four stage implementations (diff fetch, document
//! synthesis, branch + commit publication, pull request creation), the
//! [`Retrier`] that wraps every outbound call, and the [`PipelineOrchestrator`]
//! that drives a push event through the stages to a [`RunOutcome`].
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** Stages sequence calls between the domain types of
//! the [`pipeline`] crate and the port traits (repository host, text
//! generation). Transport details live in the infrastructure crates.

pub mod branch_committer;
pub mod diff_fetcher;
pub mod doc_synthesizer;
pub mod orchestrator;
pub mod pr_publisher;
pub mod retry;

pub use branch_committer::{BranchCommitter, PublishError, RollbackOutcome};
pub use diff_fetcher::{DiffFetchError, DiffFetcher};
pub use doc_synthesizer::{DocSynthesizer, PromptBuilder, SynthesisError, SYSTEM_PROMPT};
pub use orchestrator::{Collaborators, PipelineOrchestrator, RunOutcome, RunReport};
pub use pr_publisher::{draft_pull_request, PrCreateError, PublishedPullRequest, PullRequestPublisher};
pub use retry::Retrier;
