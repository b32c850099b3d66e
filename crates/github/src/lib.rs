//! AutoDoc GitHub infrastructure adapter.
//!
//! Implements the [`pipeline::CodeRepository`] port against the GitHub REST
//! API (`compare`, git refs, contents, pulls) with a bearer token.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate must not contain domain rules.
//! HTTP status codes, rate-limit headers, and wire formats are translated into
//! [`pipeline::RemoteError`] here; the [`pipeline`] crate never sees them.
//! Retries are not performed here; the orchestrator owns that decision.

mod client;
mod status;
mod wire;

pub use client::{ClientBuildError, GitHubClient, DEFAULT_API_URL, MAX_COMPARE_FILES};
