//! Synthesis stage: turns the pipeline state into a prompt and obtains the
//! documentation text from the text-generation capability.
//!
//! The prompt carries repository identity, the commit boundary, commit
//! messages, and each changed file with a bounded patch excerpt. Output is
//! trimmed and must be non-blank; nothing here judges its quality.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use pipeline::{
    DocumentPath, GenerationError, PipelineState, Prompt, SynthesisConfig, TextGenerator,
};
use thiserror::Error;
use tracing::{info, instrument};

use crate::Retrier;

/// Standing instructions for the documentation writer.
pub const SYSTEM_PROMPT: &str = "You are a developer-focused technical writer maintaining the \
README of an open-source repository. Write clear, concise, well-structured Markdown. Cover a \
short summary, the notable changes and why they were made, small before/after examples where \
they help, any breaking changes, and how to test. Respond with the Markdown document only.";

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("text generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("text generation returned an empty document")]
    EmptyDocument,
}

// ---------------------------------------------------------------------------
// Prompt construction
// ---------------------------------------------------------------------------

/// Builds prompts within the configured patch budgets.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    document: DocumentPath,
    max_patch_chars: usize,
    max_total_patch_chars: usize,
}

impl PromptBuilder {
    pub fn new(document: DocumentPath, config: &SynthesisConfig) -> Self {
        Self {
            document,
            max_patch_chars: config.max_patch_chars,
            max_total_patch_chars: config.max_total_patch_chars,
        }
    }

    pub fn build(&self, state: &PipelineState) -> Prompt {
        let mut user = String::new();
        // Writing into a String cannot fail.
        let _ = self.write_user_prompt(&mut user, state);
        Prompt {
            system: SYSTEM_PROMPT.to_owned(),
            user,
        }
    }

    fn write_user_prompt(&self, out: &mut String, state: &PipelineState) -> std::fmt::Result {
        let files = state.changed_files();

        writeln!(out, "Repository: {}", state.repository())?;
        writeln!(out, "Branch: {}", state.base_branch())?;
        writeln!(out, "Base commit: {}", state.before_sha())?;
        writeln!(out, "Head commit: {}", state.after_sha())?;
        if !state.pusher().is_empty() {
            writeln!(out, "Pushed by: {}", state.pusher())?;
        }

        writeln!(out, "\nCommit messages:")?;
        if state.commit_messages().is_empty() {
            writeln!(out, "(none)")?;
        }
        for message in state.commit_messages() {
            let mut lines = message.trim().lines();
            writeln!(out, "- {}", lines.next().unwrap_or_default())?;
            for line in lines {
                writeln!(out, "  {line}")?;
            }
        }

        let additions: u64 = files.iter().map(|f| u64::from(f.additions)).sum();
        let deletions: u64 = files.iter().map(|f| u64::from(f.deletions)).sum();
        writeln!(
            out,
            "\nChanged files ({} total, +{additions}/-{deletions}):",
            files.len()
        )?;
        if files.is_empty() {
            writeln!(out, "(no file changes)")?;
        }
        for file in files {
            match &file.previous_path {
                Some(prev) => writeln!(
                    out,
                    "- {} (renamed from {prev}, +{}/-{})",
                    file.path, file.additions, file.deletions
                )?,
                None => writeln!(
                    out,
                    "- {} ({}, +{}/-{})",
                    file.path, file.status, file.additions, file.deletions
                )?,
            }
        }
        if state.diff_truncated() {
            writeln!(
                out,
                "\nNote: the change list may be incomplete; the repository host caps its length."
            )?;
        }

        writeln!(out, "\nDiffs (unified patch format):")?;
        let mut budget = self.max_total_patch_chars;
        let mut omitted = 0usize;
        for file in files {
            let Some(patch) = file.patch.as_deref().filter(|p| !p.is_empty()) else {
                continue;
            };
            if budget == 0 {
                omitted += 1;
                continue;
            }
            let limit = self.max_patch_chars.min(budget);
            let (excerpt, cut) = truncate_chars(patch, limit);
            budget -= excerpt.chars().count();
            writeln!(out, "\n### {} ({})", file.path, file.status)?;
            writeln!(out, "```diff\n{excerpt}\n```")?;
            if cut {
                writeln!(out, "(patch truncated)")?;
            }
        }
        if omitted > 0 {
            writeln!(out, "\n({omitted} further patches omitted for length)")?;
        }

        writeln!(out, "\nWrite an updated {} that:", self.document)?;
        writeln!(out, "- Summarizes the change clearly (2-4 paragraphs)")?;
        writeln!(out, "- Lists what changed and why")?;
        writeln!(out, "- Shows small code examples if relevant")?;
        writeln!(out, "- Ends with a 'How to test' section")?;
        Ok(())
    }
}

/// Returns at most `limit` characters of `text` and whether anything was cut.
fn truncate_chars(text: &str, limit: usize) -> (&str, bool) {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => (&text[..idx], true),
        None => (text, false),
    }
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// Obtains generated documentation for a pipeline state.
pub struct DocSynthesizer {
    generator: Arc<dyn TextGenerator>,
    prompts: PromptBuilder,
    deadline: Duration,
}

impl DocSynthesizer {
    pub fn new(generator: Arc<dyn TextGenerator>, prompts: PromptBuilder, deadline: Duration) -> Self {
        Self {
            generator,
            prompts,
            deadline,
        }
    }

    /// Generates the document, trimmed. Transport failures are retried through
    /// `retrier`; an empty response is a failure and is not retried.
    #[instrument(skip_all, fields(repository = %state.repository(), files = state.changed_files().len()))]
    pub async fn generate(
        &self,
        retrier: &Retrier,
        state: &PipelineState,
    ) -> Result<String, SynthesisError> {
        let prompt = self.prompts.build(state);
        let text = retrier
            .run("complete", self.deadline, || self.generator.complete(&prompt))
            .await?;

        let document = text.trim();
        if document.is_empty() {
            return Err(SynthesisError::EmptyDocument);
        }
        info!(chars = document.len(), "document synthesized");
        Ok(document.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use pipeline::{
        BranchName, ChangeSet, CommitSha, FileDiff, FileStatus, MockTextGenerator,
        PipelineRunId, PushEvent, RepositoryName, RepositoryOwner, RepositoryRef,
    };

    use super::*;

    fn state_with(files: Vec<FileDiff>, truncated: bool) -> PipelineState {
        let event = PushEvent {
            repository: RepositoryRef::new(
                RepositoryOwner::new("acme").unwrap(),
                RepositoryName::new("widgets").unwrap(),
            ),
            base_branch: BranchName::new("main").unwrap(),
            before: CommitSha::new("a1").unwrap(),
            after: CommitSha::new("b2").unwrap(),
            commit_messages: vec!["fix bug\n\nlonger body".into()],
            pusher: "octocat".into(),
            compare_url: None,
            delivery_id: None,
        };
        PipelineState::new(PipelineRunId::new_random(), event)
            .with_changes(ChangeSet { files, truncated })
            .unwrap()
    }

    fn file(path: &str, patch: Option<&str>) -> FileDiff {
        FileDiff {
            path: path.into(),
            status: FileStatus::Modified,
            additions: 2,
            deletions: 1,
            patch: patch.map(str::to_owned),
            previous_path: None,
        }
    }

    fn builder(max_patch: usize, max_total: usize) -> PromptBuilder {
        PromptBuilder::new(
            DocumentPath::new("README.md").unwrap(),
            &SynthesisConfig {
                max_patch_chars: max_patch,
                max_total_patch_chars: max_total,
            },
        )
    }

    fn retrier() -> Retrier {
        Retrier::new(3, Duration::from_millis(1), Duration::from_millis(2))
    }

    #[test]
    fn prompt_carries_identity_messages_and_files() {
        let state = state_with(vec![file("src/app.py", Some("+print('hi')"))], false);
        let prompt = builder(100, 1000).build(&state);

        assert_eq!(prompt.system, SYSTEM_PROMPT);
        assert!(prompt.user.contains("Repository: acme/widgets"));
        assert!(prompt.user.contains("Base commit: a1"));
        assert!(prompt.user.contains("Head commit: b2"));
        assert!(prompt.user.contains("- fix bug\n"));
        assert!(prompt.user.contains("  longer body"));
        assert!(prompt.user.contains("- src/app.py (modified, +2/-1)"));
        assert!(prompt.user.contains("```diff\n+print('hi')\n```"));
        assert!(prompt.user.contains("Write an updated README.md"));
    }

    #[test]
    fn long_patches_are_cut_to_budget() {
        let long = "x".repeat(50);
        let state = state_with(
            vec![file("a.py", Some(&long)), file("b.py", Some(&long)), file("c.py", Some(&long))],
            false,
        );
        let prompt = builder(20, 30).build(&state);

        assert!(prompt.user.contains(&format!("```diff\n{}\n```", "x".repeat(20))));
        assert!(prompt.user.contains(&format!("```diff\n{}\n```", "x".repeat(10))));
        assert!(prompt.user.contains("(patch truncated)"));
        assert!(prompt.user.contains("(1 further patches omitted for length)"));
    }

    #[test]
    fn truncation_and_empty_diffs_are_stated() {
        let prompt = builder(10, 10).build(&state_with(vec![], true));
        assert!(prompt.user.contains("(no file changes)"));
        assert!(prompt.user.contains("the change list may be incomplete"));
    }

    #[test]
    fn truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), ("hé", true));
        assert_eq!(truncate_chars("hé", 5), ("hé", false));
    }

    #[tokio::test]
    async fn output_is_trimmed() {
        let mut generator = MockTextGenerator::new();
        generator
            .expect_complete()
            .times(1)
            .returning(|_| Ok("\n  # Widgets\nUpdated docs.  \n".into()));
        let synthesizer = DocSynthesizer::new(
            Arc::new(generator),
            builder(100, 1000),
            Duration::from_secs(1),
        );

        let doc = synthesizer
            .generate(&retrier(), &state_with(vec![], false))
            .await
            .unwrap();
        assert_eq!(doc, "# Widgets\nUpdated docs.");
    }

    #[tokio::test]
    async fn blank_output_fails_without_retry() {
        let mut generator = MockTextGenerator::new();
        generator.expect_complete().times(1).returning(|_| Ok("  \n ".into()));
        let synthesizer = DocSynthesizer::new(
            Arc::new(generator),
            builder(100, 1000),
            Duration::from_secs(1),
        );

        let err = synthesizer
            .generate(&retrier(), &state_with(vec![], false))
            .await
            .unwrap_err();
        assert!(matches!(err, SynthesisError::EmptyDocument));
    }

    #[tokio::test]
    async fn transport_failures_are_retried() {
        let mut generator = MockTextGenerator::new();
        let mut seq = mockall::Sequence::new();
        generator
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Err(GenerationError::Transport {
                    message: "connection reset".into(),
                })
            });
        generator
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("# Doc".into()));
        let synthesizer = DocSynthesizer::new(
            Arc::new(generator),
            builder(100, 1000),
            Duration::from_secs(1),
        );

        let doc = synthesizer
            .generate(&retrier(), &state_with(vec![], false))
            .await
            .unwrap();
        assert_eq!(doc, "# Doc");
    }
}
