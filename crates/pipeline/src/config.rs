//! Typed pipeline configuration.
//!
//! Deserialised from the optional `autodoc.toml` (every field has a default)
//! and validated once at process start with [`PipelineConfig::validate`].
//! Credentials are not part of this structure; the composition root loads them
//! from the environment.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, DocumentPath};

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub synthesis: SynthesisConfig,

    #[serde(default)]
    pub publish: PublishConfig,

    #[serde(default)]
    pub trigger: TriggerConfig,
}

impl PipelineConfig {
    /// Checks cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retry.validate()?;
        self.synthesis.validate()?;
        self.publish.validate()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------

/// Retry budget, backoff schedule, and per-call deadlines.
///
/// Applied uniformly by the orchestrator to every outbound call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts per call, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry; doubled for each further retry.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound on a single backoff delay.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Deadline for each repository-host call.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Deadline for each text-generation call.
    #[serde(default = "default_synthesis_timeout_secs")]
    pub synthesis_timeout_secs: u64,

    /// Longest server-requested wait (`Retry-After`, rate-limit reset) the
    /// retrier will sleep through. A longer request fails the call at once.
    #[serde(default = "default_max_server_delay_secs")]
    pub max_server_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            synthesis_timeout_secs: default_synthesis_timeout_secs(),
            max_server_delay_secs: default_max_server_delay_secs(),
        }
    }
}

impl RetryConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_secs(self.synthesis_timeout_secs)
    }

    pub fn max_server_delay(&self) -> Duration {
        Duration::from_secs(self.max_server_delay_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::new("retry.max_attempts must be at least 1"));
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(ConfigError::new(
                "retry.max_backoff_ms must not be smaller than retry.initial_backoff_ms",
            ));
        }
        if self.request_timeout_secs == 0 || self.synthesis_timeout_secs == 0 {
            return Err(ConfigError::new("retry timeouts must be positive"));
        }
        Ok(())
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    500
}
fn default_max_backoff_ms() -> u64 {
    8_000
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_synthesis_timeout_secs() -> u64 {
    120
}
fn default_max_server_delay_secs() -> u64 {
    60
}

// ---------------------------------------------------------------------------

/// Prompt size limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SynthesisConfig {
    /// Maximum characters of patch text included per file.
    #[serde(default = "default_max_patch_chars")]
    pub max_patch_chars: usize,

    /// Maximum characters of patch text included across all files.
    #[serde(default = "default_max_total_patch_chars")]
    pub max_total_patch_chars: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_patch_chars: default_max_patch_chars(),
            max_total_patch_chars: default_max_total_patch_chars(),
        }
    }
}

impl SynthesisConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_patch_chars == 0 {
            return Err(ConfigError::new("synthesis.max_patch_chars must be positive"));
        }
        if self.max_total_patch_chars < self.max_patch_chars {
            return Err(ConfigError::new(
                "synthesis.max_total_patch_chars must be at least synthesis.max_patch_chars",
            ));
        }
        Ok(())
    }
}

fn default_max_patch_chars() -> usize {
    4_000
}
fn default_max_total_patch_chars() -> usize {
    48_000
}

// ---------------------------------------------------------------------------

/// Where and how the generated document is published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PublishConfig {
    /// Repository path the document is written to.
    #[serde(default = "default_document_path")]
    pub document_path: String,

    /// Delete the documentation branch when the document write fails after
    /// the branch was created. The run is still reported as a partial failure.
    #[serde(default)]
    pub rollback_orphaned_branches: bool,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            document_path: default_document_path(),
            rollback_orphaned_branches: false,
        }
    }
}

impl PublishConfig {
    /// The document path as a domain identifier.
    pub fn document_path(&self) -> Result<DocumentPath, ConfigError> {
        let path = self.document_path.trim_start_matches('/');
        DocumentPath::new(path)
            .ok_or_else(|| ConfigError::new("publish.document_path must not be empty"))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let path = self.document_path()?;
        if path.as_str().split('/').any(|seg| seg.is_empty() || seg == "..") {
            return Err(ConfigError::new(format!(
                "publish.document_path '{}' is not a clean relative path",
                self.document_path
            )));
        }
        Ok(())
    }
}

fn default_document_path() -> String {
    "README.md".into()
}

// ---------------------------------------------------------------------------

/// Which pushes start a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TriggerConfig {
    /// A push starts a run only if some changed path ends with one of these
    /// suffixes. An empty list accepts every push.
    #[serde(default = "default_trigger_suffixes")]
    pub path_suffixes: Vec<String>,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            path_suffixes: default_trigger_suffixes(),
        }
    }
}

impl TriggerConfig {
    /// Returns `true` if a push touching `paths` should start a run.
    pub fn matches<'a>(&self, mut paths: impl Iterator<Item = &'a str>) -> bool {
        if self.path_suffixes.is_empty() {
            return true;
        }
        paths.any(|p| self.path_suffixes.iter().any(|s| p.ends_with(s.as_str())))
    }
}

fn default_trigger_suffixes() -> Vec<String> {
    vec![".py".into(), ".ipynb".into(), "README.md".into()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.max_server_delay(), Duration::from_secs(60));
        assert_eq!(config.publish.document_path().unwrap().as_str(), "README.md");
        assert!(!config.publish.rollback_orphaned_branches);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: PipelineConfig = toml::from_str(
            r#"
            [retry]
            max_attempts = 5

            [publish]
            document_path = "docs/OVERVIEW.md"
            rollback_orphaned_branches = true
            "#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_backoff(), Duration::from_millis(500));
        assert_eq!(config.publish.document_path, "docs/OVERVIEW.md");
        assert!(config.publish.rollback_orphaned_branches);
        assert_eq!(config.trigger.path_suffixes.len(), 3);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result: Result<PipelineConfig, _> = toml::from_str("[retry]\nattempts = 2\n");
        assert!(result.is_err());
    }

    #[test]
    fn zero_attempts_is_invalid() {
        let mut config = PipelineConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn backoff_bounds_must_be_ordered() {
        let mut config = PipelineConfig::default();
        config.retry.initial_backoff_ms = 10_000;
        config.retry.max_backoff_ms = 1_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn document_path_must_be_clean() {
        for bad in ["", "docs//README.md", "../README.md", "docs/"] {
            let mut config = PipelineConfig::default();
            config.publish.document_path = bad.into();
            assert!(config.validate().is_err(), "{bad:?}");
        }
    }

    #[test]
    fn trigger_matches_configured_suffixes() {
        let trigger = TriggerConfig::default();
        assert!(trigger.matches(["src/app.py"].into_iter()));
        assert!(trigger.matches(["docs/README.md", "Cargo.toml"].into_iter()));
        assert!(!trigger.matches(["Cargo.toml", "src/lib.rs"].into_iter()));
        assert!(!trigger.matches(std::iter::empty()));

        let all = TriggerConfig {
            path_suffixes: vec![],
        };
        assert!(all.matches(std::iter::empty()));
    }
}
