//! Process settings: credentials from the environment, pipeline tuning from an
//! optional TOML file.

use std::path::Path;

use anyhow::{bail, Context, Result};
use llm::OpenAiSettings;
use pipeline::PipelineConfig;

const GITHUB_TOKEN_VARS: [&str; 2] = ["TOKEN_GITHUB", "GITHUB_TOKEN"];
const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
const OPENAI_MODEL: &str = "OPENAI_MODEL";
const OPENAI_BASE_URL: &str = "OPENAI_BASE_URL";
const GITHUB_API_URL: &str = "GITHUB_API_URL";

/// Everything the composition root needs, validated.
#[derive(Clone)]
pub struct Settings {
    pub github_token: String,
    pub github_api_url: String,
    pub openai: OpenAiSettings,
    pub pipeline: PipelineConfig,
}

impl Settings {
    /// Reads the process environment and `config_path`, if given.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let pipeline = match config_path {
            Some(path) => load_pipeline_config(path)?,
            None => PipelineConfig::default(),
        };
        Self::from_lookup(|name| std::env::var(name).ok(), pipeline)
    }

    /// Builds settings from `lookup` (an environment accessor) and an already
    /// parsed pipeline configuration.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        pipeline: PipelineConfig,
    ) -> Result<Self> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let Some(github_token) = GITHUB_TOKEN_VARS.iter().find_map(|name| non_empty(name)) else {
            bail!(
                "missing GitHub credential: set {} or {}",
                GITHUB_TOKEN_VARS[0],
                GITHUB_TOKEN_VARS[1]
            );
        };
        let Some(api_key) = non_empty(OPENAI_API_KEY) else {
            bail!("missing text-generation credential: set {OPENAI_API_KEY}");
        };

        let mut openai = OpenAiSettings::new(api_key);
        if let Some(model) = non_empty(OPENAI_MODEL) {
            openai.model = model;
        }
        if let Some(base_url) = non_empty(OPENAI_BASE_URL) {
            openai.base_url = base_url;
        }

        pipeline.validate()?;

        Ok(Self {
            github_token,
            github_api_url: non_empty(GITHUB_API_URL)
                .unwrap_or_else(|| github::DEFAULT_API_URL.to_owned()),
            openai,
            pipeline,
        })
    }
}

/// Parses and validates a pipeline TOML file.
pub fn load_pipeline_config(path: &Path) -> Result<PipelineConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    parse_pipeline_config(&text).with_context(|| format!("invalid config file {}", path.display()))
}

fn parse_pipeline_config(text: &str) -> Result<PipelineConfig> {
    let config: PipelineConfig = toml::from_str(text)?;
    config.validate()?;
    Ok(config)
}
