//! CLI argument definitions and command handlers.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use github::GitHubClient;
use listener::{ingest, Ingested, WebhookDelivery, PUSH_EVENT};
use llm::OpenAiGenerator;
use nodes::{Collaborators, PipelineOrchestrator, RunOutcome};
use pipeline::SystemClock;
use serde::Serialize;
use serde_json::json;
use tokio::io::AsyncReadExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::settings::Settings;
use crate::telemetry::LogFormat;

/// Generate documentation pull requests from repository pushes.
#[derive(Debug, Parser)]
#[command(name = "autodoc", version, about)]
pub struct Cli {
    /// Pipeline configuration file (TOML). Defaults apply when omitted.
    #[arg(long, global = true, env = "AUTODOC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the pipeline for one webhook payload.
    Run {
        /// Path to the JSON payload, or `-` for stdin.
        #[arg(long)]
        payload: PathBuf,

        /// Webhook event type (`X-GitHub-Event`).
        #[arg(long, default_value = PUSH_EVENT)]
        event: String,

        /// Webhook delivery id (`X-GitHub-Delivery`).
        #[arg(long)]
        delivery: Option<String>,
    },

    /// Run the pipeline for several push payloads concurrently.
    Batch {
        /// Paths to JSON push payloads.
        #[arg(required = true)]
        payloads: Vec<PathBuf>,

        /// Maximum runs in flight at once.
        #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(u16).range(1..))]
        max_concurrent: u16,
    },

    /// Validate credentials and configuration, then print the effective settings.
    CheckConfig,
}

/// Dispatches the parsed command.
pub async fn run(cli: Cli) -> Result<ExitCode> {
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Command::Run {
            payload,
            event,
            delivery,
        } => cmd_run(&settings, &payload, &event, delivery.as_deref()).await,
        Command::Batch {
            payloads,
            max_concurrent,
        } => cmd_batch(&settings, payloads, usize::from(max_concurrent)).await,
        Command::CheckConfig => cmd_check_config(&settings),
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_run(
    settings: &Settings,
    payload: &Path,
    event_type: &str,
    delivery_id: Option<&str>,
) -> Result<ExitCode> {
    let body = read_payload(payload).await?;
    let ingested = ingest(
        WebhookDelivery {
            event_type: Some(event_type),
            delivery_id,
            body: &body,
        },
        &settings.pipeline.trigger,
    );

    match ingested {
        Ingested::Accepted(event) => {
            let orchestrator = build_orchestrator(settings)?;
            let report = orchestrator.run(event).await;
            print_json(&report)?;
            Ok(exit_code(&report.outcome))
        }
        other => {
            let (value, ok) = not_started(&other);
            print_json(&value)?;
            Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
    }
}

async fn cmd_batch(settings: &Settings, payloads: Vec<PathBuf>, max_concurrent: usize) -> Result<ExitCode> {
    let orchestrator = Arc::new(build_orchestrator(settings)?);
    let permits = Arc::new(Semaphore::new(max_concurrent));
    let mut runs = JoinSet::new();
    let mut failed = 0usize;

    for path in payloads {
        let body = read_payload(&path).await?;
        let delivery_id = path.display().to_string();
        let ingested = ingest(
            WebhookDelivery {
                event_type: Some(PUSH_EVENT),
                delivery_id: Some(&delivery_id),
                body: &body,
            },
            &settings.pipeline.trigger,
        );

        match ingested {
            Ingested::Accepted(event) => {
                let orchestrator = Arc::clone(&orchestrator);
                let permits = Arc::clone(&permits);
                runs.spawn(async move {
                    // The semaphore is never closed.
                    let _permit = permits.acquire_owned().await.ok();
                    (path, orchestrator.run(event).await)
                });
            }
            other => {
                let (value, ok) = not_started(&other);
                if !ok {
                    failed += 1;
                }
                print_json_line(&json!({ "payload": path.display().to_string(), "result": value }))?;
            }
        }
    }

    info!(in_flight = runs.len(), "batch runs started");
    while let Some(joined) = runs.join_next().await {
        match joined {
            Ok((path, report)) => {
                if !report.outcome.is_success() {
                    failed += 1;
                }
                print_json_line(&json!({ "payload": path.display().to_string(), "result": report }))?;
            }
            Err(err) => {
                failed += 1;
                error!(error = %err, "pipeline run task aborted");
            }
        }
    }

    info!(failed, "batch complete");
    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn cmd_check_config(settings: &Settings) -> Result<ExitCode> {
    print_json(&json!({
        "github_api_url": settings.github_api_url,
        "openai_model": settings.openai.model,
        "openai_base_url": settings.openai.base_url,
        "pipeline": settings.pipeline,
    }))?;
    Ok(ExitCode::SUCCESS)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn build_orchestrator(settings: &Settings) -> Result<PipelineOrchestrator> {
    let repository = GitHubClient::new(&settings.github_token, settings.github_api_url.clone())
        .context("failed to create GitHub client")?;
    let generator = OpenAiGenerator::new(settings.openai.clone())
        .context("failed to create text generator")?;

    let orchestrator = PipelineOrchestrator::new(
        Collaborators {
            repository: Arc::new(repository),
            generator: Arc::new(generator),
            clock: Arc::new(SystemClock),
        },
        &settings.pipeline,
    )?;
    Ok(orchestrator)
}

/// Output for a delivery that did not start a run, and whether that counts
/// as success.
fn not_started(ingested: &Ingested) -> (serde_json::Value, bool) {
    match ingested {
        Ingested::Rejected { error, .. } => (
            serde_json::to_value(RunOutcome::rejected(error)).unwrap_or_default(),
            false,
        ),
        other => (other.ack().body, true),
    }
}

fn exit_code(outcome: &RunOutcome) -> ExitCode {
    if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn read_payload(path: &Path) -> Result<Vec<u8>> {
    if path.as_os_str() == "-" {
        let mut body = Vec::new();
        tokio::io::stdin()
            .read_to_end(&mut body)
            .await
            .context("failed to read payload from stdin")?;
        return Ok(body);
    }
    tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read payload {}", path.display()))
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_json_line(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
