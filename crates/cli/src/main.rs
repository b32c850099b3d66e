//! AutoDoc CLI entry point.
//!
//! This binary is the composition root for the entire system:
//!
//! 1. **Wire observability**: `tracing-subscriber` with a text or JSON layer
//!    and, when `OTEL_EXPORTER_OTLP_ENDPOINT` is set, an OpenTelemetry OTLP
//!    exporter. Spans from every crate in the workspace flow through it.
//! 2. **Load settings**: credentials from the environment (missing ones are
//!    fatal) and pipeline tuning from an optional TOML file, validated once.
//! 3. **Construct infrastructure**: `GitHubClient` and `OpenAiGenerator`,
//!    injected into the `PipelineOrchestrator`.
//! 4. **Run**: ingest push payloads and print each run result as JSON on
//!    stdout. The exit code is non-zero when any run did not succeed.

mod commands;
mod settings;
mod telemetry;

use std::process::ExitCode;

use clap::Parser;

use commands::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let telemetry = telemetry::init(cli.log_format, cli.verbose)?;
    let result = commands::run(cli).await;
    telemetry.shutdown();
    result
}
