use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use volley_core::runner::Pattern;

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }

    humantime::parse_duration(s)
        .map_err(|err| format!("invalid duration '{s}': {err} (expected e.g. 10s, 250ms, 1m)"))
}

fn parse_pattern(input: &str) -> Result<Pattern, String> {
    input.trim().parse().map_err(|_| {
        format!("invalid phase pattern '{input}' (expected sequence, cycle, or random)")
    })
}

fn parse_header(input: &str) -> Result<(String, String), String> {
    let Some((name, value)) = input.split_once(':') else {
        return Err(format!("invalid header '{input}' (expected KEY:VALUE)"));
    };
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("invalid header '{input}': empty name"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable plan overview and phase summaries.
    HumanReadable,
    /// Emit NDJSON lines (`plan`, `phase`, `run`) to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "volley",
    author,
    version,
    about = "Multi-phase HTTP load generator",
    long_about = "volley drives a target service through a plan of phases.\n\nEach phase runs groups of workers that POST the phase workload to the target at a fixed pace, bracketed by optional setup and teardown requests. Phases are scheduled in sequence, round-robin (cycle), or at random until every phase has used up its repeats.",
    after_help = "Examples:\n  volley check plan.yaml\n  volley run plan.yaml --host 127.0.0.1 --port 8080\n  volley run plan.yaml --host app --port 80 --header Host:api.internal --total-duration 2h\n  volley run plan.yaml --host app --port 80 --phase-pattern random --repeats-per-phase 0 --output json"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Execute a plan against a target
    Run(RunArgs),

    /// Validate a plan and print its duration budget without sending requests
    Check(CheckArgs),
}

/// Flags shared by every command that loads a plan.
#[derive(Debug, Args)]
pub struct PlanArgs {
    /// Path to the plan (.json, otherwise YAML)
    pub plan: PathBuf,

    /// Spread this total runtime evenly across all phase executions (e.g. 90m, 2h)
    #[arg(long, value_parser = parse_duration)]
    pub total_duration: Option<Duration>,

    /// -1 uses the plan's repeat values, 0 means unlimited (capped at 500), N runs every phase N times
    #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
    pub repeats_per_phase: i64,

    /// Override the plan's phase pattern: sequence, cycle, or random
    #[arg(long, value_parser = parse_pattern)]
    pub phase_pattern: Option<Pattern>,

    /// Lower bound for any phase or worker-group duration
    #[arg(long, value_parser = parse_duration, default_value = "60s")]
    pub min_phase_duration: Duration,
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    #[command(flatten)]
    pub plan: PlanArgs,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub plan: PlanArgs,

    /// Target host
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Target port
    #[arg(long, default_value_t = 8080)]
    pub port: u16,

    /// Extra request header (repeatable, KEY:VALUE). `Host:<name>` selects the virtual host.
    #[arg(long = "header", value_name = "KEY:VALUE", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Stop the whole run after this long, regardless of remaining phases
    #[arg(long, value_parser = parse_duration)]
    pub run_timeout: Option<Duration>,

    /// Interval between throughput reports while workers run
    #[arg(long, value_parser = parse_duration, default_value = "10s")]
    pub report_interval: Duration,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,

    /// Log filter (e.g. info, debug, volley_core=trace); falls back to RUST_LOG
    #[arg(long, env = "VOLLEY_LOG")]
    pub log_level: Option<String>,
}
