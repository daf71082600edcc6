pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use dealcast_core::config::{AppConfig, LoadOptions, LogFormat};

use crate::commands::analyze::{Analysis, AnalysisArgs};

#[derive(Debug, Parser)]
#[command(
    name = "dealcast",
    about = "Dealcast pipeline analytics CLI",
    long_about = "Forecast revenue, score open deals, and assess pipeline health from an opportunity snapshot.",
    after_help = "Examples:\n  dealcast metrics --input snapshot.json --period 6-months\n  dealcast probabilities --input snapshot.json --seed 7\n  dealcast doctor --json --input snapshot.json"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Config file to load instead of dealcast.toml")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Dashboard summary: predicted revenue, growth, expected deals, insights")]
    Metrics(AnalysisArgs),
    #[command(about = "Monthly revenue history followed by the projected horizon")]
    Forecast(AnalysisArgs),
    #[command(about = "Win probability and risk for every open deal, highest first")]
    Probabilities(AnalysisArgs),
    #[command(about = "Pipeline health score, stage velocity, and at-risk deals")]
    Health(AnalysisArgs),
    #[command(about = "Momentum, funnel balance, rep variance, deal size, and seasonality insights")]
    Insights(AnalysisArgs),
    #[command(about = "Prioritized actions for stale deals, coaching, and pipeline coverage")]
    Recommend(AnalysisArgs),
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config and, given --input, snapshot readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
        #[arg(long, help = "Snapshot to check for analysis readiness")]
        input: Option<PathBuf>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = LoadOptions {
        require_file: cli.config.is_some(),
        config_path: cli.config,
        ..LoadOptions::default()
    };

    // Commands report config failures themselves; logging falls back to defaults.
    let logging_config = AppConfig::load(options.clone()).unwrap_or_default();
    if let Err(error) = init_logging(&logging_config) {
        eprintln!("dealcast: {error:#}");
    }

    let result = match cli.command {
        Command::Metrics(args) => commands::analyze::run(Analysis::Metrics, &args, options),
        Command::Forecast(args) => commands::analyze::run(Analysis::Forecast, &args, options),
        Command::Probabilities(args) => {
            commands::analyze::run(Analysis::Probabilities, &args, options)
        }
        Command::Health(args) => commands::analyze::run(Analysis::Health, &args, options),
        Command::Insights(args) => commands::analyze::run(Analysis::Insights, &args, options),
        Command::Recommend(args) => commands::analyze::run(Analysis::Recommend, &args, options),
        Command::Config => commands::config::run(options),
        Command::Doctor { json, input } => commands::doctor::run(json, input.as_deref(), options),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Installs the global subscriber. Events go to stderr so stdout stays machine-readable.
fn init_logging(config: &AppConfig) -> Result<()> {
    use tracing::Level;

    let log_level = config
        .logging
        .level
        .parse::<Level>()
        .with_context(|| format!("invalid log level `{}`", config.logging.level))?;
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let installed = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    installed.map_err(|error| anyhow!("failed to install tracing subscriber: {error}"))
}
