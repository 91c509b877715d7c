//! rbox-train - run one training job for the rotated-box ship detector.
//!
//! Reads a JSON run configuration, trains until the iteration budget is spent
//! and keeps the best validation snapshot under `<root_dir>/log/train_<ts>/`.

mod commands;

use clap::{Parser, ValueEnum};
use colored::Colorize;
use rbox_training::TrainingError;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "rbox-train",
    author,
    version,
    about = "Train the rotated-box ship detector",
    long_about = "Runs the training loop described by a JSON config: periodic progress lines, \
                  validation every `eval_every` iterations and a single best-model checkpoint."
)]
struct Args {
    /// Path to the JSON run configuration
    config: PathBuf,

    /// Resume model, optimizer and progress from a saved checkpoint
    #[arg(long, value_name = "CHECKPOINT")]
    resume: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log line format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Logs go to stderr so stdout carries only the progress lines.
fn init_tracing(level: &str, format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(err) = init_tracing(&args.log_level, args.log_format) {
        eprintln!("{} {err:#}", "error:".red().bold());
        return ExitCode::FAILURE;
    }

    match commands::train::execute(&args.config, args.resume.as_deref()) {
        Ok(outcome) => {
            commands::train::print_summary(&outcome);
            ExitCode::SUCCESS
        }
        Err(err) => {
            let before_loop =
                err.downcast_ref::<TrainingError>().is_some_and(TrainingError::is_config_error);
            tracing::error!(error = %format!("{err:#}"), before_loop, "training failed");
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}
