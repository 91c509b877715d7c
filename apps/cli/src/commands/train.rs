//! Wires config, dataset, reference adapters and sinks into one training run.

use anyhow::{Context, Result};
use colored::Colorize;
use rbox_training::reference::{Adam, AdamParams, BoxPriorModel};
use rbox_training::{
    Checkpointer, DatasetIndex, JsonlMetricsSink, LoopSettings, RandomBatcher, RunLayout,
    RunSummary, SequenceBatcher, StdoutProgressSink, TrainConfig, TrainingContext,
    TrainingOrchestrator,
};
use std::path::Path;

#[derive(Debug)]
pub struct TrainOutcome {
    pub layout: RunLayout,
    pub summary: RunSummary,
}

pub fn execute(config_path: &Path, resume: Option<&Path>) -> Result<TrainOutcome> {
    let config = TrainConfig::load(config_path)?;
    tracing::info!(
        config = %config_path.display(),
        device = %config.device(),
        budget = ?config.budget(),
        batch_size = config.batch_size,
        "configuration loaded"
    );

    let input_dir = config.input_dir();
    let index = DatasetIndex::load(&input_dir)?;
    if index.train.is_empty() {
        anyhow::bail!("training split under {} is empty", input_dir.display());
    }
    tracing::debug!(fingerprint = %index.fingerprint(), "dataset fingerprint");

    let layout = RunLayout::starting_now(config.root_dir.clone());
    layout.create(config_path).with_context(|| {
        format!("failed to prepare run directory {}", layout.run_dir().display())
    })?;
    tracing::info!(run_dir = %layout.run_dir().display(), "run directory ready");

    let mut orchestrator = TrainingOrchestrator::new(
        LoopSettings::from_config(&config),
        RandomBatcher::new(&index.train, &index.annotations, config.batch_size, config.seed),
        SequenceBatcher::new(&index.val, &index.annotations, config.batch_size),
        Checkpointer::new(layout.best_model_path()),
        JsonlMetricsSink::create(&layout.events_path())?,
        StdoutProgressSink,
    )?;
    let mut ctx = TrainingContext::new(
        BoxPriorModel::new(config.device()),
        Adam::new(AdamParams::from_config(&config)),
    );

    let state = orchestrator.initialize(&mut ctx, resume)?;
    let summary = orchestrator.run_iters(&mut ctx, state)?;
    Ok(TrainOutcome { layout, summary })
}

pub fn print_summary(outcome: &TrainOutcome) {
    let summary = &outcome.summary;
    let best = summary.best_dev_loss().map_or_else(|| "n/a".to_string(), |l| format!("{l:.6}"));

    println!();
    println!("{}", "Training finished".bold().green());
    println!("  {:<14} {}", "iterations", summary.final_state.iteration);
    println!("  {:<14} {}", "evaluations", summary.evaluations);
    println!("  {:<14} {}", "best dev loss", best.cyan());
    println!("  {:<14} {}", "checkpoints", summary.checkpoints_written);
    println!("  {:<14} {}", "run dir", outcome.layout.run_dir().display().to_string().dimmed());
}
