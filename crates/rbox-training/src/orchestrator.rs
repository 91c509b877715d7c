//! The training loop: update steps, loss smoothing, evaluation cadence and
//! best-model selection.
//!
//! Everything runs on one thread of control. Evaluation and checkpointing
//! block the loop for their whole duration, so model and optimizer state
//! always have a single owner.

use crate::adapter::{ModelAdapter, OptimizerAdapter, TrainingContext};
use crate::batch::BatchSource;
use crate::checkpoint::Checkpointer;
use crate::config::{IterationBudget, TrainConfig};
use crate::error::{TrainingError, TrainingResult};
use crate::evaluation::{EvaluationResult, EvaluationRunner};
use crate::metrics::{DEV_LOSS_TAG, MetricsSink, TRAIN_LOSS_TAG};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::state::TrainingState;
use std::path::Path;
use std::time::Instant;

/// Metrics are flushed at least this often, whatever the other cadences.
pub const METRICS_FLUSH_INTERVAL: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSettings {
    pub budget: IterationBudget,
    pub print_every: u64,
    pub eval_every: u64,
}

impl LoopSettings {
    #[must_use]
    pub fn from_config(config: &TrainConfig) -> Self {
        Self {
            budget: config.budget(),
            print_every: config.print_every,
            eval_every: config.eval_every,
        }
    }

    fn validate(&self) -> TrainingResult<()> {
        if self.print_every == 0 || self.eval_every == 0 {
            return Err(TrainingError::InvalidConfig(
                "print_every and eval_every must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub final_state: TrainingState,
    pub evaluations: u64,
    pub last_evaluation: Option<EvaluationResult>,
    pub checkpoints_written: u64,
}

impl RunSummary {
    #[must_use]
    pub fn best_dev_loss(&self) -> Option<f64> {
        self.final_state.best_dev_loss
    }
}

pub struct TrainingOrchestrator<T, V, K, P> {
    settings: LoopSettings,
    train_source: T,
    evaluator: EvaluationRunner<V>,
    checkpointer: Checkpointer,
    metrics: K,
    progress: P,
    last_report: Instant,
}

impl<T, V, K, P> TrainingOrchestrator<T, V, K, P>
where
    T: BatchSource,
    V: BatchSource<Batch = T::Batch>,
    K: MetricsSink,
    P: ProgressSink,
{
    pub fn new(
        settings: LoopSettings,
        train_source: T,
        val_source: V,
        checkpointer: Checkpointer,
        metrics: K,
        progress: P,
    ) -> TrainingResult<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            train_source,
            evaluator: EvaluationRunner::new(val_source),
            checkpointer,
            metrics,
            progress,
            last_report: Instant::now(),
        })
    }

    #[must_use]
    pub fn settings(&self) -> LoopSettings {
        self.settings
    }

    #[must_use]
    pub fn checkpointer(&self) -> &Checkpointer {
        &self.checkpointer
    }

    #[must_use]
    pub fn metrics(&self) -> &K {
        &self.metrics
    }

    #[must_use]
    pub fn progress(&self) -> &P {
        &self.progress
    }

    /// Starting state for a run: restored from `checkpoint` when given,
    /// otherwise iteration 0 with smoothing unset.
    pub fn initialize<M, O>(
        &self,
        ctx: &mut TrainingContext<M, O>,
        checkpoint: Option<&Path>,
    ) -> TrainingResult<TrainingState>
    where
        M: ModelAdapter<Batch = T::Batch>,
        O: OptimizerAdapter,
    {
        let Some(path) = checkpoint else {
            return Ok(TrainingState::fresh());
        };

        let record = Checkpointer::load(path)?;
        let state = record.restore_into(ctx)?;
        tracing::info!(
            path = %path.display(),
            iteration = state.iteration,
            smoothed_loss = ?state.smoothed_loss.value(),
            "resumed from checkpoint"
        );
        Ok(state)
    }

    /// One update: pull a batch (restarting the training source when a pass
    /// ends), zero gradients, forward, loss, backward, optimizer step. Returns
    /// the raw step loss; `state` advances by exactly one iteration and the
    /// smoothed loss absorbs the step.
    pub fn run_step<M, O>(
        &mut self,
        ctx: &mut TrainingContext<M, O>,
        state: &mut TrainingState,
    ) -> TrainingResult<f64>
    where
        M: ModelAdapter<Batch = T::Batch>,
        O: OptimizerAdapter,
    {
        let batch = self.next_training_batch()?;

        ctx.model.train();
        ctx.zero_gradients();
        let predictions = ctx.model.forward(&batch)?;
        let loss = ctx.model.compute_loss(&predictions, &batch)?;
        ctx.model.backward()?;
        ctx.optimizer_step()?;

        state.iteration += 1;
        state.smoothed_loss.update(loss);
        Ok(loss)
    }

    fn next_training_batch(&mut self) -> TrainingResult<T::Batch> {
        if let Some(batch) = self.train_source.next_batch()? {
            return Ok(batch);
        }

        tracing::debug!("training pass exhausted, restarting source");
        self.train_source.restart();
        self.train_source.next_batch()?.ok_or_else(|| {
            TrainingError::Step(
                "training source yields no batches even after a restart".to_string(),
            )
        })
    }

    /// Run update steps until the budget is spent, reporting, flushing and
    /// evaluating on their respective cadences.
    pub fn run_iters<M, O>(
        &mut self,
        ctx: &mut TrainingContext<M, O>,
        mut state: TrainingState,
    ) -> TrainingResult<RunSummary>
    where
        M: ModelAdapter<Batch = T::Batch>,
        O: OptimizerAdapter,
    {
        let parameters = ctx.model.parameter_count();
        tracing::info!(
            start_iteration = state.iteration,
            budget = ?self.settings.budget,
            parameters,
            "training started"
        );
        self.progress.on_event(ProgressEvent::Started { iteration: state.iteration, parameters });

        let mut summary = RunSummary {
            final_state: state.clone(),
            evaluations: 0,
            last_evaluation: None,
            checkpoints_written: 0,
        };
        self.last_report = Instant::now();

        while self.settings.budget.allows(state.iteration) {
            let step_loss = self.run_step(ctx, &mut state)?;
            let iteration = state.iteration;
            let smoothed = state.smoothed_loss.value().unwrap_or(step_loss);

            self.metrics.add_scalar(TRAIN_LOSS_TAG, smoothed, iteration)?;

            if iteration % METRICS_FLUSH_INTERVAL == 0 {
                self.metrics.flush()?;
            }

            if iteration % self.settings.print_every == 0 {
                let now = Instant::now();
                let elapsed_secs = now.duration_since(self.last_report).as_secs_f64();
                self.last_report = now;
                self.progress.on_event(ProgressEvent::Report {
                    iteration,
                    interval: self.settings.print_every,
                    elapsed_secs,
                    smoothed_loss: smoothed,
                });
            }

            if iteration % self.settings.eval_every == 0 {
                self.evaluate_and_checkpoint(ctx, &mut state, &mut summary)?;
            }
        }

        self.metrics.flush()?;
        self.progress.on_event(ProgressEvent::Finished { iteration: state.iteration });
        tracing::info!(
            iteration = state.iteration,
            best_dev_loss = ?state.best_dev_loss,
            checkpoints = summary.checkpoints_written,
            "training finished"
        );

        summary.final_state = state;
        Ok(summary)
    }

    /// Evaluate, compare against the watermark, persist on strict improvement.
    fn evaluate_and_checkpoint<M, O>(
        &mut self,
        ctx: &mut TrainingContext<M, O>,
        state: &mut TrainingState,
        summary: &mut RunSummary,
    ) -> TrainingResult<()>
    where
        M: ModelAdapter<Batch = T::Batch>,
        O: OptimizerAdapter,
    {
        let iteration = state.iteration;
        let result = self.evaluator.run_full_evaluation(&mut ctx.model)?;
        if result.is_empty() {
            tracing::warn!(iteration, "validation split yielded no batches");
        }
        tracing::info!(
            iteration,
            dev_loss = result.average_loss,
            samples = result.sample_count,
            "evaluation done"
        );

        self.metrics.add_scalar(DEV_LOSS_TAG, result.average_loss, iteration)?;
        self.progress.on_event(ProgressEvent::Evaluated {
            iteration,
            dev_loss: result.average_loss,
            samples: result.sample_count,
        });
        summary.evaluations += 1;
        summary.last_evaluation = Some(result);

        let outcome = self.checkpointer.maybe_save(state, ctx, &result, state.best_dev_loss)?;
        state.best_dev_loss = Some(outcome.best_dev_loss);
        if let Some(saved) = outcome.saved {
            summary.checkpoints_written += 1;
            self.progress.on_event(ProgressEvent::Saved {
                iteration: saved.iteration,
                path: saved.path,
                sha256: saved.sha256,
            });
        }
        Ok(())
    }
}
