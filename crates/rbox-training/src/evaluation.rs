//! Full validation pass with a sample-weighted average loss.

use crate::adapter::ModelAdapter;
use crate::batch::{Batch, BatchSource};
use crate::error::TrainingResult;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationResult {
    pub average_loss: f64,
    pub sample_count: usize,
}

impl EvaluationResult {
    /// Reported loss when the validation split yields no batches.
    pub const EMPTY_SENTINEL: f64 = -1.0;

    #[must_use]
    pub fn empty() -> Self {
        Self { average_loss: Self::EMPTY_SENTINEL, sample_count: 0 }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }
}

/// Drains the validation source once per call.
#[derive(Debug)]
pub struct EvaluationRunner<S> {
    source: S,
}

impl<S: BatchSource> EvaluationRunner<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Put the model in eval mode and run one ordered pass over the validation
    /// split, weighting each batch loss by its sample count. The pass never
    /// wraps around; an empty split is reported as [`EvaluationResult::empty`].
    pub fn run_full_evaluation<M>(&mut self, model: &mut M) -> TrainingResult<EvaluationResult>
    where
        M: ModelAdapter<Batch = S::Batch>,
    {
        model.eval();
        self.source.restart();

        let mut weighted_loss = 0.0;
        let mut sample_count = 0usize;
        while let Some(batch) = self.source.next_batch()? {
            let predictions = model.forward(&batch)?;
            let loss = model.compute_loss(&predictions, &batch)?;
            weighted_loss += loss * batch.len() as f64;
            sample_count += batch.len();
        }

        if sample_count == 0 {
            return Ok(EvaluationResult::empty());
        }
        Ok(EvaluationResult { average_loss: weighted_loss / sample_count as f64, sample_count })
    }
}
