//! Capability interfaces the orchestrator drives.
//!
//! Concrete tensor-framework bindings implement these outside the core; the
//! CPU reference implementations live in [`crate::reference`].

use crate::batch::Batch;
use crate::error::TrainingResult;
use crate::state::{OptimizerState, StateDict};

/// A trainable parameter exposed to an optimizer: its values and the gradient
/// accumulated by the last backward pass.
#[derive(Debug)]
pub struct Parameter<'a> {
    pub name: &'a str,
    pub values: &'a mut [f32],
    pub grads: &'a mut [f32],
}

pub trait ModelAdapter {
    type Batch: Batch;
    type Output;

    fn forward(&mut self, batch: &Self::Batch) -> TrainingResult<Self::Output>;

    fn compute_loss(&mut self, predictions: &Self::Output, batch: &Self::Batch)
    -> TrainingResult<f64>;

    /// Accumulate gradients of the most recently computed loss.
    fn backward(&mut self) -> TrainingResult<()>;

    /// Enable gradient tracking and stochastic layers.
    fn train(&mut self);

    /// Disable gradient tracking; stochastic layers become deterministic.
    fn eval(&mut self);

    fn parameters(&mut self) -> Vec<Parameter<'_>>;

    fn state_snapshot(&self) -> StateDict;

    /// Load a snapshot. Must fail with `StateRestore` unless every tensor
    /// matches the model's own shapes exactly.
    fn restore_state(&mut self, state: &StateDict) -> TrainingResult<()>;

    fn parameter_count(&mut self) -> usize {
        self.parameters().iter().map(|p| p.values.len()).sum()
    }
}

pub trait OptimizerAdapter {
    fn zero_gradients(&mut self, params: &mut [Parameter<'_>]) {
        for p in params.iter_mut() {
            p.grads.fill(0.0);
        }
    }

    fn step(&mut self, params: &mut [Parameter<'_>]) -> TrainingResult<()>;

    fn state_snapshot(&self) -> OptimizerState;

    fn restore_state(&mut self, state: &OptimizerState) -> TrainingResult<()>;

    /// Check restored internals against the model's parameters. Fails with
    /// `StateRestore` on a buffer for an unknown parameter or of the wrong
    /// length.
    fn validate_against(&self, _params: &[Parameter<'_>]) -> TrainingResult<()> {
        Ok(())
    }
}

/// Model and optimizer of one run, passed explicitly through every
/// orchestrator call.
#[derive(Debug)]
pub struct TrainingContext<M, O> {
    pub model: M,
    pub optimizer: O,
}

impl<M, O> TrainingContext<M, O>
where
    M: ModelAdapter,
    O: OptimizerAdapter,
{
    pub fn new(model: M, optimizer: O) -> Self {
        Self { model, optimizer }
    }

    pub fn zero_gradients(&mut self) {
        let mut params = self.model.parameters();
        self.optimizer.zero_gradients(&mut params);
    }

    pub fn optimizer_step(&mut self) -> TrainingResult<()> {
        let mut params = self.model.parameters();
        self.optimizer.step(&mut params)
    }
}
