//! Training progress and serializable parameter state.

use crate::error::{TrainingError, TrainingResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Decay of the exponential moving average over per-step loss.
pub const SMOOTHING_DECAY: f64 = 0.99;

/// Exponential moving average of the step loss.
///
/// Purely diagnostic; never feeds back into gradients. The first observed
/// loss initializes the average directly, so a legitimate zero loss is never
/// mistaken for "not yet initialized".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SmoothedLoss(Option<f64>);

impl SmoothedLoss {
    #[must_use]
    pub fn unset() -> Self {
        Self(None)
    }

    #[must_use]
    pub fn resumed_at(value: f64) -> Self {
        Self(Some(value))
    }

    #[must_use]
    pub fn value(self) -> Option<f64> {
        self.0
    }

    #[must_use]
    pub fn is_initialized(self) -> bool {
        self.0.is_some()
    }

    /// Fold one step loss into the average and return the new value.
    pub fn update(&mut self, step_loss: f64) -> f64 {
        let next = match self.0 {
            None => step_loss,
            Some(prev) => SMOOTHING_DECAY * prev + (1.0 - SMOOTHING_DECAY) * step_loss,
        };
        self.0 = Some(next);
        next
    }
}

/// Live progress of a run, exclusively owned by the orchestrator.
///
/// Model and optimizer internals live in the `TrainingContext`; a checkpoint
/// snapshots both together with this struct.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingState {
    pub iteration: u64,
    pub smoothed_loss: SmoothedLoss,
    /// Lowest validation loss seen by this run; `None` until the first evaluation.
    pub best_dev_loss: Option<f64>,
}

impl TrainingState {
    #[must_use]
    pub fn fresh() -> Self {
        Self::default()
    }
}

/// A dense tensor in row-major order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorData {
    pub shape: Vec<usize>,
    pub values: Vec<f32>,
}

impl TensorData {
    pub fn new(shape: Vec<usize>, values: Vec<f32>) -> TrainingResult<Self> {
        let expected: usize = shape.iter().product();
        if expected != values.len() {
            return Err(TrainingError::StateRestore(format!(
                "tensor shape {shape:?} needs {expected} values, got {}",
                values.len()
            )));
        }
        Ok(Self { shape, values })
    }

    #[must_use]
    pub fn vector(values: Vec<f32>) -> Self {
        Self { shape: vec![values.len()], values }
    }
}

/// Named tensors making up a model's or optimizer's internal state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateDict {
    tensors: BTreeMap<String, TensorData>,
}

impl StateDict {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: TensorData) {
        self.tensors.insert(name.into(), tensor);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TensorData> {
        self.tensors.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TensorData)> {
        self.tensors.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Name of the first tensor holding a NaN or infinite value.
    #[must_use]
    pub fn first_non_finite(&self) -> Option<&str> {
        self.tensors
            .iter()
            .find(|(_, t)| t.values.iter().any(|v| !v.is_finite()))
            .map(|(name, _)| name.as_str())
    }

    /// Strictly match this dict against the shapes a consumer expects: same
    /// names, same shapes, consistent value counts.
    pub fn check_shapes(&self, expected: &[(&str, &[usize])]) -> TrainingResult<()> {
        for (name, shape) in expected {
            let tensor = self.tensors.get(*name).ok_or_else(|| {
                TrainingError::StateRestore(format!("missing tensor `{name}`"))
            })?;
            if tensor.shape.as_slice() != *shape {
                return Err(TrainingError::StateRestore(format!(
                    "tensor `{name}`: expected shape {shape:?}, found {:?}",
                    tensor.shape
                )));
            }
            let count: usize = tensor.shape.iter().product();
            if count != tensor.values.len() {
                return Err(TrainingError::StateRestore(format!(
                    "tensor `{name}`: shape {:?} but {} values",
                    tensor.shape,
                    tensor.values.len()
                )));
            }
        }

        if let Some(extra) =
            self.tensors.keys().find(|k| !expected.iter().any(|(name, _)| *name == k.as_str()))
        {
            return Err(TrainingError::StateRestore(format!("unexpected tensor `{extra}`")));
        }
        Ok(())
    }
}

/// Serializable optimizer internals (step counter plus named buffers such as
/// adaptive moment estimates).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizerState {
    pub step: u64,
    pub buffers: StateDict,
}
