//! Best-model checkpointing.
//!
//! A single slot on disk holds the snapshot with the lowest validation loss
//! seen so far in the run. It is overwritten in place, atomically: the record
//! is written to a `.tmp` sibling and renamed over the slot.

use crate::adapter::{ModelAdapter, OptimizerAdapter, TrainingContext};
use crate::error::{TrainingError, TrainingResult};
use crate::evaluation::EvaluationResult;
use crate::state::{OptimizerState, SmoothedLoss, StateDict, TrainingState};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Everything needed to resume a run exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub iteration: u64,
    pub model_state: StateDict,
    pub optimizer_state: OptimizerState,
    pub smoothed_loss: SmoothedLoss,
}

impl CheckpointRecord {
    pub fn capture<M, O>(state: &TrainingState, ctx: &TrainingContext<M, O>) -> Self
    where
        M: ModelAdapter,
        O: OptimizerAdapter,
    {
        Self {
            iteration: state.iteration,
            model_state: ctx.model.state_snapshot(),
            optimizer_state: ctx.optimizer.state_snapshot(),
            smoothed_loss: state.smoothed_loss,
        }
    }

    /// Load model and optimizer internals into `ctx` and return the progress
    /// to continue from. Optimizer buffers must match the restored model's
    /// parameters. The best-loss watermark is not carried over: each
    /// run owns a fresh best-model slot.
    pub fn restore_into<M, O>(
        &self,
        ctx: &mut TrainingContext<M, O>,
    ) -> TrainingResult<TrainingState>
    where
        M: ModelAdapter,
        O: OptimizerAdapter,
    {
        ctx.model.restore_state(&self.model_state)?;
        ctx.optimizer.restore_state(&self.optimizer_state)?;
        let params = ctx.model.parameters();
        ctx.optimizer.validate_against(&params)?;
        Ok(TrainingState {
            iteration: self.iteration,
            smoothed_loss: self.smoothed_loss,
            best_dev_loss: None,
        })
    }

    /// JSON has no NaN or infinity, so a record holding one would not load back.
    fn ensure_finite(&self) -> TrainingResult<()> {
        let diverged = |what: String| {
            TrainingError::Step(format!(
                "refusing to checkpoint iteration {}: {what} is not finite",
                self.iteration
            ))
        };
        if let Some(v) = self.smoothed_loss.value().filter(|v| !v.is_finite()) {
            return Err(diverged(format!("smoothed_loss ({v})")));
        }
        if let Some(name) = self.model_state.first_non_finite() {
            return Err(diverged(format!("model tensor `{name}`")));
        }
        if let Some(name) = self.optimizer_state.buffers.first_non_finite() {
            return Err(diverged(format!("optimizer buffer `{name}`")));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedCheckpoint {
    pub iteration: u64,
    pub path: PathBuf,
    pub sha256: String,
}

/// Result of one compare-and-maybe-persist cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveOutcome {
    pub best_dev_loss: f64,
    pub saved: Option<SavedCheckpoint>,
}

/// Strict improvement: ties never count.
#[must_use]
pub fn improves(candidate: f64, best_so_far: Option<f64>) -> bool {
    best_so_far.is_none_or(|best| candidate < best)
}

#[derive(Debug, Clone)]
pub struct Checkpointer {
    path: PathBuf,
}

impl Checkpointer {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist `record` over the slot. A record with non-finite values is a
    /// `Step` error and leaves the slot untouched; any I/O failure is a
    /// `Storage` error.
    pub fn save(&self, record: &CheckpointRecord) -> TrainingResult<SavedCheckpoint> {
        record.ensure_finite()?;
        let bytes = serde_json::to_vec(record)?;
        let tmp = self.path.with_extension("tmp");

        let mut file = std::fs::File::create(&tmp).map_err(|e| TrainingError::storage(&tmp, e))?;
        file.write_all(&bytes).map_err(|e| TrainingError::storage(&tmp, e))?;
        file.sync_all().map_err(|e| TrainingError::storage(&tmp, e))?;
        drop(file);
        std::fs::rename(&tmp, &self.path).map_err(|e| TrainingError::storage(&self.path, e))?;

        Ok(SavedCheckpoint {
            iteration: record.iteration,
            path: self.path.clone(),
            sha256: hex::encode(Sha256::digest(&bytes)),
        })
    }

    pub fn load(path: &Path) -> TrainingResult<CheckpointRecord> {
        let bytes = std::fs::read(path).map_err(|e| {
            TrainingError::StateRestore(format!("cannot read checkpoint {}: {e}", path.display()))
        })?;
        serde_json::from_slice(&bytes).map_err(|e| {
            TrainingError::StateRestore(format!("corrupt checkpoint {}: {e}", path.display()))
        })
    }

    /// Compare an evaluation against the watermark and persist a snapshot of
    /// the current run on strict improvement. No I/O happens otherwise.
    pub fn maybe_save<M, O>(
        &self,
        state: &TrainingState,
        ctx: &TrainingContext<M, O>,
        eval: &EvaluationResult,
        best_so_far: Option<f64>,
    ) -> TrainingResult<SaveOutcome>
    where
        M: ModelAdapter,
        O: OptimizerAdapter,
    {
        if !improves(eval.average_loss, best_so_far) {
            // `improves` is only false when a watermark exists.
            let best_dev_loss = best_so_far.unwrap_or(eval.average_loss);
            tracing::debug!(
                iteration = state.iteration,
                dev_loss = eval.average_loss,
                best_dev_loss,
                "no improvement, checkpoint skipped"
            );
            return Ok(SaveOutcome { best_dev_loss, saved: None });
        }

        tracing::info!(
            iteration = state.iteration,
            path = %self.path.display(),
            "saving best model"
        );
        let saved = self.save(&CheckpointRecord::capture(state, ctx))?;
        tracing::info!(sha256 = %saved.sha256, "best model saved");
        Ok(SaveOutcome { best_dev_loss: eval.average_loss, saved: Some(saved) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::TensorData;
    use tempfile::TempDir;

    fn record(iteration: u64, smoothed: f64) -> CheckpointRecord {
        let mut model_state = StateDict::new();
        model_state.insert("w", TensorData::new(vec![1, 2], vec![0.5, -1.5]).unwrap());
        let mut buffers = StateDict::new();
        buffers.insert("m.w", TensorData::new(vec![1, 2], vec![0.01, 0.02]).unwrap());
        CheckpointRecord {
            iteration,
            model_state,
            optimizer_state: OptimizerState { step: iteration, buffers },
            smoothed_loss: SmoothedLoss::resumed_at(smoothed),
        }
    }

    #[test]
    fn test_improves_is_strict() {
        assert!(improves(3.0, None));
        assert!(improves(-1.0, None));
        assert!(improves(0.4, Some(0.5)));
        assert!(!improves(0.5, Some(0.5)));
        assert!(!improves(0.6, Some(0.5)));
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let temp = TempDir::new().unwrap();
        let checkpointer = Checkpointer::new(temp.path().join("bestmodel"));

        let saved = checkpointer.save(&record(5, 0.8)).unwrap();
        assert_eq!(saved.iteration, 5);
        assert_eq!(saved.sha256.len(), 64);
        assert!(!temp.path().join("bestmodel.tmp").exists());

        let loaded = Checkpointer::load(checkpointer.path()).unwrap();
        assert_eq!(loaded, record(5, 0.8));
    }

    #[test]
    fn test_file_has_expected_fields() {
        let temp = TempDir::new().unwrap();
        let checkpointer = Checkpointer::new(temp.path().join("bestmodel"));
        checkpointer.save(&record(2, 1.25)).unwrap();

        let value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(checkpointer.path()).unwrap()).unwrap();
        assert_eq!(value["iteration"], 2);
        assert_eq!(value["smoothed_loss"], 1.25);
        assert!(value["model_state"]["w"]["shape"].is_array());
        assert_eq!(value["optimizer_state"]["step"], 2);
    }

    #[test]
    fn test_save_overwrites_slot() {
        let temp = TempDir::new().unwrap();
        let checkpointer = Checkpointer::new(temp.path().join("bestmodel"));
        checkpointer.save(&record(3, 1.0)).unwrap();
        checkpointer.save(&record(9, 0.2)).unwrap();

        assert_eq!(Checkpointer::load(checkpointer.path()).unwrap().iteration, 9);
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_save_into_missing_dir_is_storage_error() {
        let temp = TempDir::new().unwrap();
        let checkpointer = Checkpointer::new(temp.path().join("gone").join("bestmodel"));
        let err = checkpointer.save(&record(1, 1.0)).unwrap_err();
        assert!(matches!(err, TrainingError::Storage { .. }));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_save_rejects_non_finite_smoothed_loss() {
        let temp = TempDir::new().unwrap();
        let checkpointer = Checkpointer::new(temp.path().join("bestmodel"));

        let err = checkpointer.save(&record(4, f64::INFINITY)).unwrap_err();
        assert!(matches!(err, TrainingError::Step(_)));
        assert!(err.to_string().contains("smoothed_loss"));
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_save_rejects_nan_weight_and_keeps_previous_slot() {
        let temp = TempDir::new().unwrap();
        let checkpointer = Checkpointer::new(temp.path().join("bestmodel"));
        checkpointer.save(&record(3, 1.0)).unwrap();

        let mut diverged = record(6, 0.9);
        diverged.model_state.insert("w", TensorData::vector(vec![f32::NAN, 1.0]));
        let err = checkpointer.save(&diverged).unwrap_err();
        assert!(matches!(err, TrainingError::Step(_)));
        assert!(err.to_string().contains("`w`"));

        assert_eq!(Checkpointer::load(checkpointer.path()).unwrap(), record(3, 1.0));
    }

    #[test]
    fn test_save_rejects_infinite_optimizer_buffer() {
        let temp = TempDir::new().unwrap();
        let checkpointer = Checkpointer::new(temp.path().join("bestmodel"));

        let mut diverged = record(2, 0.5);
        diverged.optimizer_state.buffers.insert("m.w", TensorData::vector(vec![f32::INFINITY]));
        let err = checkpointer.save(&diverged).unwrap_err();
        assert!(err.to_string().contains("m.w"));
        assert!(!checkpointer.path().exists());
    }

    #[test]
    fn test_load_corrupt_is_state_restore_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bestmodel");
        std::fs::write(&path, b"{\"iteration\": 3").unwrap();

        let err = Checkpointer::load(&path).unwrap_err();
        assert!(matches!(err, TrainingError::StateRestore(_)));
        assert!(err.to_string().contains("bestmodel"));
    }
}
