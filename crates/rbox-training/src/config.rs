//! Training run configuration.
//!
//! Loaded once from a JSON file at startup and never mutated afterwards.

use crate::error::{TrainingError, TrainingResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Root under which `input/` is read and `log/` is written.
    pub root_dir: PathBuf,
    pub lr: f64,
    /// Iteration budget; `0` runs until the process is stopped.
    pub n_iters: u64,
    pub print_every: u64,
    pub eval_every: u64,
    pub use_cuda: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_beta1")]
    pub adam_beta1: f64,
    #[serde(default = "default_beta2")]
    pub adam_beta2: f64,
    #[serde(default = "default_eps")]
    pub adam_eps: f64,
}

fn default_batch_size() -> usize {
    8
}

fn default_seed() -> u64 {
    42
}

fn default_beta1() -> f64 {
    0.9
}

fn default_beta2() -> f64 {
    0.999
}

fn default_eps() -> f64 {
    1e-8
}

impl TrainConfig {
    /// Read and validate a config file.
    pub fn load(path: &Path) -> TrainingResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| TrainingError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let config: Self = serde_json::from_slice(&bytes).map_err(|e| TrainingError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> TrainingResult<()> {
        if !self.lr.is_finite() || self.lr <= 0.0 {
            return Err(TrainingError::InvalidConfig(format!("lr must be > 0, got {}", self.lr)));
        }
        if self.print_every == 0 {
            return Err(TrainingError::InvalidConfig("print_every must be >= 1".to_string()));
        }
        if self.eval_every == 0 {
            return Err(TrainingError::InvalidConfig("eval_every must be >= 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(TrainingError::InvalidConfig("batch_size must be >= 1".to_string()));
        }
        if !(0.0..1.0).contains(&self.adam_beta1) || !(0.0..1.0).contains(&self.adam_beta2) {
            return Err(TrainingError::InvalidConfig("adam betas must lie in [0, 1)".to_string()));
        }
        if !self.adam_eps.is_finite() || self.adam_eps <= 0.0 {
            return Err(TrainingError::InvalidConfig("adam_eps must be > 0".to_string()));
        }
        Ok(())
    }

    #[must_use]
    pub fn budget(&self) -> IterationBudget {
        IterationBudget::from_n_iters(self.n_iters)
    }

    #[must_use]
    pub fn device(&self) -> Device {
        Device::from_flag(self.use_cuda)
    }

    #[must_use]
    pub fn input_dir(&self) -> PathBuf {
        self.root_dir.join("input")
    }
}

/// How many update steps a run may perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationBudget {
    Bounded(u64),
    Unbounded,
}

impl IterationBudget {
    #[must_use]
    pub fn from_n_iters(n_iters: u64) -> Self {
        if n_iters == 0 { Self::Unbounded } else { Self::Bounded(n_iters) }
    }

    #[must_use]
    pub fn allows(self, iteration: u64) -> bool {
        match self {
            Self::Bounded(limit) => iteration < limit,
            Self::Unbounded => true,
        }
    }
}

/// Compute device, resolved once from `use_cuda`. Adapters receive it at
/// construction; the orchestrator never inspects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    Cpu,
    Cuda,
}

impl Device {
    #[must_use]
    pub fn from_flag(use_cuda: bool) -> Self {
        if use_cuda { Self::Cuda } else { Self::Cpu }
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cpu => f.write_str("cpu"),
            Self::Cuda => f.write_str("cuda"),
        }
    }
}
