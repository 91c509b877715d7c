//! rbox training
//!
//! Single-worker training orchestration for the rotated-box ship detector:
//! - Driving model/optimizer adapters through update steps (`TrainingOrchestrator`)
//! - Smoothing the step loss and reporting progress
//! - Periodic full validation passes (`EvaluationRunner`)
//! - Persisting the best model to a single slot and resuming from it (`Checkpointer`)

pub mod adapter;
pub mod batch;
pub mod batcher;
pub mod checkpoint;
pub mod config;
pub mod dataset;
pub mod error;
pub mod evaluation;
pub mod layout;
pub mod metrics;
pub mod orchestrator;
pub mod progress;
pub mod reference;
pub mod state;

pub use adapter::{ModelAdapter, OptimizerAdapter, Parameter, TrainingContext};
pub use batch::{Batch, BatchSource, RotatedBox, Sample, SampleBatch};
pub use batcher::{RandomBatcher, SequenceBatcher};
pub use checkpoint::{CheckpointRecord, Checkpointer, SaveOutcome, SavedCheckpoint};
pub use config::{Device, IterationBudget, TrainConfig};
pub use dataset::{Annotations, DatasetIndex, DatasetSplit};
pub use error::{TrainingError, TrainingResult};
pub use evaluation::{EvaluationResult, EvaluationRunner};
pub use layout::RunLayout;
pub use metrics::{DEV_LOSS_TAG, JsonlMetricsSink, MetricsSink, TRAIN_LOSS_TAG};
pub use orchestrator::{LoopSettings, RunSummary, TrainingOrchestrator};
pub use progress::{ProgressEvent, ProgressSink, StdoutProgressSink};
pub use state::{OptimizerState, SmoothedLoss, StateDict, TensorData, TrainingState};
