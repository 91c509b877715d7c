//! Append-only scalar metrics keyed by `(tag, step)`.

use crate::error::{TrainingError, TrainingResult};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const TRAIN_LOSS_TAG: &str = "train/loss";
pub const DEV_LOSS_TAG: &str = "dev/loss";

pub trait MetricsSink {
    fn add_scalar(&mut self, tag: &str, value: f64, step: u64) -> TrainingResult<()>;

    /// Push buffered scalars to durable storage.
    fn flush(&mut self) -> TrainingResult<()>;
}

impl<S: MetricsSink + ?Sized> MetricsSink for Box<S> {
    fn add_scalar(&mut self, tag: &str, value: f64, step: u64) -> TrainingResult<()> {
        (**self).add_scalar(tag, value, step)
    }

    fn flush(&mut self) -> TrainingResult<()> {
        (**self).flush()
    }
}

/// One line of `events.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarEvent {
    pub tag: String,
    pub value: f64,
    pub step: u64,
    /// Unix time in seconds.
    pub wall_time: f64,
}

/// Buffered JSON-lines writer; nothing is guaranteed on disk before `flush`.
#[derive(Debug)]
pub struct JsonlMetricsSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonlMetricsSink {
    pub fn create(path: &Path) -> TrainingResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| TrainingError::storage(path, e))?;
        Ok(Self { path: path.to_path_buf(), writer: BufWriter::new(file) })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MetricsSink for JsonlMetricsSink {
    fn add_scalar(&mut self, tag: &str, value: f64, step: u64) -> TrainingResult<()> {
        let event = ScalarEvent {
            tag: tag.to_string(),
            value,
            step,
            wall_time: chrono::Utc::now().timestamp_micros() as f64 / 1e6,
        };
        serde_json::to_writer(&mut self.writer, &event)?;
        self.writer.write_all(b"\n").map_err(|e| TrainingError::storage(&self.path, e))
    }

    fn flush(&mut self) -> TrainingResult<()> {
        self.writer.flush().map_err(|e| TrainingError::storage(&self.path, e))
    }
}

pub fn read_events(path: &Path) -> TrainingResult<Vec<ScalarEvent>> {
    let contents = std::fs::read_to_string(path)?;
    contents
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(TrainingError::from))
        .collect()
}
