//! Batches and the pull interface batch sources present to the orchestrator.

use crate::error::TrainingResult;
use serde::{Deserialize, Serialize};

pub trait Batch {
    /// Number of samples; the weight of this batch in evaluation averages.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A finite, restartable, synchronous sequence of batches for one split.
///
/// Any prefetching happens behind `next_batch`; callers only ever see a
/// blocking pull.
pub trait BatchSource {
    type Batch: Batch;

    /// Next batch of the current pass, or `None` once the pass is exhausted.
    fn next_batch(&mut self) -> TrainingResult<Option<Self::Batch>>;

    /// Begin a new pass over the split.
    fn restart(&mut self);
}

impl<S: BatchSource + ?Sized> BatchSource for Box<S> {
    type Batch = S::Batch;

    fn next_batch(&mut self) -> TrainingResult<Option<Self::Batch>> {
        (**self).next_batch()
    }

    fn restart(&mut self) {
        (**self).restart();
    }
}

/// Rotated bounding box in image coordinates; `angle` in radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RotatedBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub angle: f32,
}

impl RotatedBox {
    #[must_use]
    pub fn to_array(self) -> [f32; 5] {
        [self.x, self.y, self.width, self.height, self.angle]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub image_id: String,
    pub boxes: Vec<RotatedBox>,
}

impl Sample {
    #[must_use]
    pub fn has_target(&self) -> bool {
        !self.boxes.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleBatch {
    pub samples: Vec<Sample>,
}

impl Batch for SampleBatch {
    fn len(&self) -> usize {
        self.samples.len()
    }
}
