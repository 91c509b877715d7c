//! Batch sources over a dataset split.

use crate::batch::{BatchSource, Sample, SampleBatch};
use crate::dataset::{Annotations, DatasetSplit};
use crate::error::TrainingResult;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

fn materialize(split: &DatasetSplit, annotations: &Annotations) -> Vec<Sample> {
    split.ids().map(|id| annotations.sample(id)).collect()
}

/// Training source: every pass visits the split in a fresh random order and
/// yields full batches only. A split smaller than the batch size yields one
/// batch holding the whole split per pass.
#[derive(Debug)]
pub struct RandomBatcher {
    samples: Vec<Sample>,
    order: Vec<usize>,
    cursor: usize,
    batch_size: usize,
    rng: StdRng,
}

impl RandomBatcher {
    #[must_use]
    pub fn new(
        split: &DatasetSplit,
        annotations: &Annotations,
        batch_size: usize,
        seed: u64,
    ) -> Self {
        Self::from_samples(materialize(split, annotations), batch_size, seed)
    }

    #[must_use]
    pub fn from_samples(samples: Vec<Sample>, batch_size: usize, seed: u64) -> Self {
        let order = (0..samples.len()).collect();
        let mut batcher = Self {
            samples,
            order,
            cursor: 0,
            batch_size: batch_size.max(1),
            rng: StdRng::seed_from_u64(seed),
        };
        batcher.order.shuffle(&mut batcher.rng);
        batcher
    }

    fn effective_batch_size(&self) -> usize {
        self.batch_size.min(self.samples.len())
    }
}

impl BatchSource for RandomBatcher {
    type Batch = SampleBatch;

    fn next_batch(&mut self) -> TrainingResult<Option<SampleBatch>> {
        let size = self.effective_batch_size();
        if size == 0 || self.cursor + size > self.order.len() {
            return Ok(None);
        }

        let samples = self.order[self.cursor..self.cursor + size]
            .iter()
            .map(|&i| self.samples[i].clone())
            .collect();
        self.cursor += size;
        Ok(Some(SampleBatch { samples }))
    }

    fn restart(&mut self) {
        self.order.shuffle(&mut self.rng);
        self.cursor = 0;
    }
}

/// Evaluation source: one ordered pass, including the trailing partial batch.
#[derive(Debug)]
pub struct SequenceBatcher {
    samples: Vec<Sample>,
    cursor: usize,
    batch_size: usize,
}

impl SequenceBatcher {
    #[must_use]
    pub fn new(split: &DatasetSplit, annotations: &Annotations, batch_size: usize) -> Self {
        Self::from_samples(materialize(split, annotations), batch_size)
    }

    #[must_use]
    pub fn from_samples(samples: Vec<Sample>, batch_size: usize) -> Self {
        Self { samples, cursor: 0, batch_size: batch_size.max(1) }
    }
}

impl BatchSource for SequenceBatcher {
    type Batch = SampleBatch;

    fn next_batch(&mut self) -> TrainingResult<Option<SampleBatch>> {
        if self.cursor >= self.samples.len() {
            return Ok(None);
        }
        let end = (self.cursor + self.batch_size).min(self.samples.len());
        let samples = self.samples[self.cursor..end].to_vec();
        self.cursor = end;
        Ok(Some(SampleBatch { samples }))
    }

    fn restart(&mut self) {
        self.cursor = 0;
    }
}
