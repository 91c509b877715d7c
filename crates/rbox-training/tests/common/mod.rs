#![allow(dead_code)]

use rbox_training::{
    Batch, BatchSource, MetricsSink, ModelAdapter, OptimizerAdapter, OptimizerState, Parameter,
    ProgressEvent, ProgressSink, StateDict, TensorData, TrainingError, TrainingResult,
};

/// A batch carrying the loss the fake model should report for it.
#[derive(Debug, Clone, PartialEq)]
pub struct FakeBatch {
    pub size: usize,
    pub loss: f64,
}

impl Batch for FakeBatch {
    fn len(&self) -> usize {
        self.size
    }
}

#[derive(Debug, Default)]
pub struct VecSource {
    batches: Vec<FakeBatch>,
    cursor: usize,
    pub restarts: usize,
}

impl VecSource {
    pub fn new(batches: Vec<FakeBatch>) -> Self {
        Self { batches, cursor: 0, restarts: 0 }
    }

    pub fn constant(loss: f64, size: usize, len: usize) -> Self {
        Self::new(vec![FakeBatch { size, loss }; len])
    }

    pub fn from_losses(losses: &[f64]) -> Self {
        Self::new(losses.iter().map(|&loss| FakeBatch { size: 1, loss }).collect())
    }
}

impl BatchSource for VecSource {
    type Batch = FakeBatch;

    fn next_batch(&mut self) -> TrainingResult<Option<FakeBatch>> {
        let batch = self.batches.get(self.cursor).cloned();
        if batch.is_some() {
            self.cursor += 1;
        }
        Ok(batch)
    }

    fn restart(&mut self) {
        self.cursor = 0;
        self.restarts += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeMode {
    Train,
    Eval,
}

/// Reports each batch's scripted loss; `backward` writes a unit gradient.
#[derive(Debug, Clone)]
pub struct FakeModel {
    pub weights: Vec<f32>,
    pub grads: Vec<f32>,
    pub mode: FakeMode,
    pub forwards: usize,
    pub backwards: usize,
    pub fail_on_forward: Option<usize>,
}

impl FakeModel {
    pub fn new(width: usize) -> Self {
        Self {
            weights: vec![0.0; width],
            grads: vec![0.0; width],
            mode: FakeMode::Train,
            forwards: 0,
            backwards: 0,
            fail_on_forward: None,
        }
    }
}

impl ModelAdapter for FakeModel {
    type Batch = FakeBatch;
    type Output = f64;

    fn forward(&mut self, batch: &FakeBatch) -> TrainingResult<f64> {
        self.forwards += 1;
        if self.fail_on_forward == Some(self.forwards) {
            return Err(TrainingError::Step(format!("forward #{} failed", self.forwards)));
        }
        Ok(batch.loss)
    }

    fn compute_loss(&mut self, predictions: &f64, _batch: &FakeBatch) -> TrainingResult<f64> {
        Ok(*predictions)
    }

    fn backward(&mut self) -> TrainingResult<()> {
        self.backwards += 1;
        self.grads.iter_mut().for_each(|g| *g += 1.0);
        Ok(())
    }

    fn train(&mut self) {
        self.mode = FakeMode::Train;
    }

    fn eval(&mut self) {
        self.mode = FakeMode::Eval;
    }

    fn parameters(&mut self) -> Vec<Parameter<'_>> {
        vec![Parameter { name: "w", values: &mut self.weights, grads: &mut self.grads }]
    }

    fn state_snapshot(&self) -> StateDict {
        let mut dict = StateDict::new();
        dict.insert("w", TensorData::vector(self.weights.clone()));
        dict
    }

    fn restore_state(&mut self, state: &StateDict) -> TrainingResult<()> {
        state.check_shapes(&[("w", &[self.weights.len()])])?;
        if let Some(t) = state.get("w") {
            self.weights.clone_from(&t.values);
        }
        Ok(())
    }
}

/// Plain SGD with a step counter as its only state.
#[derive(Debug, Clone, Default)]
pub struct FakeOptimizer {
    pub steps: u64,
    pub zeroed: usize,
}

impl OptimizerAdapter for FakeOptimizer {
    fn zero_gradients(&mut self, params: &mut [Parameter<'_>]) {
        self.zeroed += 1;
        for p in params.iter_mut() {
            p.grads.fill(0.0);
        }
    }

    fn step(&mut self, params: &mut [Parameter<'_>]) -> TrainingResult<()> {
        self.steps += 1;
        for p in params.iter_mut() {
            for (w, g) in p.values.iter_mut().zip(p.grads.iter()) {
                *w -= 0.1 * g;
            }
        }
        Ok(())
    }

    fn state_snapshot(&self) -> OptimizerState {
        OptimizerState { step: self.steps, buffers: StateDict::new() }
    }

    fn restore_state(&mut self, state: &OptimizerState) -> TrainingResult<()> {
        self.steps = state.step;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingMetrics {
    pub scalars: Vec<(String, f64, u64)>,
    /// Number of scalars recorded at each flush.
    pub flushes: Vec<usize>,
}

impl RecordingMetrics {
    pub fn tagged(&self, tag: &str) -> Vec<(f64, u64)> {
        self.scalars.iter().filter(|(t, _, _)| t == tag).map(|(_, v, s)| (*v, *s)).collect()
    }
}

impl MetricsSink for RecordingMetrics {
    fn add_scalar(&mut self, tag: &str, value: f64, step: u64) -> TrainingResult<()> {
        self.scalars.push((tag.to_string(), value, step));
        Ok(())
    }

    fn flush(&mut self) -> TrainingResult<()> {
        self.flushes.push(self.scalars.len());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingProgress {
    pub events: Vec<ProgressEvent>,
}

impl RecordingProgress {
    pub fn reports(&self) -> Vec<u64> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Report { iteration, .. } => Some(*iteration),
                _ => None,
            })
            .collect()
    }
}

impl ProgressSink for RecordingProgress {
    fn on_event(&mut self, event: ProgressEvent) {
        self.events.push(event);
    }
}
