use crate::adapter::{ModelAdapter, Parameter};
use crate::batch::SampleBatch;
use crate::config::Device;
use crate::error::{TrainingError, TrainingResult};
use crate::state::{StateDict, TensorData};

pub const OBJECTNESS: &str = "objectness.logit";
pub const BOX_PRIOR: &str = "box.prior";

/// Side length of the source images; box coordinates are regressed in units
/// of it.
pub const IMAGE_SIZE: f32 = 768.0;

const PROB_EPS: f32 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Eval,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoxPriorOutput {
    pub objectness: f32,
    /// `(x, y, width, height, angle)`, coordinates normalized by `IMAGE_SIZE`.
    pub prior: [f32; 5],
}

#[derive(Debug, Clone, Copy)]
struct PendingGrads {
    logit: f32,
    prior: [f32; 5],
}

/// CPU baseline detector: a single objectness logit and a single rotated-box
/// prior shared by every image. It learns the split's target rate and mean
/// box, which is enough to drive the training loop end to end.
#[derive(Debug, Clone)]
pub struct BoxPriorModel {
    logit: [f32; 1],
    prior: [f32; 5],
    logit_grad: [f32; 1],
    prior_grad: [f32; 5],
    mode: Mode,
    pending: Option<PendingGrads>,
    device: Device,
}

impl BoxPriorModel {
    pub fn new(device: Device) -> Self {
        let device = match device {
            Device::Cpu => Device::Cpu,
            Device::Cuda => {
                tracing::warn!("cuda requested but the box-prior model only runs on cpu");
                Device::Cpu
            }
        };
        Self {
            logit: [0.0],
            prior: [0.5, 0.5, 0.05, 0.05, 0.0],
            logit_grad: [0.0],
            prior_grad: [0.0; 5],
            mode: Mode::Train,
            pending: None,
            device,
        }
    }

    #[must_use]
    pub fn device(&self) -> Device {
        self.device
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    fn normalized(target: [f32; 5]) -> [f32; 5] {
        [
            target[0] / IMAGE_SIZE,
            target[1] / IMAGE_SIZE,
            target[2] / IMAGE_SIZE,
            target[3] / IMAGE_SIZE,
            target[4],
        ]
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

impl ModelAdapter for BoxPriorModel {
    type Batch = SampleBatch;
    type Output = BoxPriorOutput;

    fn forward(&mut self, _batch: &SampleBatch) -> TrainingResult<BoxPriorOutput> {
        Ok(BoxPriorOutput { objectness: sigmoid(self.logit[0]), prior: self.prior })
    }

    /// Binary cross-entropy on "image has a target" plus the mean squared
    /// error of the prior against the first box of each target image.
    fn compute_loss(
        &mut self,
        predictions: &BoxPriorOutput,
        batch: &SampleBatch,
    ) -> TrainingResult<f64> {
        if batch.samples.is_empty() {
            return Err(TrainingError::Step("cannot compute loss of an empty batch".to_string()));
        }
        let n = batch.samples.len() as f32;
        let p = predictions.objectness.clamp(PROB_EPS, 1.0 - PROB_EPS);

        let mut bce = 0.0_f32;
        let mut logit_grad = 0.0_f32;
        let mut sq_err = 0.0_f32;
        let mut prior_grad = [0.0_f32; 5];
        let mut targets = 0usize;

        for sample in &batch.samples {
            let y = if sample.has_target() { 1.0 } else { 0.0 };
            bce -= y * p.ln() + (1.0 - y) * (1.0 - p).ln();
            logit_grad += (p - y) / n;

            if let Some(first) = sample.boxes.first() {
                targets += 1;
                let target = Self::normalized(first.to_array());
                for k in 0..5 {
                    let diff = predictions.prior[k] - target[k];
                    sq_err += diff * diff;
                    prior_grad[k] += 2.0 * diff;
                }
            }
        }

        let mut loss = bce / n;
        if targets > 0 {
            let denom = (targets * 5) as f32;
            loss += sq_err / denom;
            for g in &mut prior_grad {
                *g /= denom;
            }
        }

        self.pending = match self.mode {
            Mode::Train => Some(PendingGrads { logit: logit_grad, prior: prior_grad }),
            Mode::Eval => None,
        };
        Ok(f64::from(loss))
    }

    fn backward(&mut self) -> TrainingResult<()> {
        if self.mode == Mode::Eval {
            return Err(TrainingError::Step("backward called in eval mode".to_string()));
        }
        let pending = self
            .pending
            .take()
            .ok_or_else(|| TrainingError::Step("backward called before compute_loss".to_string()))?;

        self.logit_grad[0] += pending.logit;
        for (g, d) in self.prior_grad.iter_mut().zip(pending.prior) {
            *g += d;
        }
        Ok(())
    }

    fn train(&mut self) {
        self.mode = Mode::Train;
    }

    fn eval(&mut self) {
        self.mode = Mode::Eval;
        self.pending = None;
    }

    fn parameters(&mut self) -> Vec<Parameter<'_>> {
        vec![
            Parameter { name: OBJECTNESS, values: &mut self.logit, grads: &mut self.logit_grad },
            Parameter { name: BOX_PRIOR, values: &mut self.prior, grads: &mut self.prior_grad },
        ]
    }

    fn state_snapshot(&self) -> StateDict {
        let mut dict = StateDict::new();
        dict.insert(OBJECTNESS, TensorData::vector(self.logit.to_vec()));
        dict.insert(BOX_PRIOR, TensorData::vector(self.prior.to_vec()));
        dict
    }

    fn restore_state(&mut self, state: &StateDict) -> TrainingResult<()> {
        state.check_shapes(&[(OBJECTNESS, &[1]), (BOX_PRIOR, &[5])])?;
        if let Some(t) = state.get(OBJECTNESS) {
            self.logit.copy_from_slice(&t.values);
        }
        if let Some(t) = state.get(BOX_PRIOR) {
            self.prior.copy_from_slice(&t.values);
        }
        self.pending = None;
        Ok(())
    }
}
