use crate::adapter::{OptimizerAdapter, Parameter};
use crate::config::TrainConfig;
use crate::error::{TrainingError, TrainingResult};
use crate::state::{OptimizerState, StateDict, TensorData};
use std::collections::BTreeMap;

const EXP_AVG: &str = "exp_avg.";
const EXP_AVG_SQ: &str = "exp_avg_sq.";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdamParams {
    pub learning_rate: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
}

impl AdamParams {
    #[must_use]
    pub fn from_config(config: &TrainConfig) -> Self {
        Self {
            learning_rate: config.lr as f32,
            beta1: config.adam_beta1 as f32,
            beta2: config.adam_beta2 as f32,
            epsilon: config.adam_eps as f32,
        }
    }
}

/// Bias-corrected Adam. Moment buffers are allocated per parameter name on
/// the first step that sees it.
#[derive(Debug, Clone)]
pub struct Adam {
    params: AdamParams,
    step: u64,
    exp_avg: BTreeMap<String, Vec<f32>>,
    exp_avg_sq: BTreeMap<String, Vec<f32>>,
}

impl Adam {
    #[must_use]
    pub fn new(params: AdamParams) -> Self {
        Self { params, step: 0, exp_avg: BTreeMap::new(), exp_avg_sq: BTreeMap::new() }
    }

    #[must_use]
    pub fn step_count(&self) -> u64 {
        self.step
    }
}

impl OptimizerAdapter for Adam {
    fn step(&mut self, params: &mut [Parameter<'_>]) -> TrainingResult<()> {
        let AdamParams { learning_rate: lr, beta1: b1, beta2: b2, epsilon: eps } = self.params;

        self.step += 1;
        let t = i32::try_from(self.step).unwrap_or(i32::MAX);
        let bc1 = 1. - b1.powi(t);
        let bc2 = 1. - b2.powi(t);
        let step_size = lr * (bc2.sqrt() / bc1);

        for p in params.iter_mut() {
            if p.values.len() != p.grads.len() {
                return Err(TrainingError::Step(format!(
                    "parameter `{}` has {} values but {} gradients",
                    p.name,
                    p.values.len(),
                    p.grads.len()
                )));
            }
            let len = p.values.len();
            let m = self.exp_avg.entry(p.name.to_string()).or_insert_with(|| vec![0.; len]);
            let v = self.exp_avg_sq.entry(p.name.to_string()).or_insert_with(|| vec![0.; len]);
            if m.len() != len || v.len() != len {
                return Err(TrainingError::Step(format!(
                    "optimizer state for `{}` holds {} entries, parameter has {len}",
                    p.name,
                    m.len()
                )));
            }

            p.values
                .iter_mut()
                .zip(p.grads.iter())
                .zip(m.iter_mut())
                .zip(v.iter_mut())
                .for_each(|(((w, g), m), v)| {
                    *m = b1 * *m + (1. - b1) * g;
                    *v = b2 * *v + (1. - b2) * g.powi(2);
                    *w -= step_size * *m / (v.sqrt() + eps);
                });
        }
        Ok(())
    }

    fn state_snapshot(&self) -> OptimizerState {
        let mut buffers = StateDict::new();
        for (name, m) in &self.exp_avg {
            buffers.insert(format!("{EXP_AVG}{name}"), TensorData::vector(m.clone()));
        }
        for (name, v) in &self.exp_avg_sq {
            buffers.insert(format!("{EXP_AVG_SQ}{name}"), TensorData::vector(v.clone()));
        }
        OptimizerState { step: self.step, buffers }
    }

    fn restore_state(&mut self, state: &OptimizerState) -> TrainingResult<()> {
        let mut exp_avg = BTreeMap::new();
        let mut exp_avg_sq = BTreeMap::new();

        for (key, tensor) in state.buffers.iter() {
            if let Some(name) = key.strip_prefix(EXP_AVG_SQ) {
                exp_avg_sq.insert(name.to_string(), tensor.values.clone());
            } else if let Some(name) = key.strip_prefix(EXP_AVG) {
                exp_avg.insert(name.to_string(), tensor.values.clone());
            } else {
                return Err(TrainingError::StateRestore(format!(
                    "unknown optimizer buffer `{key}`"
                )));
            }
        }

        for (name, m) in &exp_avg {
            let v = exp_avg_sq.get(name).ok_or_else(|| {
                TrainingError::StateRestore(format!(
                    "optimizer buffer `{EXP_AVG_SQ}{name}` missing"
                ))
            })?;
            if v.len() != m.len() {
                return Err(TrainingError::StateRestore(format!(
                    "optimizer buffers for `{name}`: expected {} entries, found {}",
                    m.len(),
                    v.len()
                )));
            }
        }
        if let Some(name) = exp_avg_sq.keys().find(|k| !exp_avg.contains_key(*k)) {
            return Err(TrainingError::StateRestore(format!(
                "optimizer buffer `{EXP_AVG}{name}` missing"
            )));
        }

        self.step = state.step;
        self.exp_avg = exp_avg;
        self.exp_avg_sq = exp_avg_sq;
        Ok(())
    }

    fn validate_against(&self, params: &[Parameter<'_>]) -> TrainingResult<()> {
        // Pairing and equal lengths of the two moment maps hold after restore.
        for (name, m) in &self.exp_avg {
            let param = params.iter().find(|p| p.name == name.as_str()).ok_or_else(|| {
                TrainingError::StateRestore(format!(
                    "optimizer state for unknown parameter `{name}`"
                ))
            })?;
            if param.values.len() != m.len() {
                return Err(TrainingError::StateRestore(format!(
                    "optimizer state for `{name}`: expected {} entries, found {}",
                    param.values.len(),
                    m.len()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> AdamParams {
        AdamParams { learning_rate: 0.1, beta1: 0.9, beta2: 0.999, epsilon: 1e-8 }
    }

    #[test]
    fn test_first_step_moves_against_gradient_by_lr() {
        let mut adam = Adam::new(params());
        let mut values = [1.0_f32, -1.0];
        let mut grads = [0.5_f32, -2.0];
        let mut p = [Parameter { name: "w", values: &mut values, grads: &mut grads }];

        adam.step(&mut p).unwrap();

        // With bias correction the first update is lr * sign(g).
        assert!((values[0] - 0.9).abs() < 1e-4);
        assert!((values[1] + 0.9).abs() < 1e-4);
        assert_eq!(adam.step_count(), 1);
    }

    #[test]
    fn test_zero_gradients_clears_grads() {
        let mut adam = Adam::new(params());
        let mut values = [1.0_f32];
        let mut grads = [3.0_f32];
        let mut p = [Parameter { name: "w", values: &mut values, grads: &mut grads }];
        adam.zero_gradients(&mut p);
        assert_eq!(grads, [0.0]);
    }

    #[test]
    fn test_snapshot_restore_continues_identically() {
        let mut a = Adam::new(params());
        let mut values = [0.3_f32, 0.7];
        for g in [[0.1_f32, -0.2], [0.4, 0.05]] {
            let mut grads = g;
            a.step(&mut [Parameter { name: "w", values: &mut values, grads: &mut grads }]).unwrap();
        }

        let mut b = Adam::new(params());
        b.restore_state(&a.state_snapshot()).unwrap();
        assert_eq!(b.step_count(), 2);

        let mut va = values;
        let mut vb = values;
        let mut ga = [0.2_f32, 0.2];
        let mut gb = ga;
        a.step(&mut [Parameter { name: "w", values: &mut va, grads: &mut ga }]).unwrap();
        b.step(&mut [Parameter { name: "w", values: &mut vb, grads: &mut gb }]).unwrap();
        assert_eq!(va, vb);
    }

    #[test]
    fn test_restore_rejects_unpaired_buffers() {
        let mut buffers = StateDict::new();
        buffers.insert("exp_avg.w", TensorData::vector(vec![0.0; 2]));
        let state = OptimizerState { step: 1, buffers };
        let err = Adam::new(params()).restore_state(&state).unwrap_err();
        assert!(matches!(err, TrainingError::StateRestore(_)));
    }

    #[test]
    fn test_validate_against_rejects_foreign_buffers() {
        let mut adam = Adam::new(params());
        let mut values = [0.0_f32; 2];
        let mut grads = [1.0_f32; 2];
        adam.step(&mut [Parameter { name: "w", values: &mut values, grads: &mut grads }]).unwrap();

        let mut same = [0.0_f32; 2];
        let mut same_g = [0.0_f32; 2];
        let ok = [Parameter { name: "w", values: &mut same, grads: &mut same_g }];
        assert!(adam.validate_against(&ok).is_ok());

        let mut wide = [0.0_f32; 3];
        let mut wide_g = [0.0_f32; 3];
        let resized = [Parameter { name: "w", values: &mut wide, grads: &mut wide_g }];
        let err = adam.validate_against(&resized).unwrap_err();
        assert!(matches!(err, TrainingError::StateRestore(_)));
        assert!(err.to_string().contains("expected 3 entries, found 2"));

        let mut other = [0.0_f32; 2];
        let mut other_g = [0.0_f32; 2];
        let renamed = [Parameter { name: "v", values: &mut other, grads: &mut other_g }];
        let err = adam.validate_against(&renamed).unwrap_err();
        assert!(err.to_string().contains("unknown parameter `w`"));
    }

    #[test]
    fn test_step_rejects_resized_parameter() {
        let mut adam = Adam::new(params());
        let mut v2 = [0.0_f32; 2];
        let mut g2 = [1.0_f32; 2];
        adam.step(&mut [Parameter { name: "w", values: &mut v2, grads: &mut g2 }]).unwrap();

        let mut v3 = [0.0_f32; 3];
        let mut g3 = [1.0_f32; 3];
        let err = adam.step(&mut [Parameter { name: "w", values: &mut v3, grads: &mut g3 }]);
        assert!(matches!(err, Err(TrainingError::Step(_))));
    }
}
