//! SGD with momentum and optional DEMON (decaying momentum) learning-rate
//! adaptation (spec section 4.4).

use super::{elementwise, next_id, zeros_like, Optimizer};
use crate::errors::HappyMlResult;
use crate::tensor::TensorRef;
use std::collections::HashMap;

const BETA1: f32 = 0.9;
const BETA2: f32 = 0.999;
const EPSILON: f32 = 1e-8;
const DEMON_MIN_LR: f32 = 1e-5;
const DEMON_MAX_LR: f32 = 1e-1;

pub struct SgdMomentumOptimizer {
    learning_rate: f32,
    beta: f32,
    demon: bool,
    next_id: usize,
    momentum: HashMap<usize, TensorRef>,
    step: u32,
}

impl SgdMomentumOptimizer {
    pub fn new(learning_rate: f32, beta: f32) -> Self {
        SgdMomentumOptimizer {
            learning_rate,
            beta,
            demon: false,
            next_id: 0,
            momentum: HashMap::new(),
            step: 0,
        }
    }

    pub fn with_demon_decay(mut self, enabled: bool) -> Self {
        self.demon = enabled;
        self
    }

    fn effective_lr(&self, momentum: &TensorRef) -> f32 {
        if !self.demon {
            return self.learning_rate;
        }
        let (rows, cols, channels) = momentum.shape();
        let n = (rows * cols * channels).max(1) as f32;
        let mean: f32 = {
            let mut sum = 0.0;
            for ch in 0..channels {
                for r in 0..rows {
                    for c in 0..cols {
                        sum += momentum.value(r, c, ch);
                    }
                }
            }
            sum / n
        };
        let t = (self.step + 1) as f32;
        let m_hat = mean / (1.0 - BETA1.powf(t));
        let v_hat = (mean * mean) / (1.0 - BETA2.powf(t));
        let scale = m_hat / (v_hat.sqrt() + EPSILON);
        (self.learning_rate * scale.abs()).clamp(DEMON_MIN_LR, DEMON_MAX_LR)
    }

    fn step_update(&mut self, id: usize, current: &TensorRef, gradient: &TensorRef, lr_fallback: f32) -> HappyMlResult<TensorRef> {
        let prev = self.momentum.get(&id).cloned().unwrap_or_else(|| zeros_like(gradient));
        let updated_momentum = elementwise(&prev, gradient, |m, g| self.beta * m + lr_fallback * g)?;
        let lr = self.effective_lr(&updated_momentum);
        let rescaled = if self.demon {
            elementwise(&prev, gradient, |m, g| self.beta * m + lr * g)?
        } else {
            updated_momentum
        };
        let result = elementwise(current, &rescaled, |c, m| c - m);
        self.momentum.insert(id, rescaled);
        self.step += 1;
        result
    }
}

impl Optimizer for SgdMomentumOptimizer {
    fn register_weights(&mut self) -> usize {
        next_id(&mut self.next_id)
    }

    fn register_bias(&mut self) -> usize {
        next_id(&mut self.next_id)
    }

    fn update_weights(&mut self, id: usize, current: &TensorRef, gradient: &TensorRef) -> HappyMlResult<TensorRef> {
        self.step_update(id, current, gradient, self.learning_rate)
    }

    fn update_bias(&mut self, id: usize, current: &TensorRef, gradient: &TensorRef) -> HappyMlResult<TensorRef> {
        self.step_update(id, current, gradient, self.learning_rate / 10.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::leaves::F32Tensor;
    use std::rc::Rc;

    #[test]
    fn momentum_accumulates_across_steps() {
        let mut opt = SgdMomentumOptimizer::new(0.1, 0.9);
        let id = opt.register_weights();
        let current: TensorRef = Rc::new(F32Tensor::from_channel_major(1, 1, 1, vec![0.0]).unwrap());
        let gradient: TensorRef = Rc::new(F32Tensor::from_channel_major(1, 1, 1, vec![1.0]).unwrap());
        let first = opt.update_weights(id, &current, &gradient).unwrap();
        let second = opt.update_weights(id, &first, &gradient).unwrap();
        assert!(second.value(0, 0, 0) < first.value(0, 0, 0));
    }
}
