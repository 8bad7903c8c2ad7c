//! Adam (spec section 4.4): per-id first/second moment tensors with
//! standard bias-corrected updates.

use super::{elementwise, next_id, zeros_like, Optimizer};
use crate::errors::HappyMlResult;
use crate::tensor::TensorRef;
use std::collections::HashMap;

const BETA1: f32 = 0.9;
const BETA2: f32 = 0.999;
const EPSILON: f32 = 1e-8;

struct MomentState {
    m: TensorRef,
    v: TensorRef,
    t: u32,
}

pub struct AdamOptimizer {
    learning_rate: f32,
    bias_learning_rate: f32,
    next_id: usize,
    state: HashMap<usize, MomentState>,
}

impl AdamOptimizer {
    pub fn new(learning_rate: f32) -> Self {
        AdamOptimizer {
            learning_rate,
            bias_learning_rate: learning_rate,
            next_id: 0,
            state: HashMap::new(),
        }
    }

    fn step(&mut self, id: usize, current: &TensorRef, gradient: &TensorRef, lr: f32) -> HappyMlResult<TensorRef> {
        let entry = self.state.entry(id).or_insert_with(|| MomentState {
            m: zeros_like(gradient),
            v: zeros_like(gradient),
            t: 0,
        });
        entry.t += 1;
        let m = elementwise(&entry.m, gradient, |m, g| BETA1 * m + (1.0 - BETA1) * g)?;
        let v = elementwise(&entry.v, gradient, |v, g| BETA2 * v + (1.0 - BETA2) * g * g)?;
        let t = entry.t as f32;
        let bias1 = 1.0 - BETA1.powf(t);
        let bias2 = 1.0 - BETA2.powf(t);
        let update = elementwise(&m, &v, |mv, vv| {
            let m_hat = mv / bias1;
            let v_hat = vv / bias2;
            lr * m_hat / (v_hat.sqrt() + EPSILON)
        })?;
        entry.m = m;
        entry.v = v;
        elementwise(current, &update, |c, u| c - u)
    }
}

impl Optimizer for AdamOptimizer {
    fn register_weights(&mut self) -> usize {
        next_id(&mut self.next_id)
    }

    fn register_bias(&mut self) -> usize {
        next_id(&mut self.next_id)
    }

    fn update_weights(&mut self, id: usize, current: &TensorRef, gradient: &TensorRef) -> HappyMlResult<TensorRef> {
        self.step(id, current, gradient, self.learning_rate)
    }

    fn update_bias(&mut self, id: usize, current: &TensorRef, gradient: &TensorRef) -> HappyMlResult<TensorRef> {
        self.step(id, current, gradient, self.bias_learning_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::leaves::F32Tensor;
    use std::rc::Rc;

    #[test]
    fn first_step_moves_toward_negative_gradient() {
        let mut opt = AdamOptimizer::new(0.01);
        let id = opt.register_weights();
        let current: TensorRef = Rc::new(F32Tensor::from_channel_major(1, 1, 1, vec![1.0]).unwrap());
        let gradient: TensorRef = Rc::new(F32Tensor::from_channel_major(1, 1, 1, vec![1.0]).unwrap());
        let updated = opt.update_weights(id, &current, &gradient).unwrap();
        assert!(updated.value(0, 0, 0) < 1.0);
    }
}
