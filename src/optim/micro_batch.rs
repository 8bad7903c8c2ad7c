//! Plain SGD: `new = current - lr * gradient`.

use super::{elementwise, next_id, Optimizer};
use crate::errors::HappyMlResult;
use crate::tensor::TensorRef;

pub struct MicroBatchOptimizer {
    learning_rate: f32,
    bias_learning_rate: f32,
    next_id: usize,
}

impl MicroBatchOptimizer {
    pub fn new(learning_rate: f32) -> Self {
        MicroBatchOptimizer {
            learning_rate,
            bias_learning_rate: learning_rate / 10.0,
            next_id: 0,
        }
    }

    pub fn with_bias_learning_rate(mut self, bias_learning_rate: f32) -> Self {
        self.bias_learning_rate = bias_learning_rate;
        self
    }
}

impl Optimizer for MicroBatchOptimizer {
    fn register_weights(&mut self) -> usize {
        next_id(&mut self.next_id)
    }

    fn register_bias(&mut self) -> usize {
        next_id(&mut self.next_id)
    }

    fn update_weights(&mut self, _id: usize, current: &TensorRef, gradient: &TensorRef) -> HappyMlResult<TensorRef> {
        elementwise(current, gradient, |c, g| c - self.learning_rate * g)
    }

    fn update_bias(&mut self, _id: usize, current: &TensorRef, gradient: &TensorRef) -> HappyMlResult<TensorRef> {
        elementwise(current, gradient, |c, g| c - self.bias_learning_rate * g)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::leaves::F32Tensor;
    use std::rc::Rc;

    #[test]
    fn update_moves_opposite_the_gradient() {
        let mut opt = MicroBatchOptimizer::new(0.1);
        let id = opt.register_weights();
        let current: TensorRef = Rc::new(F32Tensor::from_channel_major(1, 1, 1, vec![1.0]).unwrap());
        let gradient: TensorRef = Rc::new(F32Tensor::from_channel_major(1, 1, 1, vec![2.0]).unwrap());
        let updated = opt.update_weights(id, &current, &gradient).unwrap();
        assert!((updated.value(0, 0, 0) - 0.8).abs() < 1e-6);
    }
}
