//! `forward` returns `input + b`; `backward` scales the error by a
//! bit-width-dependent factor, divides by batch size, and forwards the
//! original error unchanged (the partial derivative of `x + b` w.r.t. `x`
//! is 1) (spec section 4.2).

use super::{Layer, TrainingQueue};
use crate::errors::HappyMlResult;
use crate::optim::Optimizer;
use crate::tensor::views::{AddView, MulScalarView};
use crate::tensor::{materialize, TensorRef};
use crate::types::BitWidth;

pub struct Bias {
    b: TensorRef,
    bits: BitWidth,
    learning_rate: f32,
    bias_id: usize,
    pending_gradient: Option<TensorRef>,
}

impl Bias {
    pub fn new(b: TensorRef, bits: BitWidth, learning_rate: f32, optimizer: &mut dyn Optimizer) -> Self {
        let bias_id = optimizer.register_bias();
        Bias {
            b,
            bits,
            learning_rate,
            bias_id,
            pending_gradient: None,
        }
    }
}

impl Layer for Bias {
    fn forward(&mut self, inputs: &[TensorRef], _for_training: bool) -> HappyMlResult<TensorRef> {
        AddView::new(inputs[0].clone(), self.b.clone())
    }

    fn backward(&mut self, queue: &TrainingQueue, output_error: &TensorRef) -> HappyMlResult<Vec<TensorRef>> {
        let scale = self.bits.bias_update_scale(self.learning_rate) / queue.len().max(1) as f32;
        self.pending_gradient = Some(MulScalarView::new(output_error.clone(), scale));
        Ok(vec![output_error.clone()])
    }

    fn update(&mut self, optimizer: &mut dyn Optimizer) -> HappyMlResult<()> {
        if let Some(gradient) = self.pending_gradient.take() {
            let updated = optimizer.update_bias(self.bias_id, &self.b, &gradient)?;
            self.b = materialize(&updated, self.bits)?;
        }
        Ok(())
    }

    fn save(&self, dir: &std::path::Path, vertex_id: usize) -> HappyMlResult<()> {
        crate::graph::persistence::save_parameter(dir, vertex_id, "bias", &self.b)
    }

    fn load(&mut self, dir: &std::path::Path, vertex_id: usize) -> HappyMlResult<()> {
        self.b = crate::graph::persistence::load_parameter(dir, vertex_id, "bias")?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "bias"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optim::micro_batch::MicroBatchOptimizer;
    use crate::tensor::leaves::F32Tensor;
    use std::rc::Rc;

    #[test]
    fn forward_adds_bias_elementwise() {
        let mut opt = MicroBatchOptimizer::new(0.1);
        let b: TensorRef = Rc::new(F32Tensor::from_channel_major(1, 2, 1, vec![0.5, -0.5]).unwrap());
        let mut layer = Bias::new(b, BitWidth::Bits32, 0.1, &mut opt);
        let input: TensorRef = Rc::new(F32Tensor::from_channel_major(1, 2, 1, vec![1.0, 1.0]).unwrap());
        let out = layer.forward(&[input], false).unwrap();
        assert_eq!(out.value(0, 0, 0), 1.5);
        assert_eq!(out.value(0, 1, 0), 0.5);
    }
}
