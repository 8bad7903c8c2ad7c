//! `forward` returns `input . W`; `backward` forms the weight gradient from
//! the batch-averaged input, and `update` asks the optimizer for a new `W`
//! and re-materializes it at the layer's bit width (spec section 4.2).

use super::{Layer, TrainingQueue};
use crate::errors::HappyMlResult;
use crate::optim::Optimizer;
use crate::tensor::views::{MatMulView, MulScalarView, TransposeView};
use crate::tensor::{materialize, TensorRef};
use crate::types::BitWidth;

pub struct FullyConnected {
    weights: TensorRef,
    bits: BitWidth,
    weight_id: usize,
    pending_gradient: Option<TensorRef>,
}

impl FullyConnected {
    pub fn new(weights: TensorRef, bits: BitWidth, optimizer: &mut dyn Optimizer) -> Self {
        let weight_id = optimizer.register_weights();
        FullyConnected {
            weights,
            bits,
            weight_id,
            pending_gradient: None,
        }
    }

    pub fn weights(&self) -> &TensorRef {
        &self.weights
    }
}

impl Layer for FullyConnected {
    fn forward(&mut self, inputs: &[TensorRef], _for_training: bool) -> HappyMlResult<TensorRef> {
        MatMulView::new(inputs[0].clone(), self.weights.clone())
    }

    fn backward(&mut self, queue: &TrainingQueue, output_error: &TensorRef) -> HappyMlResult<Vec<TensorRef>> {
        let averaged_input = queue.averaged_input(0)?;

        let weights_t = TransposeView::new(self.weights.clone());
        let input_error = MatMulView::new(output_error.clone(), weights_t)?;

        let input_t = TransposeView::new(averaged_input);
        let raw_gradient = MatMulView::new(input_t, output_error.clone())?;
        let scale = self.bits.weight_update_scale();
        self.pending_gradient = Some(MulScalarView::new(raw_gradient, scale));

        Ok(vec![input_error])
    }

    fn update(&mut self, optimizer: &mut dyn Optimizer) -> HappyMlResult<()> {
        if let Some(gradient) = self.pending_gradient.take() {
            let updated = optimizer.update_weights(self.weight_id, &self.weights, &gradient)?;
            self.weights = materialize(&updated, self.bits)?;
        }
        Ok(())
    }

    fn save(&self, dir: &std::path::Path, vertex_id: usize) -> HappyMlResult<()> {
        crate::graph::persistence::save_parameter(dir, vertex_id, "weights", &self.weights)
    }

    fn load(&mut self, dir: &std::path::Path, vertex_id: usize) -> HappyMlResult<()> {
        self.weights = crate::graph::persistence::load_parameter(dir, vertex_id, "weights")?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "fully_connected"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optim::micro_batch::MicroBatchOptimizer;
    use crate::tensor::leaves::F32Tensor;
    use std::rc::Rc;

    #[test]
    fn forward_applies_matrix_multiply() {
        let mut opt = MicroBatchOptimizer::new(0.1);
        let weights: TensorRef = Rc::new(F32Tensor::from_channel_major(2, 1, 1, vec![1.0, 1.0]).unwrap());
        let mut layer = FullyConnected::new(weights, BitWidth::Bits32, &mut opt);
        let input: TensorRef = Rc::new(F32Tensor::from_channel_major(1, 2, 1, vec![3.0, 4.0]).unwrap());
        let out = layer.forward(&[input], false).unwrap();
        assert_eq!(out.value(0, 0, 0), 7.0);
    }
}
