//! Deterministically seeded per step: a uniform random mask compared
//! against `dropout_rate`, multiplied into the input during training; at
//! inference the input is scaled by `1/(1 - dropout_rate)` instead (spec
//! section 4.2).

use super::{Layer, TrainingQueue};
use crate::errors::HappyMlResult;
use crate::tensor::leaves::{RandomTensor, UniformTensor};
use crate::tensor::views::{MaskedSelectView, MulScalarView, MulView};
use crate::tensor::TensorRef;
use std::rc::Rc;

pub struct Dropout {
    rate: f32,
    seed: u64,
    step: u64,
    last_mask: Option<TensorRef>,
}

impl Dropout {
    pub fn new(rate: f32, seed: u64) -> Self {
        Dropout {
            rate,
            seed,
            step: 0,
            last_mask: None,
        }
    }
}

impl Layer for Dropout {
    fn forward(&mut self, inputs: &[TensorRef], for_training: bool) -> HappyMlResult<TensorRef> {
        let input = inputs[0].clone();
        if !for_training {
            return Ok(MulScalarView::new(input, 1.0 / (1.0 - self.rate).max(1e-6)));
        }
        let (rows, cols, channels) = input.shape();
        let noise: TensorRef = Rc::new(RandomTensor::new(
            rows,
            cols,
            channels,
            0.0,
            1.0,
            self.seed.wrapping_add(self.step),
        ));
        self.step += 1;
        let ones: TensorRef = Rc::new(UniformTensor::new(rows, cols, channels, 1.0));
        let zeros: TensorRef = Rc::new(UniformTensor::new(rows, cols, channels, 0.0));
        // Kept iff the draw lands at or above the drop rate.
        let mask = MaskedSelectView::new(noise, ones, zeros, self.rate)?;
        self.last_mask = Some(mask.clone());
        MulView::new(input, mask)
    }

    fn backward(&mut self, _queue: &TrainingQueue, output_error: &TensorRef) -> HappyMlResult<Vec<TensorRef>> {
        let mask = self.last_mask.clone().unwrap_or_else(|| {
            Rc::new(UniformTensor::new(
                output_error.rows(),
                output_error.cols(),
                output_error.channels(),
                1.0,
            ))
        });
        Ok(vec![MulView::new(output_error.clone(), mask)?])
    }

    fn name(&self) -> &'static str {
        "dropout"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::leaves::F32Tensor;
    use crate::tensor::Tensor;

    #[test]
    fn inference_scales_instead_of_masking() {
        let mut layer = Dropout::new(0.5, 7);
        let input: TensorRef = Rc::new(F32Tensor::from_channel_major(1, 2, 1, vec![1.0, 1.0]).unwrap());
        let out = layer.forward(&[input], false).unwrap();
        assert!((out.value(0, 0, 0) - 2.0).abs() < 1e-5);
    }
}
