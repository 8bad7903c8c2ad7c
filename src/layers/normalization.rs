//! Layer normalization: subtract the row mean, divide by the row standard
//! deviation with an epsilon floor (spec section 4.2). Stable for
//! zero-variance rows since the floor keeps the divisor away from zero.

use super::{Layer, TrainingQueue};
use crate::errors::HappyMlResult;
use crate::tensor::leaves::F32Tensor;
use crate::tensor::{Tensor, TensorRef};
use std::rc::Rc;

const EPSILON: f32 = 1e-5;

fn row_stats(input: &TensorRef, row: usize, channel: usize) -> (f32, f32) {
    let cols = input.cols();
    let mean: f32 = (0..cols).map(|c| input.value(row, c, channel)).sum::<f32>() / cols.max(1) as f32;
    let variance: f32 =
        (0..cols).map(|c| (input.value(row, c, channel) - mean).powi(2)).sum::<f32>() / cols.max(1) as f32;
    (mean, variance)
}

pub struct Normalization {
    last_input: Option<TensorRef>,
}

impl Normalization {
    pub fn new() -> Self {
        Normalization { last_input: None }
    }
}

impl Default for Normalization {
    fn default() -> Self {
        Self::new()
    }
}

impl Layer for Normalization {
    fn forward(&mut self, inputs: &[TensorRef], _for_training: bool) -> HappyMlResult<TensorRef> {
        let input = inputs[0].clone();
        self.last_input = Some(input.clone());
        let (rows, cols, channels) = input.shape();
        let mut data = vec![0.0f32; rows * cols * channels];
        for ch in 0..channels {
            for r in 0..rows {
                let (mean, variance) = row_stats(&input, r, ch);
                let std_dev = (variance + EPSILON).sqrt();
                for c in 0..cols {
                    data[ch * rows * cols + r * cols + c] = (input.value(r, c, ch) - mean) / std_dev;
                }
            }
        }
        Ok(Rc::new(F32Tensor::from_channel_major(rows, cols, channels, data)?))
    }

    fn backward(&mut self, _queue: &TrainingQueue, output_error: &TensorRef) -> HappyMlResult<Vec<TensorRef>> {
        let input = self.last_input.clone().unwrap_or_else(|| output_error.clone());
        let (rows, cols, channels) = input.shape();
        let n = cols.max(1) as f32;
        let mut data = vec![0.0f32; rows * cols * channels];
        for ch in 0..channels {
            for r in 0..rows {
                let (mean, variance) = row_stats(&input, r, ch);
                let std_dev = (variance + EPSILON).sqrt();
                let centered: Vec<f32> = (0..cols).map(|c| input.value(r, c, ch) - mean).collect();
                let errors: Vec<f32> = (0..cols).map(|c| output_error.value(r, c, ch)).collect();
                let sum_err: f32 = errors.iter().sum();
                let sum_err_centered: f32 = errors.iter().zip(&centered).map(|(e, x)| e * x).sum();
                for c in 0..cols {
                    let term = errors[c] - sum_err / n - centered[c] * sum_err_centered / (n * std_dev * std_dev);
                    data[ch * rows * cols + r * cols + c] = term / std_dev;
                }
            }
        }
        Ok(vec![Rc::new(F32Tensor::from_channel_major(rows, cols, channels, data)?)])
    }

    fn name(&self) -> &'static str {
        "normalization"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_variance_row_does_not_divide_by_zero() {
        let mut layer = Normalization::new();
        let input: TensorRef = Rc::new(F32Tensor::from_channel_major(1, 3, 1, vec![2.0, 2.0, 2.0]).unwrap());
        let out = layer.forward(&[input], false).unwrap();
        for c in 0..3 {
            assert!(out.value(0, c, 0).is_finite());
        }
    }

    #[test]
    fn normalized_row_has_zero_mean() {
        let mut layer = Normalization::new();
        let input: TensorRef = Rc::new(F32Tensor::from_channel_major(1, 4, 1, vec![1.0, 2.0, 3.0, 4.0]).unwrap());
        let out = layer.forward(&[input], false).unwrap();
        let mean: f32 = (0..4).map(|c| out.value(0, c, 0)).sum::<f32>() / 4.0;
        assert!(mean.abs() < 1e-4);
    }
}
