//! Loss functions (spec section 4.2 / 4.3): a scalar for reporting and exit,
//! plus the per-cell derivative the network graph scales and propagates.

use crate::errors::HappyMlResult;
use crate::tensor::leaves::F32Tensor;
use crate::tensor::TensorRef;
use std::rc::Rc;

pub trait Loss {
    fn compute(&self, predicted: &TensorRef, truth: &TensorRef) -> HappyMlResult<f32>;
    fn derivative(&self, predicted: &TensorRef, truth: &TensorRef) -> HappyMlResult<TensorRef>;
    fn name(&self) -> &'static str;
}

fn for_each_cell(predicted: &TensorRef, truth: &TensorRef, mut f: impl FnMut(f32, f32)) {
    let (rows, cols, channels) = predicted.shape();
    for ch in 0..channels {
        for r in 0..rows {
            for c in 0..cols {
                f(predicted.value(r, c, ch), truth.value(r, c, ch));
            }
        }
    }
}

fn build_derivative(predicted: &TensorRef, f: impl Fn(f32, f32) -> f32, truth: &TensorRef) -> HappyMlResult<TensorRef> {
    let (rows, cols, channels) = predicted.shape();
    let mut data = Vec::with_capacity(rows * cols * channels);
    for ch in 0..channels {
        for r in 0..rows {
            for c in 0..cols {
                data.push(f(predicted.value(r, c, ch), truth.value(r, c, ch)));
            }
        }
    }
    Ok(Rc::new(F32Tensor::from_channel_major(rows, cols, channels, data)?))
}

/// Mean squared error.
pub struct Mse;

impl Loss for Mse {
    fn compute(&self, predicted: &TensorRef, truth: &TensorRef) -> HappyMlResult<f32> {
        let mut sum: f32 = 0.0;
        let mut n: f32 = 0.0;
        for_each_cell(predicted, truth, |p, t| {
            sum += (p - t).powi(2);
            n += 1.0;
        });
        Ok(sum / n.max(1.0))
    }

    fn derivative(&self, predicted: &TensorRef, truth: &TensorRef) -> HappyMlResult<TensorRef> {
        build_derivative(predicted, |p, t| 2.0 * (p - t), truth)
    }

    fn name(&self) -> &'static str {
        "mse"
    }
}

/// Binary cross entropy; predictions are clamped away from 0/1 to keep the
/// logarithm finite.
pub struct BinaryCrossEntropy;

const BCE_EPSILON: f32 = 1e-7;

impl Loss for BinaryCrossEntropy {
    fn compute(&self, predicted: &TensorRef, truth: &TensorRef) -> HappyMlResult<f32> {
        let mut sum: f32 = 0.0;
        let mut n: f32 = 0.0;
        for_each_cell(predicted, truth, |p, t| {
            let p = p.clamp(BCE_EPSILON, 1.0 - BCE_EPSILON);
            sum += -(t * p.ln() + (1.0 - t) * (1.0 - p).ln());
            n += 1.0;
        });
        Ok(sum / n.max(1.0))
    }

    fn derivative(&self, predicted: &TensorRef, truth: &TensorRef) -> HappyMlResult<TensorRef> {
        build_derivative(
            predicted,
            |p, t| {
                let p = p.clamp(BCE_EPSILON, 1.0 - BCE_EPSILON);
                (p - t) / (p * (1.0 - p))
            },
            truth,
        )
    }

    fn name(&self) -> &'static str {
        "binaryCrossEntropy"
    }
}

/// Categorical cross entropy, intended to pair with a softmax output layer.
pub struct CategoricalCrossEntropy;

impl Loss for CategoricalCrossEntropy {
    fn compute(&self, predicted: &TensorRef, truth: &TensorRef) -> HappyMlResult<f32> {
        let mut sum = 0.0;
        for_each_cell(predicted, truth, |p, t| {
            let p = p.max(BCE_EPSILON);
            sum += -t * p.ln();
        });
        Ok(sum)
    }

    fn derivative(&self, predicted: &TensorRef, truth: &TensorRef) -> HappyMlResult<TensorRef> {
        build_derivative(predicted, |p, t| p - t, truth)
    }

    fn name(&self) -> &'static str {
        "categoricalCrossEntropy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::leaves::F32Tensor;

    #[test]
    fn mse_of_exact_match_is_zero() {
        let predicted: TensorRef = Rc::new(F32Tensor::from_channel_major(1, 2, 1, vec![0.5, 0.5]).unwrap());
        let truth: TensorRef = Rc::new(F32Tensor::from_channel_major(1, 2, 1, vec![0.5, 0.5]).unwrap());
        assert_eq!(Mse.compute(&predicted, &truth).unwrap(), 0.0);
    }

    #[test]
    fn binary_cross_entropy_penalizes_confident_wrong_answers() {
        let predicted: TensorRef = Rc::new(F32Tensor::from_channel_major(1, 1, 1, vec![0.99]).unwrap());
        let truth: TensorRef = Rc::new(F32Tensor::from_channel_major(1, 1, 1, vec![0.0]).unwrap());
        let loss = BinaryCrossEntropy.compute(&predicted, &truth).unwrap();
        assert!(loss > 3.0);
    }
}
