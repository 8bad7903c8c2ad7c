//! Pure value-transform during `forward`; `backward` averages queued
//! inputs, applies the derivative, and multiplies elementwise by the
//! incoming error (spec section 4.2).

use super::{Layer, TrainingQueue};
use crate::errors::HappyMlResult;
use crate::tensor::views::{MulView, ValueTransformView};
use crate::tensor::TensorRef;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationKind {
    ReLU,
    LeakyReLU,
    Sigmoid,
    SigmoidApprox,
    Tanh,
    TanhApprox,
    Linear,
    Softmax,
}

impl ActivationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivationKind::ReLU => "relu",
            ActivationKind::LeakyReLU => "leakyRelu",
            ActivationKind::Sigmoid => "sigmoid",
            ActivationKind::SigmoidApprox => "sigmoidApprox",
            ActivationKind::Tanh => "tanh",
            ActivationKind::TanhApprox => "tanhApprox",
            ActivationKind::Linear => "linear",
            ActivationKind::Softmax => "softmax",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "relu" => ActivationKind::ReLU,
            "leakyRelu" => ActivationKind::LeakyReLU,
            "sigmoid" => ActivationKind::Sigmoid,
            "sigmoidApprox" => ActivationKind::SigmoidApprox,
            "tanh" => ActivationKind::Tanh,
            "tanhApprox" => ActivationKind::TanhApprox,
            "linear" => ActivationKind::Linear,
            "softmax" => ActivationKind::Softmax,
            _ => return None,
        })
    }

    fn forward_fn(self) -> Rc<dyn Fn(f32) -> f32> {
        match self {
            ActivationKind::ReLU => Rc::new(|x: f32| x.max(0.0)),
            ActivationKind::LeakyReLU => Rc::new(|x: f32| if x > 0.0 { x } else { 0.01 * x }),
            ActivationKind::Sigmoid => Rc::new(|x: f32| 1.0 / (1.0 + (-x).exp())),
            ActivationKind::SigmoidApprox => Rc::new(|x: f32| 0.5 * (x / (1.0 + x.abs()) + 1.0)),
            ActivationKind::Tanh => Rc::new(|x: f32| x.tanh()),
            ActivationKind::TanhApprox => Rc::new(|x: f32| {
                let sigmoid_2x = 1.0 / (1.0 + (-2.0 * x).exp());
                2.0 * sigmoid_2x - 1.0
            }),
            ActivationKind::Linear => Rc::new(|x: f32| x),
            ActivationKind::Softmax => Rc::new(|x: f32| x), // softmax is row-wise; see forward()
        }
    }

    fn derivative_fn(self) -> Rc<dyn Fn(f32) -> f32> {
        match self {
            ActivationKind::ReLU => Rc::new(|x: f32| if x > 0.0 { 1.0 } else { 0.0 }),
            ActivationKind::LeakyReLU => Rc::new(|x: f32| if x > 0.0 { 1.0 } else { 0.01 }),
            ActivationKind::Sigmoid => Rc::new(|x: f32| {
                let s = 1.0 / (1.0 + (-x).exp());
                s * (1.0 - s)
            }),
            ActivationKind::SigmoidApprox => Rc::new(|x: f32| {
                let denom = 1.0 + x.abs();
                0.5 / (denom * denom)
            }),
            ActivationKind::Tanh => Rc::new(|x: f32| 1.0 - x.tanh().powi(2)),
            ActivationKind::TanhApprox => Rc::new(|x: f32| {
                let sigmoid_2x = 1.0 / (1.0 + (-2.0 * x).exp());
                4.0 * sigmoid_2x * (1.0 - sigmoid_2x)
            }),
            ActivationKind::Linear => Rc::new(|_x: f32| 1.0),
            ActivationKind::Softmax => Rc::new(|s: f32| s * (1.0 - s)),
        }
    }
}

/// Numerically stable row-wise softmax: subtract the row max before
/// exponentiating. A row of all `-inf` degenerates to a uniform row rather
/// than NaN (spec section 8).
fn softmax_row(input: &TensorRef, row: usize, channel: usize) -> Vec<f32> {
    let cols = input.cols();
    let values: Vec<f32> = (0..cols).map(|c| input.value(row, c, channel)).collect();
    let max = values.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return vec![1.0 / cols.max(1) as f32; cols];
    }
    let exps: Vec<f32> = values.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum == 0.0 {
        return vec![1.0 / cols.max(1) as f32; cols];
    }
    exps.into_iter().map(|e| e / sum).collect()
}

fn materialize_softmax(input: &TensorRef) -> HappyMlResult<TensorRef> {
    use crate::tensor::leaves::F32Tensor;
    let (rows, cols, channels) = input.shape();
    let mut data = vec![0.0f32; rows * cols * channels];
    for ch in 0..channels {
        for r in 0..rows {
            let row = softmax_row(input, r, ch);
            for (c, v) in row.into_iter().enumerate() {
                data[ch * rows * cols + r * cols + c] = v;
            }
        }
    }
    Ok(Rc::new(F32Tensor::from_channel_major(rows, cols, channels, data)?))
}

pub struct Activation {
    kind: ActivationKind,
    last_output: Option<TensorRef>,
}

impl Activation {
    pub fn new(kind: ActivationKind) -> Self {
        Activation {
            kind,
            last_output: None,
        }
    }
}

impl Layer for Activation {
    fn forward(&mut self, inputs: &[TensorRef], _for_training: bool) -> HappyMlResult<TensorRef> {
        let output = if self.kind == ActivationKind::Softmax {
            materialize_softmax(&inputs[0])?
        } else {
            ValueTransformView::new(inputs[0].clone(), self.kind.as_str(), self.kind.forward_fn())
        };
        self.last_output = Some(output.clone());
        Ok(output)
    }

    fn backward(&mut self, queue: &TrainingQueue, output_error: &TensorRef) -> HappyMlResult<Vec<TensorRef>> {
        let averaged_input = queue.averaged_input(0)?;
        let derivative_source = if self.kind == ActivationKind::Softmax {
            self.last_output.clone().unwrap_or(averaged_input)
        } else {
            averaged_input
        };
        let derivative = ValueTransformView::new(
            derivative_source,
            "derivative",
            self.kind.derivative_fn(),
        );
        let input_error = MulView::new(derivative, output_error.clone())?;
        Ok(vec![input_error])
    }

    fn name(&self) -> &'static str {
        self.kind.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::leaves::F32Tensor;

    #[test]
    fn relu_zeroes_negative_inputs() {
        let mut layer = Activation::new(ActivationKind::ReLU);
        let input: TensorRef = Rc::new(F32Tensor::from_channel_major(1, 2, 1, vec![-1.0, 2.0]).unwrap());
        let out = layer.forward(&[input], false).unwrap();
        assert_eq!(out.value(0, 0, 0), 0.0);
        assert_eq!(out.value(0, 1, 0), 2.0);
    }

    #[test]
    fn softmax_row_sums_to_one() {
        let mut layer = Activation::new(ActivationKind::Softmax);
        let input: TensorRef = Rc::new(F32Tensor::from_channel_major(1, 3, 1, vec![1.0, 2.0, 3.0]).unwrap());
        let out = layer.forward(&[input], false).unwrap();
        let sum: f32 = (0..3).map(|c| out.value(0, c, 0)).sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn softmax_of_all_negative_infinity_is_uniform() {
        let row = softmax_row(
            &(Rc::new(F32Tensor::from_channel_major(1, 2, 1, vec![f32::NEG_INFINITY, f32::NEG_INFINITY]).unwrap())
                as TensorRef),
            0,
            0,
        );
        assert!((row[0] - 0.5).abs() < 1e-6);
        assert!((row[1] - 0.5).abs() < 1e-6);
    }
}
