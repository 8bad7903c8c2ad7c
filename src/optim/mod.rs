//! Optimizers (spec section 4.4). Each layer registers its weight and bias
//! slots once at construction and gets back a stable id used as the key
//! into the optimizer's own per-session state; that state is never
//! persisted.

pub mod adam;
pub mod micro_batch;
pub mod sgdm;

use crate::errors::HappyMlResult;
use crate::tensor::TensorRef;

pub trait Optimizer {
    fn register_weights(&mut self) -> usize;
    fn register_bias(&mut self) -> usize;
    fn update_weights(&mut self, id: usize, current: &TensorRef, gradient: &TensorRef) -> HappyMlResult<TensorRef>;
    fn update_bias(&mut self, id: usize, current: &TensorRef, gradient: &TensorRef) -> HappyMlResult<TensorRef>;
}

pub(crate) fn next_id(counter: &mut usize) -> usize {
    let id = *counter;
    *counter += 1;
    id
}

pub(crate) fn elementwise(
    a: &TensorRef,
    b: &TensorRef,
    f: impl Fn(f32, f32) -> f32,
) -> HappyMlResult<TensorRef> {
    use crate::tensor::leaves::F32Tensor;
    let (rows, cols, channels) = a.shape();
    let mut data = Vec::with_capacity(rows * cols * channels);
    for ch in 0..channels {
        for r in 0..rows {
            for c in 0..cols {
                data.push(f(a.value(r, c, ch), b.value(r, c, ch)));
            }
        }
    }
    Ok(std::rc::Rc::new(F32Tensor::from_channel_major(rows, cols, channels, data)?))
}

pub(crate) fn zeros_like(t: &TensorRef) -> TensorRef {
    use crate::tensor::leaves::F32Tensor;
    let (rows, cols, channels) = t.shape();
    std::rc::Rc::new(F32Tensor::zeros(rows, cols, channels))
}
