//! Records the operand shape; `forward` reshapes to a single row, `backward`
//! restores the incoming error to that shape (spec section 4.2).

use super::{Layer, TrainingQueue};
use crate::errors::HappyMlResult;
use crate::tensor::views::FlattenToRowView;
use crate::tensor::{Tensor, TensorRef};
use crate::types::Shape3;
use std::rc::Rc;

/// Inverse of `FlattenToRowView`: reads a single-row tensor back out at the
/// recorded `(rows, cols, channels)` shape.
#[derive(Debug, Clone)]
struct UnflattenView {
    operand: TensorRef,
    shape: Shape3,
}

impl Tensor for UnflattenView {
    fn rows(&self) -> usize {
        self.shape.0
    }
    fn cols(&self) -> usize {
        self.shape.1
    }
    fn channels(&self) -> usize {
        self.shape.2
    }
    fn value(&self, row: usize, col: usize, channel: usize) -> f32 {
        let (rows, cols, _channels) = self.shape;
        let flat = channel * rows * cols + row * cols + col;
        self.operand.value(0, flat, 0)
    }
    fn contains(&self, other: &TensorRef) -> bool {
        Rc::ptr_eq(&self.operand, other) || self.operand.contains(other)
    }
    fn plan(&self, indent: usize) -> String {
        format!(
            "{}unflatten({:?})\n{}",
            "  ".repeat(indent),
            self.shape,
            self.operand.plan(indent + 1)
        )
    }
}

pub struct Flatten {
    recorded_shape: Option<Shape3>,
}

impl Flatten {
    pub fn new() -> Self {
        Flatten { recorded_shape: None }
    }
}

impl Default for Flatten {
    fn default() -> Self {
        Self::new()
    }
}

impl Layer for Flatten {
    fn forward(&mut self, inputs: &[TensorRef], _for_training: bool) -> HappyMlResult<TensorRef> {
        self.recorded_shape = Some(inputs[0].shape());
        Ok(FlattenToRowView::new(inputs[0].clone()))
    }

    fn backward(&mut self, _queue: &TrainingQueue, output_error: &TensorRef) -> HappyMlResult<Vec<TensorRef>> {
        let shape = self.recorded_shape.unwrap_or((1, output_error.cols(), 1));
        let restored: TensorRef = Rc::new(UnflattenView {
            operand: output_error.clone(),
            shape,
        });
        Ok(vec![restored])
    }

    fn name(&self) -> &'static str {
        "flatten"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::leaves::F32Tensor;

    #[test]
    fn flatten_then_restore_round_trips() {
        let mut layer = Flatten::new();
        let input: TensorRef = Rc::new(F32Tensor::from_channel_major(2, 2, 1, vec![1.0, 2.0, 3.0, 4.0]).unwrap());
        let flat = layer.forward(&[input.clone()], false).unwrap();
        assert_eq!(flat.shape(), (1, 4, 1));
        let queue = TrainingQueue::new();
        let restored = layer.backward(&queue, &flat).unwrap().remove(0);
        assert_eq!(restored.shape(), input.shape());
        for r in 0..2 {
            for c in 0..2 {
                assert_eq!(restored.value(r, c, 0), input.value(r, c, 0));
            }
        }
    }
}
