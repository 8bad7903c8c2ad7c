//! Requires identical row/channel counts across inputs; `forward` is a
//! column-wise concatenation, `backward` splits the incoming error into
//! column-range windows, one per input, preserving insertion order (spec
//! section 4.2).

use super::{Layer, TrainingQueue};
use crate::errors::HappyMlResult;
use crate::tensor::views::{ConcatWideView, WindowView};
use crate::tensor::TensorRef;

pub struct ConcatWide {
    windows: Vec<(usize, usize)>,
}

impl ConcatWide {
    pub fn new() -> Self {
        ConcatWide { windows: Vec::new() }
    }
}

impl Default for ConcatWide {
    fn default() -> Self {
        Self::new()
    }
}

impl Layer for ConcatWide {
    fn forward(&mut self, inputs: &[TensorRef], _for_training: bool) -> HappyMlResult<TensorRef> {
        let mut offset = 0;
        self.windows = inputs
            .iter()
            .map(|t| {
                let len = t.cols();
                let w = (len, offset);
                offset += len;
                w
            })
            .collect();
        ConcatWideView::new(inputs.to_vec())
    }

    fn backward(&mut self, _queue: &TrainingQueue, output_error: &TensorRef) -> HappyMlResult<Vec<TensorRef>> {
        self.windows
            .iter()
            .map(|&(len, offset)| WindowView::new(output_error.clone(), offset, len))
            .collect()
    }

    fn name(&self) -> &'static str {
        "concat_wide"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::leaves::F32Tensor;
    use crate::tensor::Tensor;
    use std::rc::Rc;

    #[test]
    fn backward_splits_error_in_insertion_order() {
        let mut layer = ConcatWide::new();
        let a: TensorRef = Rc::new(F32Tensor::from_channel_major(1, 2, 1, vec![1.0, 2.0]).unwrap());
        let b: TensorRef = Rc::new(F32Tensor::from_channel_major(1, 3, 1, vec![3.0, 4.0, 5.0]).unwrap());
        let forward = layer.forward(&[a, b], false).unwrap();
        assert_eq!(forward.cols(), 5);
        let queue = TrainingQueue::new();
        let errors = layer.backward(&queue, &forward).unwrap();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].cols(), 2);
        assert_eq!(errors[1].cols(), 3);
    }
}
