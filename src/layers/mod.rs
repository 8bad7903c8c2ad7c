//! Layer trait and the explicit per-batch training queue (spec section 4.2,
//! DESIGN NOTES §9: "Queue-per-batch state inside layers" kept out of the
//! layers themselves and owned by the driver instead).

pub mod activation;
pub mod bias;
pub mod concat_wide;
pub mod convolution2d;
pub mod dropout;
pub mod flatten;
pub mod fully_connected;
pub mod normalization;

use crate::errors::HappyMlResult;
use crate::tensor::TensorRef;
use std::path::Path;

/// Forward/backward operator with optional persistent parameters.
pub trait Layer {
    fn forward(&mut self, inputs: &[TensorRef], for_training: bool) -> HappyMlResult<TensorRef>;

    /// One error tensor per input, in input order. Layers that own
    /// parameters stash the gradient they computed here for `update` to
    /// apply once the graph has finished this node's backward step.
    fn backward(&mut self, queue: &TrainingQueue, output_error: &TensorRef) -> HappyMlResult<Vec<TensorRef>>;

    /// Applies the gradient(s) computed by the last `backward` call via the
    /// optimizer, mirroring the teacher's `Layer::update(&mut self,
    /// learning_rate)` but generalized to a pluggable `Optimizer` since the
    /// update rule and mixed-precision scale both vary per layer.
    fn update(&mut self, _optimizer: &mut dyn crate::optim::Optimizer) -> HappyMlResult<()> {
        Ok(())
    }

    fn save(&self, _dir: &Path, _vertex_id: usize) -> HappyMlResult<()> {
        Ok(())
    }

    fn load(&mut self, _dir: &Path, _vertex_id: usize) -> HappyMlResult<()> {
        Ok(())
    }

    fn name(&self) -> &'static str;
}

/// Per-sample inputs queued for the current mini-batch. The driver pushes
/// into this during `forward(for_training=true)` and hands it to
/// `backward` once the batch is full, so layers stay free of hidden FIFOs.
#[derive(Debug, Clone, Default)]
pub struct TrainingQueue {
    samples: Vec<Vec<TensorRef>>,
}

impl TrainingQueue {
    pub fn new() -> Self {
        TrainingQueue { samples: Vec::new() }
    }

    pub fn push(&mut self, inputs: Vec<TensorRef>) {
        self.samples.push(inputs);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Sequential oldest-to-newest arithmetic mean of queued input `idx`
    /// (spec section 9: a single documented accumulation order for
    /// reproducible 32-bit rounding).
    pub fn averaged_input(&self, idx: usize) -> HappyMlResult<TensorRef> {
        use crate::tensor::leaves::F32Tensor;

        let first = &self.samples[0][idx];
        let (rows, cols, channels) = first.shape();
        let mut acc = vec![0.0f32; rows * cols * channels];
        for sample in &self.samples {
            let t = &sample[idx];
            let mut i = 0;
            for ch in 0..channels {
                for r in 0..rows {
                    for c in 0..cols {
                        acc[i] += t.value(r, c, ch);
                        i += 1;
                    }
                }
            }
        }
        let n = self.samples.len().max(1) as f32;
        for v in acc.iter_mut() {
            *v /= n;
        }
        Ok(std::rc::Rc::new(F32Tensor::from_channel_major(
            rows, cols, channels, acc,
        )?))
    }
}
