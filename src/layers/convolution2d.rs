//! Per output filter `f` and input channel `c`, `forward` sums valid
//! cross-correlations of `input[:,:,c]` with `W[f][:,:,c]` into output
//! channel `f`. `backward` computes input error via full convolution with
//! each filter and weight error via valid cross-correlation of the
//! averaged input with the output error (spec section 4.2).

use super::{Layer, TrainingQueue};
use crate::errors::HappyMlResult;
use crate::optim::Optimizer;
use crate::tensor::leaves::F32Tensor;
use crate::tensor::views::{ChannelView, Conv2dValidView, Conv2dView, MulScalarView};
use crate::tensor::{materialize, Tensor, TensorRef};
use crate::types::BitWidth;
use std::rc::Rc;

/// One `(rows, cols, in_channels)` kernel per output filter.
pub struct Convolution2dValid {
    filters: Vec<TensorRef>,
    bits: BitWidth,
    filter_ids: Vec<usize>,
    pending_gradients: Vec<Option<TensorRef>>,
}

impl Convolution2dValid {
    pub fn new(filters: Vec<TensorRef>, bits: BitWidth, optimizer: &mut dyn Optimizer) -> Self {
        let filter_ids = filters.iter().map(|_| optimizer.register_weights()).collect();
        let pending_gradients = filters.iter().map(|_| None).collect();
        Convolution2dValid {
            filters,
            bits,
            filter_ids,
            pending_gradients,
        }
    }

    fn sum_channels_into(input: &TensorRef, filter: &TensorRef, out_rows: usize, out_cols: usize) -> HappyMlResult<Vec<f32>> {
        let mut acc = vec![0.0f32; out_rows * out_cols];
        for c in 0..input.channels() {
            let input_ch = ChannelView::new(input.clone(), c)?;
            let filter_ch = ChannelView::new(filter.clone(), c)?;
            let valid = Conv2dValidView::new(input_ch, filter_ch)?;
            for r in 0..out_rows {
                for col in 0..out_cols {
                    acc[r * out_cols + col] += valid.value(r, col, 0);
                }
            }
        }
        Ok(acc)
    }
}

impl Layer for Convolution2dValid {
    fn forward(&mut self, inputs: &[TensorRef], _for_training: bool) -> HappyMlResult<TensorRef> {
        let input = &inputs[0];
        let filter0 = &self.filters[0];
        let out_rows = input.rows() - filter0.rows() + 1;
        let out_cols = input.cols() - filter0.cols() + 1;
        let mut data = vec![0.0f32; out_rows * out_cols * self.filters.len()];
        for (f, filter) in self.filters.iter().enumerate() {
            let plane = Self::sum_channels_into(input, filter, out_rows, out_cols)?;
            for r in 0..out_rows {
                for c in 0..out_cols {
                    data[f * out_rows * out_cols + r * out_cols + c] = plane[r * out_cols + c];
                }
            }
        }
        Ok(Rc::new(F32Tensor::from_channel_major(
            out_rows,
            out_cols,
            self.filters.len(),
            data,
        )?))
    }

    fn backward(&mut self, queue: &TrainingQueue, output_error: &TensorRef) -> HappyMlResult<Vec<TensorRef>> {
        let averaged_input = queue.averaged_input(0)?;
        let in_rows = averaged_input.rows();
        let in_cols = averaged_input.cols();
        let in_channels = averaged_input.channels();
        let scale = self.bits.weight_update_scale();

        let mut input_error_data = vec![0.0f32; in_rows * in_cols * in_channels];
        for (f, filter) in self.filters.iter().enumerate() {
            let error_ch = ChannelView::new(output_error.clone(), f)?;
            let mut weight_grad_data = vec![0.0f32; filter.rows() * filter.cols() * filter.channels()];

            for c in 0..in_channels {
                let filter_ch = ChannelView::new(filter.clone(), c)?;
                let full = Conv2dView::new(error_ch.clone(), filter_ch)?;
                for r in 0..in_rows {
                    for col in 0..in_cols {
                        input_error_data[c * in_rows * in_cols + r * in_cols + col] += full.value(r, col, 0);
                    }
                }

                let input_ch = ChannelView::new(averaged_input.clone(), c)?;
                let weight_error = Conv2dValidView::new(input_ch, error_ch.clone())?;
                for r in 0..filter.rows() {
                    for col in 0..filter.cols() {
                        weight_grad_data[c * filter.rows() * filter.cols() + r * filter.cols() + col] =
                            weight_error.value(r, col, 0);
                    }
                }
            }

            let gradient: TensorRef = Rc::new(F32Tensor::from_channel_major(
                filter.rows(),
                filter.cols(),
                filter.channels(),
                weight_grad_data,
            )?);
            self.pending_gradients[f] = Some(MulScalarView::new(gradient, scale));
        }

        let input_error = Rc::new(F32Tensor::from_channel_major(in_rows, in_cols, in_channels, input_error_data)?);
        Ok(vec![input_error])
    }

    fn update(&mut self, optimizer: &mut dyn Optimizer) -> HappyMlResult<()> {
        for f in 0..self.filters.len() {
            if let Some(gradient) = self.pending_gradients[f].take() {
                let updated = optimizer.update_weights(self.filter_ids[f], &self.filters[f], &gradient)?;
                self.filters[f] = materialize(&updated, self.bits)?;
            }
        }
        Ok(())
    }

    fn save(&self, dir: &std::path::Path, vertex_id: usize) -> HappyMlResult<()> {
        for (f, filter) in self.filters.iter().enumerate() {
            crate::graph::persistence::save_parameter(dir, vertex_id, &format!("filter{f}"), filter)?;
        }
        Ok(())
    }

    fn load(&mut self, dir: &std::path::Path, vertex_id: usize) -> HappyMlResult<()> {
        for f in 0..self.filters.len() {
            self.filters[f] = crate::graph::persistence::load_parameter(dir, vertex_id, &format!("filter{f}"))?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "convolution2d_valid"
    }
}
