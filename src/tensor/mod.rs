//! The lazy tensor algebra graph (spec section 4.1). Tensors are
//! three-dimensional (rows x cols x channels) values. Most operations build
//! *views* -- lightweight nodes that compute `value()` on demand from shared
//! references to their operands -- while a handful of *materialized*
//! tensors (32/16/8-bit) act as storage leaves.
//!
//! `TensorRef` is `Rc`, not `Arc`: per spec section 5 the engine is
//! single-threaded by contract and tensors are immutable after
//! construction, so sharing within one graph never crosses a thread
//! boundary. Independent training configurations (e.g. Hyperband arms) each
//! build their own `Rc`-rooted graph on their own OS thread.

pub mod io;
pub mod leaves;
pub mod precision;
pub mod views;

use crate::errors::HappyMlResult;
use crate::types::{BitWidth, Shape3};
use std::rc::Rc;

pub type TensorRef = Rc<dyn Tensor>;

/// Capability set shared by every tensor leaf and view (spec section 4.1).
pub trait Tensor: std::fmt::Debug {
    fn rows(&self) -> usize;
    fn cols(&self) -> usize;
    fn channels(&self) -> usize;

    fn shape(&self) -> Shape3 {
        (self.rows(), self.cols(), self.channels())
    }

    /// Pure, deterministic, side-effect-free cell accessor.
    fn value(&self, row: usize, col: usize, channel: usize) -> f32;

    /// True for materialized leaves; views always report `false`.
    fn is_materialized(&self) -> bool {
        false
    }

    /// True iff `other` is reachable through this tensor's view DAG
    /// (including `self` itself for leaves with no operands).
    fn contains(&self, other: &TensorRef) -> bool;

    /// Structural description of the materialization plan, indented for
    /// nested views.
    fn plan(&self, indent: usize) -> String;

    /// Streams this tensor's values to `writer` in the on-disk format of
    /// `tensor::io` (spec section 6). Works for leaves and views alike --
    /// a view is realized on the fly, one cell at a time.
    fn save(&self, writer: &mut dyn std::io::Write) -> HappyMlResult<()>
    where
        Self: Sized,
    {
        io::save_tensor(self, writer)
    }

    /// Supports the `materialize(_, 32)` pass-through check; only
    /// `F32Tensor` overrides this to return `Some(self)`.
    fn as_f32_leaf(&self) -> Option<&leaves::F32Tensor> {
        None
    }
}

pub(crate) fn same_shape(a: &dyn Tensor, b: &dyn Tensor) -> bool {
    a.shape() == b.shape()
}

pub(crate) fn indent_str(indent: usize) -> String {
    "  ".repeat(indent)
}

/// Converts a view (or leaf) into a materialized leaf at the requested bit
/// width (spec section 4.1, "Materialization"). 32 is a pass-through if
/// already an `F32Tensor`; 16 performs a half-precision copy; 8 scans
/// `(min, max)` once to choose a bias per `precision::choose_quarter_bias`.
pub fn materialize(tensor: &TensorRef, bits: BitWidth) -> HappyMlResult<TensorRef> {
    use leaves::{F16Tensor, F32Tensor, Q8Tensor};

    match bits {
        BitWidth::Bits32 => {
            if tensor.as_f32_leaf().is_some() {
                return Ok(tensor.clone());
            }
            Ok(Rc::new(F32Tensor::from_tensor(tensor)))
        }
        BitWidth::Bits16 => Ok(Rc::new(F16Tensor::from_tensor(tensor))),
        BitWidth::Bits8 => {
            let (min, max) = scan_min_max(tensor);
            let bias = precision::choose_quarter_bias(min, max);
            Ok(Rc::new(Q8Tensor::from_tensor(tensor, bias)))
        }
    }
}

fn scan_min_max(tensor: &TensorRef) -> (f32, f32) {
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    let (rows, cols, channels) = tensor.shape();
    for ch in 0..channels {
        for r in 0..rows {
            for c in 0..cols {
                let v = tensor.value(r, c, ch);
                if v < min {
                    min = v;
                }
                if v > max {
                    max = v;
                }
            }
        }
    }
    if rows == 0 || cols == 0 || channels == 0 {
        (0.0, 0.0)
    } else {
        (min, max)
    }
}
