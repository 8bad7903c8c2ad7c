//! Materialized tensor leaves (spec section 4.1) and the procedural leaves
//! used to seed parameters before training ever begins.

use super::precision::{
    f16, f16_to_f32, f32_to_f16, float_to_pixel, float_to_quarter, pixel_to_float,
    quarter_to_float,
};
use super::{indent_str, Tensor, TensorRef};
use crate::errors::{HappyMlError, HappyMlResult};
use crate::types::Shape3;
use ndarray::Array3;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::rc::Rc;

fn checked_len(rows: usize, cols: usize, channels: usize, data_len: usize) -> HappyMlResult<()> {
    let expected = rows * cols * channels;
    if expected != data_len {
        return Err(HappyMlError::InvalidReshape {
            rows,
            cols,
            channels,
            from: data_len,
            to: expected,
        });
    }
    Ok(())
}

/// Exact 32-bit storage leaf. Data is kept `(channel, row, col)` major to
/// match the on-disk layout of `tensor::io`.
#[derive(Debug, Clone)]
pub struct F32Tensor {
    data: Array3<f32>, // (channels, rows, cols)
}

impl F32Tensor {
    pub fn from_channel_major(
        rows: usize,
        cols: usize,
        channels: usize,
        data: Vec<f32>,
    ) -> HappyMlResult<Self> {
        checked_len(rows, cols, channels, data.len())?;
        let arr = Array3::from_shape_vec((channels, rows, cols), data)
            .map_err(|_| HappyMlError::InvalidReshape {
                rows,
                cols,
                channels,
                from: 0,
                to: 0,
            })?;
        Ok(F32Tensor { data: arr })
    }

    pub fn zeros(rows: usize, cols: usize, channels: usize) -> Self {
        F32Tensor {
            data: Array3::zeros((channels, rows, cols)),
        }
    }

    pub fn from_tensor(tensor: &TensorRef) -> Self {
        let (rows, cols, channels) = tensor.shape();
        let mut arr = Array3::zeros((channels, rows, cols));
        for ch in 0..channels {
            for r in 0..rows {
                for c in 0..cols {
                    arr[[ch, r, c]] = tensor.value(r, c, ch);
                }
            }
        }
        F32Tensor { data: arr }
    }
}

impl Tensor for F32Tensor {
    fn rows(&self) -> usize {
        self.data.shape()[1]
    }
    fn cols(&self) -> usize {
        self.data.shape()[2]
    }
    fn channels(&self) -> usize {
        self.data.shape()[0]
    }
    fn value(&self, row: usize, col: usize, channel: usize) -> f32 {
        self.data[[channel, row, col]]
    }
    fn is_materialized(&self) -> bool {
        true
    }
    fn contains(&self, _other: &TensorRef) -> bool {
        false
    }
    fn plan(&self, indent: usize) -> String {
        format!("{}f32[{}x{}x{}]", indent_str(indent), self.rows(), self.cols(), self.channels())
    }
    fn as_f32_leaf(&self) -> Option<&F32Tensor> {
        Some(self)
    }
}

/// Half-precision storage leaf backed by `half::f16`.
#[derive(Debug, Clone)]
pub struct F16Tensor {
    data: Array3<f16>,
}

impl F16Tensor {
    pub fn from_tensor(tensor: &TensorRef) -> Self {
        let (rows, cols, channels) = tensor.shape();
        let mut arr = Array3::from_elem((channels, rows, cols), f16::from_f32(0.0));
        for ch in 0..channels {
            for r in 0..rows {
                for c in 0..cols {
                    arr[[ch, r, c]] = f32_to_f16(tensor.value(r, c, ch));
                }
            }
        }
        F16Tensor { data: arr }
    }
}

impl Tensor for F16Tensor {
    fn rows(&self) -> usize {
        self.data.shape()[1]
    }
    fn cols(&self) -> usize {
        self.data.shape()[2]
    }
    fn channels(&self) -> usize {
        self.data.shape()[0]
    }
    fn value(&self, row: usize, col: usize, channel: usize) -> f32 {
        f16_to_f32(self.data[[channel, row, col]])
    }
    fn is_materialized(&self) -> bool {
        true
    }
    fn contains(&self, _other: &TensorRef) -> bool {
        false
    }
    fn plan(&self, indent: usize) -> String {
        format!("{}f16[{}x{}x{}]", indent_str(indent), self.rows(), self.cols(), self.channels())
    }
}

/// Quarter-float storage leaf: a single exponent bias shared by the whole
/// tensor, chosen once at materialization time (spec section 4.1).
#[derive(Debug, Clone)]
pub struct Q8Tensor {
    data: Array3<i8>,
    bias: i32,
}

impl Q8Tensor {
    pub fn from_tensor(tensor: &TensorRef, bias: i32) -> Self {
        let (rows, cols, channels) = tensor.shape();
        let mut arr = Array3::from_elem((channels, rows, cols), 0i8);
        for ch in 0..channels {
            for r in 0..rows {
                for c in 0..cols {
                    arr[[ch, r, c]] = float_to_quarter(tensor.value(r, c, ch), bias);
                }
            }
        }
        Q8Tensor { data: arr, bias }
    }

    pub fn bias(&self) -> i32 {
        self.bias
    }
}

impl Tensor for Q8Tensor {
    fn rows(&self) -> usize {
        self.data.shape()[1]
    }
    fn cols(&self) -> usize {
        self.data.shape()[2]
    }
    fn channels(&self) -> usize {
        self.data.shape()[0]
    }
    fn value(&self, row: usize, col: usize, channel: usize) -> f32 {
        quarter_to_float(self.data[[channel, row, col]], self.bias)
    }
    fn is_materialized(&self) -> bool {
        true
    }
    fn contains(&self, _other: &TensorRef) -> bool {
        false
    }
    fn plan(&self, indent: usize) -> String {
        format!(
            "{}q8(bias={})[{}x{}x{}]",
            indent_str(indent),
            self.bias,
            self.rows(),
            self.cols(),
            self.channels()
        )
    }
}

/// A tensor whose cells are `u8` pixel intensities representing `0.0..=1.0`.
#[derive(Debug, Clone)]
pub struct PixelTensor {
    data: Array3<u8>,
}

impl PixelTensor {
    pub fn from_channel_major(
        rows: usize,
        cols: usize,
        channels: usize,
        data: Vec<u8>,
    ) -> HappyMlResult<Self> {
        checked_len(rows, cols, channels, data.len())?;
        let arr = Array3::from_shape_vec((channels, rows, cols), data)
            .map_err(|_| HappyMlError::InvalidReshape {
                rows,
                cols,
                channels,
                from: 0,
                to: 0,
            })?;
        Ok(PixelTensor { data: arr })
    }

    pub fn from_tensor(tensor: &TensorRef) -> Self {
        let (rows, cols, channels) = tensor.shape();
        let mut arr = Array3::from_elem((channels, rows, cols), 0u8);
        for ch in 0..channels {
            for r in 0..rows {
                for c in 0..cols {
                    arr[[ch, r, c]] = float_to_pixel(tensor.value(r, c, ch));
                }
            }
        }
        PixelTensor { data: arr }
    }
}

impl Tensor for PixelTensor {
    fn rows(&self) -> usize {
        self.data.shape()[1]
    }
    fn cols(&self) -> usize {
        self.data.shape()[2]
    }
    fn channels(&self) -> usize {
        self.data.shape()[0]
    }
    fn value(&self, row: usize, col: usize, channel: usize) -> f32 {
        pixel_to_float(self.data[[channel, row, col]])
    }
    fn is_materialized(&self) -> bool {
        true
    }
    fn contains(&self, _other: &TensorRef) -> bool {
        false
    }
    fn plan(&self, indent: usize) -> String {
        format!("{}pixel[{}x{}x{}]", indent_str(indent), self.rows(), self.cols(), self.channels())
    }
}

/// Seeded uniform-random tensor, materialized eagerly at construction so
/// repeated `value()` calls are stable (spec section 4.1, "Procedural
/// leaves").
#[derive(Debug, Clone)]
pub struct RandomTensor {
    data: Array3<f32>,
}

impl RandomTensor {
    pub fn new(rows: usize, cols: usize, channels: usize, low: f32, high: f32, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let data = Array3::random_using((channels, rows, cols), Uniform::new(low, high), &mut rng);
        RandomTensor { data }
    }
}

impl Tensor for RandomTensor {
    fn rows(&self) -> usize {
        self.data.shape()[1]
    }
    fn cols(&self) -> usize {
        self.data.shape()[2]
    }
    fn channels(&self) -> usize {
        self.data.shape()[0]
    }
    fn value(&self, row: usize, col: usize, channel: usize) -> f32 {
        self.data[[channel, row, col]]
    }
    fn is_materialized(&self) -> bool {
        true
    }
    fn contains(&self, _other: &TensorRef) -> bool {
        false
    }
    fn plan(&self, indent: usize) -> String {
        format!("{}random[{}x{}x{}]", indent_str(indent), self.rows(), self.cols(), self.channels())
    }
}

/// Xavier/Glorot-initialized weight tensor: bounded uniform over
/// `+/- sqrt(2/(rows+cols))/2` (spec section 3/4.2, "Weight initialization"),
/// ported from `TensorFromXavier`.
#[derive(Debug, Clone)]
pub struct XavierTensor {
    data: Array3<f32>,
}

impl XavierTensor {
    pub fn new(rows: usize, cols: usize, channels: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let variance = (2.0 / (rows + cols).max(1) as f32).sqrt() / 2.0;
        let data = Array3::random_using((channels, rows, cols), Uniform::new(-variance, variance), &mut rng);
        XavierTensor { data }
    }
}

impl Tensor for XavierTensor {
    fn rows(&self) -> usize {
        self.data.shape()[1]
    }
    fn cols(&self) -> usize {
        self.data.shape()[2]
    }
    fn channels(&self) -> usize {
        self.data.shape()[0]
    }
    fn value(&self, row: usize, col: usize, channel: usize) -> f32 {
        self.data[[channel, row, col]]
    }
    fn is_materialized(&self) -> bool {
        true
    }
    fn contains(&self, _other: &TensorRef) -> bool {
        false
    }
    fn plan(&self, indent: usize) -> String {
        format!("{}xavier[{}x{}x{}]", indent_str(indent), self.rows(), self.cols(), self.channels())
    }
}

/// Every cell holds the same constant (used for bias initialization and
/// tests).
#[derive(Debug, Clone)]
pub struct UniformTensor {
    value: f32,
    shape: Shape3,
}

impl UniformTensor {
    pub fn new(rows: usize, cols: usize, channels: usize, value: f32) -> Self {
        UniformTensor {
            value,
            shape: (rows, cols, channels),
        }
    }
}

impl Tensor for UniformTensor {
    fn rows(&self) -> usize {
        self.shape.0
    }
    fn cols(&self) -> usize {
        self.shape.1
    }
    fn channels(&self) -> usize {
        self.shape.2
    }
    fn value(&self, _row: usize, _col: usize, _channel: usize) -> f32 {
        self.value
    }
    fn is_materialized(&self) -> bool {
        true
    }
    fn contains(&self, _other: &TensorRef) -> bool {
        false
    }
    fn plan(&self, indent: usize) -> String {
        format!("{}uniform({})[{}x{}x{}]", indent_str(indent), self.value, self.rows(), self.cols(), self.channels())
    }
}

/// Square identity matrix broadcast across `channels` (used to seed
/// skip-connections and for algebra tests).
#[derive(Debug, Clone)]
pub struct IdentityTensor {
    size: usize,
    channels: usize,
}

impl IdentityTensor {
    pub fn new(size: usize, channels: usize) -> Self {
        IdentityTensor { size, channels }
    }
}

impl Tensor for IdentityTensor {
    fn rows(&self) -> usize {
        self.size
    }
    fn cols(&self) -> usize {
        self.size
    }
    fn channels(&self) -> usize {
        self.channels
    }
    fn value(&self, row: usize, col: usize, _channel: usize) -> f32 {
        if row == col {
            1.0
        } else {
            0.0
        }
    }
    fn is_materialized(&self) -> bool {
        true
    }
    fn contains(&self, _other: &TensorRef) -> bool {
        false
    }
    fn plan(&self, indent: usize) -> String {
        format!("{}identity[{}x{}x{}]", indent_str(indent), self.rows(), self.cols(), self.channels())
    }
}

/// A tensor computed from an arbitrary pure function of its coordinates.
/// Used internally by layers that need a procedural constant (e.g. causal
/// masks) without a dedicated view type.
pub struct FromFunctionTensor {
    shape: Shape3,
    f: Box<dyn Fn(usize, usize, usize) -> f32>,
}

impl FromFunctionTensor {
    pub fn new(
        rows: usize,
        cols: usize,
        channels: usize,
        f: impl Fn(usize, usize, usize) -> f32 + 'static,
    ) -> Rc<Self> {
        Rc::new(FromFunctionTensor {
            shape: (rows, cols, channels),
            f: Box::new(f),
        })
    }
}

impl std::fmt::Debug for FromFunctionTensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FromFunctionTensor{:?}", self.shape)
    }
}

impl Tensor for FromFunctionTensor {
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
        (self.f)(row, col, channel)
    }
    fn contains(&self, _other: &TensorRef) -> bool {
        false
    }
    fn plan(&self, indent: usize) -> String {
        format!("{}fn[{}x{}x{}]", indent_str(indent), self.rows(), self.cols(), self.channels())
    }
}
