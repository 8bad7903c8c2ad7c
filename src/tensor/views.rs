//! View nodes over the tensor algebra graph (spec section 4.1). Every
//! constructor validates operand-shape compatibility eagerly and returns
//! `HappyMlResult<TensorRef>`; `value()` itself never fails.

use super::{indent_str, same_shape, Tensor, TensorRef};
use crate::errors::{HappyMlError, HappyMlResult};
use std::rc::Rc;

fn shape_mismatch(a: &dyn Tensor, b: &dyn Tensor) -> HappyMlError {
    HappyMlError::IncompatibleShapes {
        expected: a.shape(),
        found: b.shape(),
    }
}

macro_rules! unary_view {
    ($name:ident, $plan:literal, $value:expr) => {
        #[derive(Debug, Clone)]
        pub struct $name {
            operand: TensorRef,
        }

        impl $name {
            pub fn new(operand: TensorRef) -> TensorRef {
                Rc::new($name { operand })
            }
        }

        impl Tensor for $name {
            fn rows(&self) -> usize {
                self.operand.rows()
            }
            fn cols(&self) -> usize {
                self.operand.cols()
            }
            fn channels(&self) -> usize {
                self.operand.channels()
            }
            fn value(&self, row: usize, col: usize, channel: usize) -> f32 {
                let v = self.operand.value(row, col, channel);
                let f: fn(f32) -> f32 = $value;
                f(v)
            }
            fn contains(&self, other: &TensorRef) -> bool {
                Rc::ptr_eq(&self.operand, other) || self.operand.contains(other)
            }
            fn plan(&self, indent: usize) -> String {
                format!(
                    "{}{}\n{}",
                    indent_str(indent),
                    $plan,
                    self.operand.plan(indent + 1)
                )
            }
        }
    };
}

unary_view!(LnView, "ln", |v| v.ln());
unary_view!(Log2View, "log2", |v| v.log2());
unary_view!(RoundView, "round", |v| v.round());

/// Adds a constant to every cell.
#[derive(Debug, Clone)]
pub struct AddScalarView {
    operand: TensorRef,
    scalar: f32,
}

impl AddScalarView {
    pub fn new(operand: TensorRef, scalar: f32) -> TensorRef {
        Rc::new(AddScalarView { operand, scalar })
    }
}

impl Tensor for AddScalarView {
    fn rows(&self) -> usize {
        self.operand.rows()
    }
    fn cols(&self) -> usize {
        self.operand.cols()
    }
    fn channels(&self) -> usize {
        self.operand.channels()
    }
    fn value(&self, row: usize, col: usize, channel: usize) -> f32 {
        self.operand.value(row, col, channel) + self.scalar
    }
    fn contains(&self, other: &TensorRef) -> bool {
        Rc::ptr_eq(&self.operand, other) || self.operand.contains(other)
    }
    fn plan(&self, indent: usize) -> String {
        format!(
            "{}add_scalar({})\n{}",
            indent_str(indent),
            self.scalar,
            self.operand.plan(indent + 1)
        )
    }
}

/// Multiplies every cell by a constant.
#[derive(Debug, Clone)]
pub struct MulScalarView {
    operand: TensorRef,
    scalar: f32,
}

impl MulScalarView {
    pub fn new(operand: TensorRef, scalar: f32) -> TensorRef {
        Rc::new(MulScalarView { operand, scalar })
    }
}

impl Tensor for MulScalarView {
    fn rows(&self) -> usize {
        self.operand.rows()
    }
    fn cols(&self) -> usize {
        self.operand.cols()
    }
    fn channels(&self) -> usize {
        self.operand.channels()
    }
    fn value(&self, row: usize, col: usize, channel: usize) -> f32 {
        self.operand.value(row, col, channel) * self.scalar
    }
    fn contains(&self, other: &TensorRef) -> bool {
        Rc::ptr_eq(&self.operand, other) || self.operand.contains(other)
    }
    fn plan(&self, indent: usize) -> String {
        format!(
            "{}mul_scalar({})\n{}",
            indent_str(indent),
            self.scalar,
            self.operand.plan(indent + 1)
        )
    }
}

#[derive(Debug, Clone)]
pub struct PowView {
    operand: TensorRef,
    exponent: f32,
}

impl PowView {
    pub fn new(operand: TensorRef, exponent: f32) -> TensorRef {
        Rc::new(PowView { operand, exponent })
    }
}

impl Tensor for PowView {
    fn rows(&self) -> usize {
        self.operand.rows()
    }
    fn cols(&self) -> usize {
        self.operand.cols()
    }
    fn channels(&self) -> usize {
        self.operand.channels()
    }
    fn value(&self, row: usize, col: usize, channel: usize) -> f32 {
        self.operand.value(row, col, channel).powf(self.exponent)
    }
    fn contains(&self, other: &TensorRef) -> bool {
        Rc::ptr_eq(&self.operand, other) || self.operand.contains(other)
    }
    fn plan(&self, indent: usize) -> String {
        format!(
            "{}pow({})\n{}",
            indent_str(indent),
            self.exponent,
            self.operand.plan(indent + 1)
        )
    }
}

#[derive(Debug, Clone)]
pub struct ClipView {
    operand: TensorRef,
    min: f32,
    max: f32,
}

impl ClipView {
    pub fn new(operand: TensorRef, min: f32, max: f32) -> TensorRef {
        Rc::new(ClipView { operand, min, max })
    }
}

impl Tensor for ClipView {
    fn rows(&self) -> usize {
        self.operand.rows()
    }
    fn cols(&self) -> usize {
        self.operand.cols()
    }
    fn channels(&self) -> usize {
        self.operand.channels()
    }
    fn value(&self, row: usize, col: usize, channel: usize) -> f32 {
        self.operand.value(row, col, channel).clamp(self.min, self.max)
    }
    fn contains(&self, other: &TensorRef) -> bool {
        Rc::ptr_eq(&self.operand, other) || self.operand.contains(other)
    }
    fn plan(&self, indent: usize) -> String {
        format!(
            "{}clip({}, {})\n{}",
            indent_str(indent),
            self.min,
            self.max,
            self.operand.plan(indent + 1)
        )
    }
}

/// Arbitrary pure `f32 -> f32` value transform (used by activations'
/// `forward` pass, spec section 4.2).
pub struct ValueTransformView {
    operand: TensorRef,
    name: &'static str,
    f: Rc<dyn Fn(f32) -> f32>,
}

impl ValueTransformView {
    pub fn new(operand: TensorRef, name: &'static str, f: Rc<dyn Fn(f32) -> f32>) -> TensorRef {
        Rc::new(ValueTransformView { operand, name, f })
    }
}

impl std::fmt::Debug for ValueTransformView {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(fmt, "ValueTransformView({})", self.name)
    }
}

impl Tensor for ValueTransformView {
    fn rows(&self) -> usize {
        self.operand.rows()
    }
    fn cols(&self) -> usize {
        self.operand.cols()
    }
    fn channels(&self) -> usize {
        self.operand.channels()
    }
    fn value(&self, row: usize, col: usize, channel: usize) -> f32 {
        (self.f)(self.operand.value(row, col, channel))
    }
    fn contains(&self, other: &TensorRef) -> bool {
        Rc::ptr_eq(&self.operand, other) || self.operand.contains(other)
    }
    fn plan(&self, indent: usize) -> String {
        format!(
            "{}value_transform({})\n{}",
            indent_str(indent),
            self.name,
            self.operand.plan(indent + 1)
        )
    }
}

/// Reverses both axes within each channel (used for convolution backward
/// and the full-convolution view).
#[derive(Debug, Clone)]
pub struct Rotate180View {
    operand: TensorRef,
}

impl Rotate180View {
    pub fn new(operand: TensorRef) -> TensorRef {
        Rc::new(Rotate180View { operand })
    }
}

impl Tensor for Rotate180View {
    fn rows(&self) -> usize {
        self.operand.rows()
    }
    fn cols(&self) -> usize {
        self.operand.cols()
    }
    fn channels(&self) -> usize {
        self.operand.channels()
    }
    fn value(&self, row: usize, col: usize, channel: usize) -> f32 {
        let r = self.operand.rows() - 1 - row;
        let c = self.operand.cols() - 1 - col;
        self.operand.value(r, c, channel)
    }
    fn contains(&self, other: &TensorRef) -> bool {
        Rc::ptr_eq(&self.operand, other) || self.operand.contains(other)
    }
    fn plan(&self, indent: usize) -> String {
        format!("{}rotate180\n{}", indent_str(indent), self.operand.plan(indent + 1))
    }
}

/// Same channel count, same elements-per-channel (spec section 4.1's
/// edge-case policy); construction fails otherwise.
#[derive(Debug, Clone)]
pub struct ReshapeView {
    operand: TensorRef,
    rows: usize,
    cols: usize,
}

impl ReshapeView {
    pub fn new(operand: TensorRef, rows: usize, cols: usize) -> HappyMlResult<TensorRef> {
        let from = operand.rows() * operand.cols();
        let to = rows * cols;
        if from != to {
            return Err(HappyMlError::InvalidReshape {
                rows,
                cols,
                channels: operand.channels(),
                from,
                to,
            });
        }
        Ok(Rc::new(ReshapeView { operand, rows, cols }))
    }
}

impl Tensor for ReshapeView {
    fn rows(&self) -> usize {
        self.rows
    }
    fn cols(&self) -> usize {
        self.cols
    }
    fn channels(&self) -> usize {
        self.operand.channels()
    }
    fn value(&self, row: usize, col: usize, channel: usize) -> f32 {
        let flat = row * self.cols + col;
        let src_row = flat / self.operand.cols();
        let src_col = flat % self.operand.cols();
        self.operand.value(src_row, src_col, channel)
    }
    fn contains(&self, other: &TensorRef) -> bool {
        Rc::ptr_eq(&self.operand, other) || self.operand.contains(other)
    }
    fn plan(&self, indent: usize) -> String {
        format!(
            "{}reshape({}x{})\n{}",
            indent_str(indent),
            self.rows,
            self.cols,
            self.operand.plan(indent + 1)
        )
    }
}

/// Single row, single channel; built by flattening row-major then
/// channel-major (layers::Flatten relies on this to restore shape later).
#[derive(Debug, Clone)]
pub struct FlattenToRowView {
    operand: TensorRef,
    len: usize,
}

impl FlattenToRowView {
    pub fn new(operand: TensorRef) -> TensorRef {
        let len = operand.rows() * operand.cols() * operand.channels();
        Rc::new(FlattenToRowView { operand, len })
    }
}

impl Tensor for FlattenToRowView {
    fn rows(&self) -> usize {
        1
    }
    fn cols(&self) -> usize {
        self.len
    }
    fn channels(&self) -> usize {
        1
    }
    fn value(&self, row: usize, col: usize, _channel: usize) -> f32 {
        debug_assert_eq!(row, 0, "flatten-to-row only has a single row");
        let cols = self.operand.cols();
        let rows = self.operand.rows();
        let channel = col / (rows * cols);
        let rem = col % (rows * cols);
        let r = rem / cols;
        let c = rem % cols;
        self.operand.value(r, c, channel)
    }
    fn contains(&self, other: &TensorRef) -> bool {
        Rc::ptr_eq(&self.operand, other) || self.operand.contains(other)
    }
    fn plan(&self, indent: usize) -> String {
        format!("{}flatten_to_row\n{}", indent_str(indent), self.operand.plan(indent + 1))
    }
}

/// Swaps rows/cols, preserves channels.
#[derive(Debug, Clone)]
pub struct TransposeView {
    operand: TensorRef,
}

impl TransposeView {
    pub fn new(operand: TensorRef) -> TensorRef {
        Rc::new(TransposeView { operand })
    }
}

impl Tensor for TransposeView {
    fn rows(&self) -> usize {
        self.operand.cols()
    }
    fn cols(&self) -> usize {
        self.operand.rows()
    }
    fn channels(&self) -> usize {
        self.operand.channels()
    }
    fn value(&self, row: usize, col: usize, channel: usize) -> f32 {
        self.operand.value(col, row, channel)
    }
    fn contains(&self, other: &TensorRef) -> bool {
        Rc::ptr_eq(&self.operand, other) || self.operand.contains(other)
    }
    fn plan(&self, indent: usize) -> String {
        format!("{}transpose\n{}", indent_str(indent), self.operand.plan(indent + 1))
    }
}

/// Extracts one channel, exposed as channel 0 of the result.
#[derive(Debug, Clone)]
pub struct ChannelView {
    operand: TensorRef,
    channel: usize,
}

impl ChannelView {
    pub fn new(operand: TensorRef, channel: usize) -> HappyMlResult<TensorRef> {
        if channel >= operand.channels() {
            return Err(HappyMlError::IncompatibleShapes {
                expected: (operand.rows(), operand.cols(), operand.channels()),
                found: (operand.rows(), operand.cols(), channel + 1),
            });
        }
        Ok(Rc::new(ChannelView { operand, channel }))
    }
}

impl Tensor for ChannelView {
    fn rows(&self) -> usize {
        self.operand.rows()
    }
    fn cols(&self) -> usize {
        self.operand.cols()
    }
    fn channels(&self) -> usize {
        1
    }
    fn value(&self, row: usize, col: usize, _channel: usize) -> f32 {
        self.operand.value(row, col, self.channel)
    }
    fn contains(&self, other: &TensorRef) -> bool {
        Rc::ptr_eq(&self.operand, other) || self.operand.contains(other)
    }
    fn plan(&self, indent: usize) -> String {
        format!(
            "{}channel({})\n{}",
            indent_str(indent),
            self.channel,
            self.operand.plan(indent + 1)
        )
    }
}

/// Two shape regimes resolved per DESIGN.md's decided open question: a
/// multi-row operand yields a single row of its diagonal; a single-row
/// operand yields a square matrix with itself as the diagonal.
#[derive(Debug, Clone)]
pub struct DiagonalView {
    operand: TensorRef,
    offset: usize,
    expand: bool,
    len: usize,
}

impl DiagonalView {
    pub fn new(operand: TensorRef, offset: usize) -> TensorRef {
        if operand.rows() > 1 {
            let len = operand.rows().saturating_sub(offset);
            Rc::new(DiagonalView {
                operand,
                offset,
                expand: false,
                len,
            })
        } else {
            let len = operand.cols();
            Rc::new(DiagonalView {
                operand,
                offset,
                expand: true,
                len,
            })
        }
    }
}

impl Tensor for DiagonalView {
    fn rows(&self) -> usize {
        if self.expand {
            self.len
        } else {
            1
        }
    }
    fn cols(&self) -> usize {
        self.len
    }
    fn channels(&self) -> usize {
        self.operand.channels()
    }
    fn value(&self, row: usize, col: usize, channel: usize) -> f32 {
        if self.expand {
            if row == col {
                self.operand.value(0, row, channel)
            } else {
                0.0
            }
        } else {
            self.operand.value(col + self.offset, col, channel)
        }
    }
    fn contains(&self, other: &TensorRef) -> bool {
        Rc::ptr_eq(&self.operand, other) || self.operand.contains(other)
    }
    fn plan(&self, indent: usize) -> String {
        format!(
            "{}diagonal(offset={})\n{}",
            indent_str(indent),
            self.offset,
            self.operand.plan(indent + 1)
        )
    }
}

macro_rules! binary_elementwise_view {
    ($name:ident, $plan:literal, $op:expr) => {
        #[derive(Debug, Clone)]
        pub struct $name {
            a: TensorRef,
            b: TensorRef,
        }

        impl $name {
            pub fn new(a: TensorRef, b: TensorRef) -> HappyMlResult<TensorRef> {
                if !same_shape(a.as_ref(), b.as_ref()) {
                    return Err(shape_mismatch(a.as_ref(), b.as_ref()));
                }
                Ok(Rc::new($name { a, b }))
            }
        }

        impl Tensor for $name {
            fn rows(&self) -> usize {
                self.a.rows()
            }
            fn cols(&self) -> usize {
                self.a.cols()
            }
            fn channels(&self) -> usize {
                self.a.channels()
            }
            fn value(&self, row: usize, col: usize, channel: usize) -> f32 {
                let op: fn(f32, f32) -> f32 = $op;
                op(self.a.value(row, col, channel), self.b.value(row, col, channel))
            }
            fn contains(&self, other: &TensorRef) -> bool {
                Rc::ptr_eq(&self.a, other)
                    || Rc::ptr_eq(&self.b, other)
                    || self.a.contains(other)
                    || self.b.contains(other)
            }
            fn plan(&self, indent: usize) -> String {
                format!(
                    "{}{}\n{}\n{}",
                    indent_str(indent),
                    $plan,
                    self.a.plan(indent + 1),
                    self.b.plan(indent + 1)
                )
            }
        }
    };
}

binary_elementwise_view!(AddView, "add", |a, b| a + b);
binary_elementwise_view!(SubView, "sub", |a, b| a - b);
binary_elementwise_view!(MulView, "mul", |a, b| a * b);

/// Elementwise select: `mask >= threshold ? if_ge : if_lt`.
#[derive(Debug, Clone)]
pub struct MaskedSelectView {
    mask: TensorRef,
    if_ge: TensorRef,
    if_lt: TensorRef,
    threshold: f32,
}

impl MaskedSelectView {
    pub fn new(
        mask: TensorRef,
        if_ge: TensorRef,
        if_lt: TensorRef,
        threshold: f32,
    ) -> HappyMlResult<TensorRef> {
        if !same_shape(mask.as_ref(), if_ge.as_ref()) {
            return Err(shape_mismatch(mask.as_ref(), if_ge.as_ref()));
        }
        if !same_shape(mask.as_ref(), if_lt.as_ref()) {
            return Err(shape_mismatch(mask.as_ref(), if_lt.as_ref()));
        }
        Ok(Rc::new(MaskedSelectView {
            mask,
            if_ge,
            if_lt,
            threshold,
        }))
    }
}

impl Tensor for MaskedSelectView {
    fn rows(&self) -> usize {
        self.mask.rows()
    }
    fn cols(&self) -> usize {
        self.mask.cols()
    }
    fn channels(&self) -> usize {
        self.mask.channels()
    }
    fn value(&self, row: usize, col: usize, channel: usize) -> f32 {
        if self.mask.value(row, col, channel) >= self.threshold {
            self.if_ge.value(row, col, channel)
        } else {
            self.if_lt.value(row, col, channel)
        }
    }
    fn contains(&self, other: &TensorRef) -> bool {
        Rc::ptr_eq(&self.mask, other)
            || Rc::ptr_eq(&self.if_ge, other)
            || Rc::ptr_eq(&self.if_lt, other)
            || self.mask.contains(other)
            || self.if_ge.contains(other)
            || self.if_lt.contains(other)
    }
    fn plan(&self, indent: usize) -> String {
        format!(
            "{}masked_select(threshold={})\n{}\n{}\n{}",
            indent_str(indent),
            self.threshold,
            self.mask.plan(indent + 1),
            self.if_ge.plan(indent + 1),
            self.if_lt.plan(indent + 1)
        )
    }
}

/// Collapses all channels into one chosen channel; the other channels read
/// as zero.
#[derive(Debug, Clone)]
pub struct SumToChannelView {
    operand: TensorRef,
    target: usize,
}

impl SumToChannelView {
    pub fn new(operand: TensorRef, target: usize) -> HappyMlResult<TensorRef> {
        if target >= operand.channels().max(1) {
            return Err(HappyMlError::IncompatibleShapes {
                expected: (operand.rows(), operand.cols(), operand.channels()),
                found: (operand.rows(), operand.cols(), target + 1),
            });
        }
        Ok(Rc::new(SumToChannelView { operand, target }))
    }
}

impl Tensor for SumToChannelView {
    fn rows(&self) -> usize {
        self.operand.rows()
    }
    fn cols(&self) -> usize {
        self.operand.cols()
    }
    fn channels(&self) -> usize {
        self.operand.channels()
    }
    fn value(&self, row: usize, col: usize, channel: usize) -> f32 {
        if channel != self.target {
            return 0.0;
        }
        (0..self.operand.channels())
            .map(|ch| self.operand.value(row, col, ch))
            .sum()
    }
    fn contains(&self, other: &TensorRef) -> bool {
        Rc::ptr_eq(&self.operand, other) || self.operand.contains(other)
    }
    fn plan(&self, indent: usize) -> String {
        format!(
            "{}sum_to_channel({})\n{}",
            indent_str(indent),
            self.target,
            self.operand.plan(indent + 1)
        )
    }
}

/// Collapses to a single channel at index 0.
#[derive(Debug, Clone)]
pub struct SumChannelsView {
    operand: TensorRef,
}

impl SumChannelsView {
    pub fn new(operand: TensorRef) -> TensorRef {
        Rc::new(SumChannelsView { operand })
    }
}

impl Tensor for SumChannelsView {
    fn rows(&self) -> usize {
        self.operand.rows()
    }
    fn cols(&self) -> usize {
        self.operand.cols()
    }
    fn channels(&self) -> usize {
        1
    }
    fn value(&self, row: usize, col: usize, _channel: usize) -> f32 {
        (0..self.operand.channels())
            .map(|ch| self.operand.value(row, col, ch))
            .sum()
    }
    fn contains(&self, other: &TensorRef) -> bool {
        Rc::ptr_eq(&self.operand, other) || self.operand.contains(other)
    }
    fn plan(&self, indent: usize) -> String {
        format!("{}sum_channels\n{}", indent_str(indent), self.operand.plan(indent + 1))
    }
}

/// `a.cols == b.rows`, channel counts equal; result is `(a.rows, b.cols,
/// channels)`. Per-channel matrix multiply.
#[derive(Debug, Clone)]
pub struct MatMulView {
    a: TensorRef,
    b: TensorRef,
}

impl MatMulView {
    pub fn new(a: TensorRef, b: TensorRef) -> HappyMlResult<TensorRef> {
        if a.cols() != b.rows() || a.channels() != b.channels() {
            return Err(shape_mismatch(a.as_ref(), b.as_ref()));
        }
        Ok(Rc::new(MatMulView { a, b }))
    }
}

impl Tensor for MatMulView {
    fn rows(&self) -> usize {
        self.a.rows()
    }
    fn cols(&self) -> usize {
        self.b.cols()
    }
    fn channels(&self) -> usize {
        self.a.channels()
    }
    fn value(&self, row: usize, col: usize, channel: usize) -> f32 {
        let mut acc = 0.0;
        for k in 0..self.a.cols() {
            acc += self.a.value(row, k, channel) * self.b.value(k, col, channel);
        }
        acc
    }
    fn contains(&self, other: &TensorRef) -> bool {
        Rc::ptr_eq(&self.a, other)
            || Rc::ptr_eq(&self.b, other)
            || self.a.contains(other)
            || self.b.contains(other)
    }
    fn plan(&self, indent: usize) -> String {
        format!(
            "{}matmul\n{}\n{}",
            indent_str(indent),
            self.a.plan(indent + 1),
            self.b.plan(indent + 1)
        )
    }
}

/// Single-channel valid cross-correlation: `out.rows = in.rows - k.rows +
/// 1`, same for cols. Layers loop this per input channel / output filter.
#[derive(Debug, Clone)]
pub struct Conv2dValidView {
    input: TensorRef,
    kernel: TensorRef,
}

impl Conv2dValidView {
    pub fn new(input: TensorRef, kernel: TensorRef) -> HappyMlResult<TensorRef> {
        if kernel.rows() > input.rows() || kernel.cols() > input.cols() {
            return Err(HappyMlError::KernelTooLarge {
                input: (input.rows(), input.cols()),
                kernel: (kernel.rows(), kernel.cols()),
            });
        }
        Ok(Rc::new(Conv2dValidView { input, kernel }))
    }
}

impl Tensor for Conv2dValidView {
    fn rows(&self) -> usize {
        self.input.rows() - self.kernel.rows() + 1
    }
    fn cols(&self) -> usize {
        self.input.cols() - self.kernel.cols() + 1
    }
    fn channels(&self) -> usize {
        1
    }
    fn value(&self, row: usize, col: usize, _channel: usize) -> f32 {
        let mut acc = 0.0;
        for kr in 0..self.kernel.rows() {
            for kc in 0..self.kernel.cols() {
                acc += self.input.value(row + kr, col + kc, 0) * self.kernel.value(kr, kc, 0);
            }
        }
        acc
    }
    fn contains(&self, other: &TensorRef) -> bool {
        Rc::ptr_eq(&self.input, other)
            || Rc::ptr_eq(&self.kernel, other)
            || self.input.contains(other)
            || self.kernel.contains(other)
    }
    fn plan(&self, indent: usize) -> String {
        format!(
            "{}conv2d_valid\n{}\n{}",
            indent_str(indent),
            self.input.plan(indent + 1),
            self.kernel.plan(indent + 1)
        )
    }
}

/// Zero-pads the input by `round((K-1)/2)` on each side, then a valid
/// cross-correlation.
#[derive(Debug, Clone)]
pub struct Conv2dFullView {
    inner: TensorRef,
}

impl Conv2dFullView {
    pub fn new(input: TensorRef, kernel: TensorRef) -> HappyMlResult<TensorRef> {
        let pad_rows = ((kernel.rows() as f32 - 1.0) / 2.0).round() as usize;
        let pad_cols = ((kernel.cols() as f32 - 1.0) / 2.0).round() as usize;
        let padded = ZeroPadView::new(input, pad_rows, pad_rows, pad_cols, pad_cols);
        let inner = Conv2dValidView::new(padded, kernel)?;
        Ok(Rc::new(Conv2dFullView { inner }))
    }
}

impl Tensor for Conv2dFullView {
    fn rows(&self) -> usize {
        self.inner.rows()
    }
    fn cols(&self) -> usize {
        self.inner.cols()
    }
    fn channels(&self) -> usize {
        1
    }
    fn value(&self, row: usize, col: usize, channel: usize) -> f32 {
        self.inner.value(row, col, channel)
    }
    fn contains(&self, other: &TensorRef) -> bool {
        Rc::ptr_eq(&self.inner, other) || self.inner.contains(other)
    }
    fn plan(&self, indent: usize) -> String {
        format!("{}conv2d_full\n{}", indent_str(indent), self.inner.plan(indent + 1))
    }
}

/// Full 2-D convolution: full cross-correlation with a 180-rotated kernel.
#[derive(Debug, Clone)]
pub struct Conv2dView {
    inner: TensorRef,
}

impl Conv2dView {
    pub fn new(input: TensorRef, kernel: TensorRef) -> HappyMlResult<TensorRef> {
        let rotated = Rotate180View::new(kernel);
        let inner = Conv2dFullView::new(input, rotated)?;
        Ok(Rc::new(Conv2dView { inner }))
    }
}

impl Tensor for Conv2dView {
    fn rows(&self) -> usize {
        self.inner.rows()
    }
    fn cols(&self) -> usize {
        self.inner.cols()
    }
    fn channels(&self) -> usize {
        1
    }
    fn value(&self, row: usize, col: usize, channel: usize) -> f32 {
        self.inner.value(row, col, channel)
    }
    fn contains(&self, other: &TensorRef) -> bool {
        Rc::ptr_eq(&self.inner, other) || self.inner.contains(other)
    }
    fn plan(&self, indent: usize) -> String {
        format!("{}conv2d\n{}", indent_str(indent), self.inner.plan(indent + 1))
    }
}

/// Independent top/bottom/left/right zero padding.
#[derive(Debug, Clone)]
pub struct ZeroPadView {
    operand: TensorRef,
    top: usize,
    bottom: usize,
    left: usize,
    right: usize,
}

impl ZeroPadView {
    pub fn new(operand: TensorRef, top: usize, bottom: usize, left: usize, right: usize) -> TensorRef {
        Rc::new(ZeroPadView {
            operand,
            top,
            bottom,
            left,
            right,
        })
    }
}

impl Tensor for ZeroPadView {
    fn rows(&self) -> usize {
        self.operand.rows() + self.top + self.bottom
    }
    fn cols(&self) -> usize {
        self.operand.cols() + self.left + self.right
    }
    fn channels(&self) -> usize {
        self.operand.channels()
    }
    fn value(&self, row: usize, col: usize, channel: usize) -> f32 {
        if row < self.top || col < self.left {
            return 0.0;
        }
        let r = row - self.top;
        let c = col - self.left;
        if r >= self.operand.rows() || c >= self.operand.cols() {
            return 0.0;
        }
        self.operand.value(r, c, channel)
    }
    fn contains(&self, other: &TensorRef) -> bool {
        Rc::ptr_eq(&self.operand, other) || self.operand.contains(other)
    }
    fn plan(&self, indent: usize) -> String {
        format!(
            "{}zero_pad(t={},b={},l={},r={})\n{}",
            indent_str(indent),
            self.top,
            self.bottom,
            self.left,
            self.right,
            self.operand.plan(indent + 1)
        )
    }
}

/// A column subrange `[start, start + len)`.
#[derive(Debug, Clone)]
pub struct WindowView {
    operand: TensorRef,
    start: usize,
    len: usize,
}

impl WindowView {
    pub fn new(operand: TensorRef, start: usize, len: usize) -> HappyMlResult<TensorRef> {
        if start + len > operand.cols() {
            return Err(HappyMlError::IncompatibleShapes {
                expected: (operand.rows(), operand.cols(), operand.channels()),
                found: (operand.rows(), start + len, operand.channels()),
            });
        }
        Ok(Rc::new(WindowView { operand, start, len }))
    }
}

impl Tensor for WindowView {
    fn rows(&self) -> usize {
        self.operand.rows()
    }
    fn cols(&self) -> usize {
        self.len
    }
    fn channels(&self) -> usize {
        self.operand.channels()
    }
    fn value(&self, row: usize, col: usize, channel: usize) -> f32 {
        self.operand.value(row, col + self.start, channel)
    }
    fn contains(&self, other: &TensorRef) -> bool {
        Rc::ptr_eq(&self.operand, other) || self.operand.contains(other)
    }
    fn plan(&self, indent: usize) -> String {
        format!(
            "{}window(start={}, len={})\n{}",
            indent_str(indent),
            self.start,
            self.len,
            self.operand.plan(indent + 1)
        )
    }
}

/// Column-wise concatenation of operands sharing rows and channels.
#[derive(Debug, Clone)]
pub struct ConcatWideView {
    operands: Vec<TensorRef>,
    offsets: Vec<usize>,
    total_cols: usize,
}

impl ConcatWideView {
    pub fn new(operands: Vec<TensorRef>) -> HappyMlResult<TensorRef> {
        let first = operands
            .first()
            .ok_or(HappyMlError::EmptyBatch)?
            .clone();
        for op in &operands[1..] {
            if op.rows() != first.rows() || op.channels() != first.channels() {
                return Err(shape_mismatch(first.as_ref(), op.as_ref()));
            }
        }
        let mut offsets = Vec::with_capacity(operands.len());
        let mut total = 0usize;
        for op in &operands {
            offsets.push(total);
            total += op.cols();
        }
        Ok(Rc::new(ConcatWideView {
            operands,
            offsets,
            total_cols: total,
        }))
    }
}

impl Tensor for ConcatWideView {
    fn rows(&self) -> usize {
        self.operands[0].rows()
    }
    fn cols(&self) -> usize {
        self.total_cols
    }
    fn channels(&self) -> usize {
        self.operands[0].channels()
    }
    fn value(&self, row: usize, col: usize, channel: usize) -> f32 {
        let idx = match self.offsets.binary_search(&col) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let local_col = col - self.offsets[idx];
        self.operands[idx].value(row, local_col, channel)
    }
    fn contains(&self, other: &TensorRef) -> bool {
        self.operands
            .iter()
            .any(|op| Rc::ptr_eq(op, other) || op.contains(other))
    }
    fn plan(&self, indent: usize) -> String {
        let mut s = format!("{}concat_wide", indent_str(indent));
        for op in &self.operands {
            s.push('\n');
            s.push_str(&op.plan(indent + 1));
        }
        s
    }
}
