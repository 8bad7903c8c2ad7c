use happyml::tensor::leaves::{F32Tensor, XavierTensor};
use happyml::tensor::views::{AddView, DiagonalView, MatMulView};
use happyml::tensor::{materialize, Tensor};
use happyml::types::BitWidth;
use happyml::HappyMlError;
use std::rc::Rc;

#[test]
fn matmul_rejects_incompatible_inner_dimensions() {
    let a: happyml::TensorRef = Rc::new(F32Tensor::from_channel_major(1, 2, 1, vec![1.0, 2.0]).unwrap());
    let b: happyml::TensorRef = Rc::new(F32Tensor::from_channel_major(3, 1, 1, vec![1.0, 2.0, 3.0]).unwrap());
    assert!(matches!(MatMulView::new(a, b), Err(HappyMlError::IncompatibleShapes { .. })));
}

#[test]
fn add_view_rejects_mismatched_shapes() {
    let a: happyml::TensorRef = Rc::new(F32Tensor::from_channel_major(1, 2, 1, vec![1.0, 2.0]).unwrap());
    let b: happyml::TensorRef = Rc::new(F32Tensor::from_channel_major(1, 3, 1, vec![1.0, 2.0, 3.0]).unwrap());
    assert!(matches!(AddView::new(a, b), Err(HappyMlError::IncompatibleShapes { .. })));
}

#[test]
fn diagonal_view_expands_a_single_row_into_a_square_matrix() {
    let row: happyml::TensorRef = Rc::new(F32Tensor::from_channel_major(1, 3, 1, vec![1.0, 2.0, 3.0]).unwrap());
    let square = DiagonalView::new(row, 0);
    assert_eq!(square.shape(), (3, 3, 1));
    assert_eq!(square.value(0, 0, 0), 1.0);
    assert_eq!(square.value(1, 1, 0), 2.0);
    assert_eq!(square.value(2, 2, 0), 3.0);
    assert_eq!(square.value(0, 1, 0), 0.0);
}

#[test]
fn diagonal_view_extracts_the_diagonal_from_a_multi_row_matrix() {
    let matrix: happyml::TensorRef =
        Rc::new(F32Tensor::from_channel_major(2, 2, 1, vec![1.0, 2.0, 3.0, 4.0]).unwrap());
    let diag = DiagonalView::new(matrix, 0);
    assert_eq!(diag.shape(), (1, 2, 1));
    assert_eq!(diag.value(0, 0, 0), 1.0);
    assert_eq!(diag.value(0, 1, 0), 4.0);
}

#[test]
fn materialize_at_32_bits_is_a_pass_through_for_f32_leaves() {
    let leaf: happyml::TensorRef = Rc::new(F32Tensor::from_channel_major(1, 2, 1, vec![1.5, -2.5]).unwrap());
    let materialized = materialize(&leaf, BitWidth::Bits32).unwrap();
    assert!(Rc::ptr_eq(&leaf, &materialized));
}

#[test]
fn materialize_at_16_bits_rounds_but_preserves_shape_and_sign() {
    let leaf: happyml::TensorRef = Rc::new(F32Tensor::from_channel_major(1, 2, 1, vec![1.0 / 3.0, -4.0]).unwrap());
    let materialized = materialize(&leaf, BitWidth::Bits16).unwrap();
    assert_eq!(materialized.shape(), (1, 2, 1));
    assert!((materialized.value(0, 0, 0) - 1.0 / 3.0).abs() < 1e-3);
    assert_eq!(materialized.value(0, 1, 0), -4.0);
}

#[test]
fn materialize_at_8_bits_keeps_values_inside_the_chosen_quarter_range() {
    let leaf: happyml::TensorRef = Rc::new(F32Tensor::from_channel_major(1, 3, 1, vec![0.1, 0.5, 0.9]).unwrap());
    let materialized = materialize(&leaf, BitWidth::Bits8).unwrap();
    for i in 0..3 {
        assert!((materialized.value(0, i, 0) - leaf.value(0, i, 0)).abs() < 0.2);
    }
}

#[test]
fn xavier_init_is_deterministic_for_a_fixed_seed() {
    let a = XavierTensor::new(4, 4, 1, 42);
    let b = XavierTensor::new(4, 4, 1, 42);
    for r in 0..4 {
        for c in 0..4 {
            assert_eq!(a.value(r, c, 0), b.value(r, c, 0));
        }
    }
}
