use happyml::layers::activation::{Activation, ActivationKind};
use happyml::layers::fully_connected::FullyConnected;
use happyml::layers::{Layer, TrainingQueue};
use happyml::optim::micro_batch::MicroBatchOptimizer;
use happyml::tensor::leaves::F32Tensor;
use happyml::types::BitWidth;
use std::rc::Rc;

const EPSILON: f32 = 1e-3;

#[test]
fn fully_connected_input_error_matches_the_weight_matrix_for_a_unit_output_error() {
    let mut opt = MicroBatchOptimizer::new(0.1);
    let weights: happyml::TensorRef =
        Rc::new(F32Tensor::from_channel_major(2, 1, 1, vec![0.3, -0.7]).unwrap());
    let mut layer = FullyConnected::new(weights, BitWidth::Bits32, &mut opt);

    let input: happyml::TensorRef =
        Rc::new(F32Tensor::from_channel_major(1, 2, 1, vec![1.0, 2.0]).unwrap());
    layer.forward(&[input.clone()], true).unwrap();

    let mut queue = TrainingQueue::new();
    queue.push(vec![input]);
    let output_error: happyml::TensorRef = Rc::new(F32Tensor::from_channel_major(1, 1, 1, vec![1.0]).unwrap());
    let input_errors = layer.backward(&queue, &output_error).unwrap();

    // d(input . W)/d(input_i) = W_i when the output error is 1.
    assert!((input_errors[0].value(0, 0, 0) - 0.3).abs() < 1e-6);
    assert!((input_errors[0].value(0, 1, 0) - (-0.7)).abs() < 1e-6);
}

#[test]
fn sigmoid_activation_gradient_matches_finite_difference() {
    let perturb = |x: f32| -> f32 {
        let mut layer = Activation::new(ActivationKind::Sigmoid);
        let input: happyml::TensorRef = Rc::new(F32Tensor::from_channel_major(1, 1, 1, vec![x]).unwrap());
        layer.forward(&[input], false).unwrap().value(0, 0, 0)
    };

    let x = 0.4f32;
    let numeric_derivative = (perturb(x + EPSILON) - perturb(x - EPSILON)) / (2.0 * EPSILON);

    let mut layer = Activation::new(ActivationKind::Sigmoid);
    let input: happyml::TensorRef = Rc::new(F32Tensor::from_channel_major(1, 1, 1, vec![x]).unwrap());
    layer.forward(&[input.clone()], true).unwrap();
    let mut queue = TrainingQueue::new();
    queue.push(vec![input]);
    let output_error: happyml::TensorRef = Rc::new(F32Tensor::from_channel_major(1, 1, 1, vec![1.0]).unwrap());
    let input_errors = layer.backward(&queue, &output_error).unwrap();

    assert!((input_errors[0].value(0, 0, 0) - numeric_derivative).abs() < 1e-3);
}

#[test]
fn tanh_activation_gradient_matches_finite_difference() {
    let perturb = |x: f32| -> f32 {
        let mut layer = Activation::new(ActivationKind::Tanh);
        let input: happyml::TensorRef = Rc::new(F32Tensor::from_channel_major(1, 1, 1, vec![x]).unwrap());
        layer.forward(&[input], false).unwrap().value(0, 0, 0)
    };

    let x = -0.6f32;
    let numeric_derivative = (perturb(x + EPSILON) - perturb(x - EPSILON)) / (2.0 * EPSILON);

    let mut layer = Activation::new(ActivationKind::Tanh);
    let input: happyml::TensorRef = Rc::new(F32Tensor::from_channel_major(1, 1, 1, vec![x]).unwrap());
    layer.forward(&[input.clone()], true).unwrap();
    let mut queue = TrainingQueue::new();
    queue.push(vec![input]);
    let output_error: happyml::TensorRef = Rc::new(F32Tensor::from_channel_major(1, 1, 1, vec![1.0]).unwrap());
    let input_errors = layer.backward(&queue, &output_error).unwrap();

    assert!((input_errors[0].value(0, 0, 0) - numeric_derivative).abs() < 1e-3);
}
