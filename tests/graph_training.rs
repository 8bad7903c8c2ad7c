use happyml::builder::{LayerOptions, LossKind, NetworkBuilder, OptimizerKind};
use happyml::graph::exit_strategy::DefaultExitStrategy;
use happyml::graph::training::{train, Sample, TrainingConfig};
use happyml::layers::activation::ActivationKind;
use happyml::tensor::leaves::F32Tensor;
use happyml::types::NodeId;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

fn xor_samples(output: NodeId) -> Vec<Sample> {
    [(0.0, 0.0, 0.0), (0.0, 1.0, 1.0), (1.0, 0.0, 1.0), (1.0, 1.0, 0.0)]
        .into_iter()
        .map(|(a, b, y)| {
            let mut inputs = HashMap::new();
            inputs.insert(
                NodeId(0),
                Rc::new(F32Tensor::from_channel_major(1, 2, 1, vec![a, b]).unwrap()) as happyml::TensorRef,
            );
            let mut truths = HashMap::new();
            truths.insert(
                output,
                Rc::new(F32Tensor::from_channel_major(1, 1, 1, vec![y]).unwrap()) as happyml::TensorRef,
            );
            (inputs, truths)
        })
        .collect()
}

#[test]
fn training_reduces_mean_squared_error_on_xor() {
    let mut builder = NetworkBuilder::new(OptimizerKind::MicroBatch, 0.7)
        .with_model_name("xorNet")
        .with_loss(LossKind::Mse);
    let input = builder.add_input();
    let hidden = builder.add_dense(input, 2, 4, ActivationKind::Sigmoid, LayerOptions { seed: 1, ..Default::default() });
    let output = builder.add_dense(hidden, 4, 1, ActivationKind::Sigmoid, LayerOptions { seed: 2, ..Default::default() });
    builder.mark_output(output);
    let mut graph = builder.build().unwrap();

    let mut samples = xor_samples(output);
    let initial_loss = {
        let mut total = 0.0;
        for (inputs, truths) in &samples {
            let predictions = graph.forward(inputs, false).unwrap();
            total += graph.loss().compute(&predictions[&output], &truths[&output]).unwrap();
        }
        total / samples.len() as f32
    };

    let config = TrainingConfig { batch_size: 4, shuffle_seed: 3 };
    let mut exit_strategy = DefaultExitStrategy::new(50, 400, Duration::from_secs(30), 60);
    train(&mut graph, &mut samples, &config, &mut exit_strategy).unwrap();

    let final_loss = {
        let mut total = 0.0;
        for (inputs, truths) in &samples {
            let predictions = graph.forward(inputs, false).unwrap();
            total += graph.loss().compute(&predictions[&output], &truths[&output]).unwrap();
        }
        total / samples.len() as f32
    };

    assert!(final_loss < initial_loss, "expected {final_loss} < {initial_loss}");
}

#[test]
fn forward_without_a_required_head_input_is_a_typed_error() {
    let mut builder = NetworkBuilder::new(OptimizerKind::MicroBatch, 0.1).with_model_name("incomplete");
    let input = builder.add_input();
    builder.mark_output(input);
    let mut graph = builder.build().unwrap();
    let empty = HashMap::new();
    assert!(matches!(graph.forward(&empty, false), Err(happyml::HappyMlError::GraphError(_))));
}
