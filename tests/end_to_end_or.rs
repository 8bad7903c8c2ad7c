use happyml::builder::{LayerOptions, LossKind, NetworkBuilder, OptimizerKind};
use happyml::graph::exit_strategy::DefaultExitStrategy;
use happyml::graph::training::{train, Sample, TrainingConfig};
use happyml::layers::activation::ActivationKind;
use happyml::tensor::leaves::F32Tensor;
use happyml::types::NodeId;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

fn scratch_dir(label: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("happyml_end_to_end_{label}"));
    let _ = std::fs::create_dir_all(&dir);
    dir
}

fn build_or_net(seed: u64) -> (NetworkBuilder, NodeId, NodeId) {
    let mut builder = NetworkBuilder::new(OptimizerKind::SgdMomentum { demon: false }, 0.5)
        .with_model_name("orNet")
        .with_loss(LossKind::BinaryCrossEntropy);
    let input = builder.add_input();
    let output = builder.add_dense(
        input,
        2,
        1,
        ActivationKind::Sigmoid,
        LayerOptions { seed, ..Default::default() },
    );
    builder.mark_output(output);
    (builder, input, output)
}

fn or_samples(input: NodeId, output: NodeId) -> Vec<Sample> {
    [(0.0, 0.0, 0.0), (0.0, 1.0, 1.0), (1.0, 0.0, 1.0), (1.0, 1.0, 1.0)]
        .into_iter()
        .map(|(a, b, y)| {
            let mut inputs = HashMap::new();
            inputs.insert(input, Rc::new(F32Tensor::from_channel_major(1, 2, 1, vec![a, b]).unwrap()) as happyml::TensorRef);
            let mut truths = HashMap::new();
            truths.insert(output, Rc::new(F32Tensor::from_channel_major(1, 1, 1, vec![y]).unwrap()) as happyml::TensorRef);
            (inputs, truths)
        })
        .collect()
}

#[test]
fn or_network_is_linearly_separable_and_learns_to_near_zero_loss() {
    let (builder, input, output) = build_or_net(3);
    let mut graph = builder.build().unwrap();
    let mut samples = or_samples(input, output);

    let config = TrainingConfig { batch_size: 4, shuffle_seed: 9 };
    let mut exit_strategy = DefaultExitStrategy::new(50, 600, Duration::from_secs(30), 80).with_zero_tolerance(0.05);
    train(&mut graph, &mut samples, &config, &mut exit_strategy).unwrap();

    for (inputs, truths) in &samples {
        let prediction = graph.forward(inputs, false).unwrap()[&output].value(0, 0, 0);
        let expected = truths[&output].value(0, 0, 0);
        assert!((prediction - expected).abs() < 0.25, "prediction {prediction} expected {expected}");
    }
}

#[test]
fn or_network_reload_preserves_learned_weights_on_disk() {
    let (builder, input, output) = build_or_net(7);
    let mut graph = builder.build().unwrap();
    let mut samples = or_samples(input, output);
    let config = TrainingConfig { batch_size: 4, shuffle_seed: 1 };
    let mut exit_strategy = DefaultExitStrategy::new(30, 300, Duration::from_secs(30), 60);
    train(&mut graph, &mut samples, &config, &mut exit_strategy).unwrap();

    let dir = scratch_dir("or");
    graph.save_parameters(&dir).unwrap();

    let (fresh_builder, fresh_input, fresh_output) = build_or_net(1234);
    let mut fresh_graph = fresh_builder.build().unwrap();
    fresh_graph.load_parameters(&dir).unwrap();

    for (inputs, _) in &samples {
        let mut remapped = HashMap::new();
        remapped.insert(fresh_input, inputs[&input].clone());
        let before = graph.forward(inputs, false).unwrap()[&output].value(0, 0, 0);
        let after = fresh_graph.forward(&remapped, false).unwrap()[&fresh_output].value(0, 0, 0);
        assert!((before - after).abs() < 1e-5);
    }
}
