//! Hyperparameter search, in scope only at the interface level (spec
//! section 1): successive halving over `NetworkBuilder` configurations,
//! training each surviving arm through the public `NetworkGraph`/
//! `ExitStrategy` interfaces and ranking by validation loss. The
//! halving heuristics themselves are deliberately simple; this module
//! exists to exercise the engine end to end, not to reproduce
//! `original_source/src/ml/hyperband_random_search.hpp`'s search-space
//! sampling.

use crate::builder::NetworkBuilder;
use crate::errors::{HappyMlError, HappyMlResult};
use crate::graph::exit_strategy::ExitStrategy;
use crate::graph::training::{train, Sample, TrainingConfig};
use crate::graph::NetworkGraph;
use std::collections::HashSet;

/// One candidate configuration. `factory` rebuilds a fresh, untrained
/// `NetworkBuilder` every round since a `NetworkGraph` owns its optimizer
/// state and cannot be rewound.
pub struct Arm {
    pub label: String,
    pub factory: Box<dyn Fn() -> NetworkBuilder>,
}

pub struct HyperbandSearch {
    arms: Vec<Arm>,
    /// Fraction of arms kept after each round, e.g. 1/3.
    keep_fraction: f32,
}

impl HyperbandSearch {
    pub fn new(arms: Vec<Arm>, keep_fraction: f32) -> Self {
        HyperbandSearch { arms, keep_fraction: keep_fraction.clamp(0.01, 1.0) }
    }

    /// Runs up to `rounds` successive-halving rounds, training every
    /// surviving arm for one training-driver pass per round, then keeping
    /// the top `keep_fraction` by validation loss. Returns the winning
    /// arm's label.
    pub fn run(
        &self,
        rounds: usize,
        training_samples: &mut [Sample],
        validation_samples: &mut [Sample],
        training_config: &TrainingConfig,
        mut make_exit_strategy: impl FnMut() -> Box<dyn ExitStrategy>,
    ) -> HappyMlResult<String> {
        if self.arms.is_empty() {
            return Err(HappyMlError::GraphError("hyperband search has no arms".into()));
        }

        let mut survivors: Vec<&Arm> = self.arms.iter().collect();

        for round in 0..rounds {
            if survivors.len() <= 1 {
                break;
            }

            let mut scored: Vec<(String, f32)> = Vec::with_capacity(survivors.len());
            for arm in &survivors {
                let mut graph = (arm.factory)().build()?;
                let mut exit_strategy = make_exit_strategy();
                train(&mut graph, training_samples, training_config, exit_strategy.as_mut())?;
                let loss = evaluate(&mut graph, validation_samples)?;
                tracing::info!(round, arm = %arm.label, loss, "hyperband arm evaluated");
                scored.push((arm.label.clone(), loss));
            }

            scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
            let keep = ((survivors.len() as f32 * self.keep_fraction).ceil() as usize).max(1);
            let kept_labels: HashSet<String> = scored.into_iter().take(keep).map(|(label, _)| label).collect();
            survivors.retain(|arm| kept_labels.contains(&arm.label));
        }

        survivors
            .into_iter()
            .next()
            .map(|arm| arm.label.clone())
            .ok_or_else(|| HappyMlError::GraphError("hyperband search eliminated every arm".into()))
    }
}

fn evaluate(graph: &mut NetworkGraph, validation_samples: &[Sample]) -> HappyMlResult<f32> {
    let mut total = 0.0f32;
    let mut count = 0u32;
    for (inputs, truths) in validation_samples {
        let predictions = graph.forward(inputs, false)?;
        for (output_id, truth) in truths {
            total += graph.loss().compute(&predictions[output_id], truth)?;
            count += 1;
        }
    }
    Ok(if count == 0 { f32::INFINITY } else { total / count as f32 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{LayerOptions, LossKind, OptimizerKind};
    use crate::graph::exit_strategy::DefaultExitStrategy;
    use crate::layers::activation::ActivationKind;
    use crate::tensor::leaves::F32Tensor;
    use crate::types::NodeId;
    use std::collections::HashMap;
    use std::rc::Rc;
    use std::time::Duration;

    fn xor_samples() -> Vec<Sample> {
        [(0.0, 0.0, 0.0), (0.0, 1.0, 1.0), (1.0, 0.0, 1.0), (1.0, 1.0, 0.0)]
            .into_iter()
            .map(|(a, b, y)| {
                let mut inputs: HashMap<NodeId, crate::tensor::TensorRef> = HashMap::new();
                inputs.insert(NodeId(0), Rc::new(F32Tensor::from_channel_major(1, 2, 1, vec![a, b]).unwrap()));
                let mut truths: HashMap<NodeId, crate::tensor::TensorRef> = HashMap::new();
                truths.insert(NodeId(6), Rc::new(F32Tensor::from_channel_major(1, 1, 1, vec![y]).unwrap()));
                (inputs, truths)
            })
            .collect()
    }

    fn arm(label: &str, hidden_width: usize) -> Arm {
        let label = label.to_string();
        Arm {
            label: label.clone(),
            factory: Box::new(move || {
                let mut builder = NetworkBuilder::new(OptimizerKind::MicroBatch, 0.5).with_model_name("xorNet");
                let input = builder.add_input();
                let hidden = builder.add_dense(input, 2, hidden_width, ActivationKind::Sigmoid, LayerOptions::default());
                let output = builder.add_dense(hidden, hidden_width, 1, ActivationKind::Sigmoid, LayerOptions::default());
                builder.mark_output(output);
                builder
            }),
        }
    }

    #[test]
    fn search_picks_a_surviving_arm() {
        let search = HyperbandSearch::new(vec![arm("narrow", 2), arm("wide", 8)], 0.5);
        let mut training = xor_samples();
        let mut validation = xor_samples();
        let config = TrainingConfig { batch_size: 4, shuffle_seed: 7 };
        let winner = search
            .run(1, &mut training, &mut validation, &config, || {
                Box::new(DefaultExitStrategy::new(0, 2, Duration::from_secs(5), 10))
            })
            .unwrap();
        assert!(winner == "narrow" || winner == "wide");
    }

    #[test]
    fn empty_pool_is_reported_as_a_typed_error() {
        let search = HyperbandSearch::new(Vec::new(), 0.5);
        let mut training = xor_samples();
        let mut validation = xor_samples();
        let config = TrainingConfig { batch_size: 4, shuffle_seed: 1 };
        let result = search.run(1, &mut training, &mut validation, &config, || {
            Box::new(DefaultExitStrategy::new(0, 1, Duration::from_secs(1), 1))
        });
        assert!(matches!(result, Err(HappyMlError::GraphError(_))));
    }
}
