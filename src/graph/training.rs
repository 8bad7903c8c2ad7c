//! Mini-batch training driver (spec section 4.3): shuffle, accumulate
//! per-output `(truth, prediction)` pairs, sum per-sample errors through the
//! loss function at batch boundaries, and drive `backward`.

use super::exit_strategy::ExitStrategy;
use super::NetworkGraph;
use crate::errors::HappyMlResult;
use crate::tensor::views::{AddView, MulScalarView};
use crate::tensor::TensorRef;
use crate::types::NodeId;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashMap;
use std::time::Instant;

pub type Sample = (HashMap<NodeId, TensorRef>, HashMap<NodeId, TensorRef>);

pub struct TrainingConfig {
    pub batch_size: usize,
    pub shuffle_seed: u64,
}

/// Runs epochs until the exit strategy signals done. `samples` is
/// `(inputs, truths)` pairs, truths keyed by output node id.
pub fn train(
    graph: &mut NetworkGraph,
    samples: &mut [Sample],
    config: &TrainingConfig,
    exit_strategy: &mut dyn ExitStrategy,
) -> HappyMlResult<()> {
    let started = Instant::now();
    let mut rng = StdRng::seed_from_u64(config.shuffle_seed);
    let mut epoch: u64 = 0;

    loop {
        samples.shuffle(&mut rng);

        let mut pending: HashMap<NodeId, Vec<(TensorRef, TensorRef)>> = HashMap::new();
        let mut epoch_loss_sum = 0.0f32;
        let mut epoch_loss_count = 0u32;

        for (batch_index, (inputs, truths)) in samples.iter().enumerate() {
            let predictions = graph.forward(inputs, true)?;
            for (output_id, truth) in truths {
                pending
                    .entry(*output_id)
                    .or_default()
                    .push((truth.clone(), predictions[output_id].clone()));
            }

            let is_last = batch_index + 1 == samples.len();
            let batch_full = pending.values().next().map(|v| v.len()).unwrap_or(0) >= config.batch_size;
            if batch_full || is_last {
                let mut output_errors = HashMap::new();
                for (output_id, pairs) in pending.iter() {
                    if pairs.is_empty() {
                        continue;
                    }
                    let batch_len = pairs.len();
                    let mut loss_sum = 0.0f32;
                    let mut derivative_sum: Option<TensorRef> = None;
                    for (truth, prediction) in pairs {
                        loss_sum += graph.loss().compute(prediction, truth)?;
                        let d = graph.loss().derivative(prediction, truth)?;
                        derivative_sum = Some(match derivative_sum {
                            Some(acc) => AddView::new(acc, d)?,
                            None => d,
                        });
                    }
                    epoch_loss_sum += loss_sum;
                    epoch_loss_count += batch_len as u32;
                    let scaled = MulScalarView::new(
                        derivative_sum.expect("pairs is non-empty"),
                        1.0 / batch_len as f32,
                    );
                    output_errors.insert(*output_id, scaled);
                }
                graph.backward(&output_errors)?;
                tracing::info!(epoch, batch_index, "training batch complete");
                for v in pending.values_mut() {
                    v.clear();
                }
            }
        }

        let mean_loss = if epoch_loss_count > 0 {
            epoch_loss_sum / epoch_loss_count as f32
        } else {
            f32::INFINITY
        };
        let elapsed = started.elapsed();
        if exit_strategy.is_done(epoch, mean_loss, elapsed) {
            break;
        }
        epoch += 1;
    }

    Ok(())
}
