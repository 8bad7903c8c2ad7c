//! Arena of layer nodes keyed by stable integer ids (DESIGN NOTES §9),
//! generalized from a single-output tape to the multi-input/multi-output
//! join/fan-out DAG spec section 4.3 requires.

pub mod exit_strategy;
pub mod node;
pub mod persistence;
pub mod training;

use crate::errors::{HappyMlError, HappyMlResult};
use crate::loss::Loss;
use crate::optim::Optimizer;
use crate::tensor::views::{AddView, ClipView, MulScalarView};
use crate::tensor::{materialize, TensorRef};
use crate::types::NodeId;
use node::GraphNode;
use std::collections::{HashMap, VecDeque};

pub struct NetworkGraph {
    pub(crate) nodes: Vec<GraphNode>,
    pub(crate) loss: Box<dyn Loss>,
    pub(crate) optimizer: Box<dyn Optimizer>,
}

impl NetworkGraph {
    pub fn new(nodes: Vec<GraphNode>, loss: Box<dyn Loss>, optimizer: Box<dyn Optimizer>) -> Self {
        NetworkGraph { nodes, loss, optimizer }
    }

    fn node(&self, id: NodeId) -> &GraphNode {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut GraphNode {
        &mut self.nodes[id.0]
    }

    /// Runs a single sample forward. `inputs` supplies one tensor per head
    /// (`is_input`) node; returns one tensor per output node.
    pub fn forward(&mut self, inputs: &HashMap<NodeId, TensorRef>, for_training: bool) -> HappyMlResult<HashMap<NodeId, TensorRef>> {
        for node in &mut self.nodes {
            node.clear_traversal_state();
        }

        let mut queue: VecDeque<NodeId> = VecDeque::new();
        let mut outputs = HashMap::new();

        for node in &self.nodes {
            if node.is_input {
                queue.push_back(node.id);
            }
        }

        while let Some(id) = queue.pop_front() {
            tracing::trace!(node = id.0, "forward");
            let node_inputs: Vec<TensorRef> = if self.node(id).is_input {
                let provided = inputs.get(&id).cloned().ok_or_else(|| {
                    HappyMlError::GraphError(format!("no forward input supplied for head node {id}"))
                })?;
                vec![provided]
            } else {
                self.node(id)
                    .inputs
                    .iter()
                    .map(|p| self.node(id).forward_slots.get(p).cloned().expect("join semantics guarantee this slot is populated"))
                    .collect()
            };

            if for_training {
                self.node_mut(id).training_queue.push(node_inputs.clone());
            }

            let raw = self.node_mut(id).layer.forward(&node_inputs, for_training)?;
            let result = match self.node(id).materialized {
                Some(bits) => materialize(&raw, bits)?,
                None => raw,
            };

            if self.node(id).is_output {
                outputs.insert(id, result.clone());
            }

            let successors = self.node(id).outputs.clone();
            for succ in successors {
                self.node_mut(succ).forward_slots.insert(id, result.clone());
                if self.node(succ).forward_ready() && !queue.contains(&succ) {
                    queue.push_back(succ);
                }
            }
        }

        Ok(outputs)
    }

    /// Pushes one loss gradient per output node and drives errors back to
    /// every layer, applying optimizer updates as each node's `backward`
    /// resolves (spec section 4.3).
    #[tracing::instrument(skip(self, output_errors))]
    pub fn backward(&mut self, output_errors: &HashMap<NodeId, TensorRef>) -> HappyMlResult<()> {
        let mut queue: VecDeque<NodeId> = VecDeque::new();
        for node in &mut self.nodes {
            node.backward_slots.clear();
        }
        for id in output_errors.keys() {
            queue.push_back(*id);
        }

        while let Some(id) = queue.pop_front() {
            let incoming_error = if self.node(id).is_output {
                output_errors.get(&id).cloned().expect("output ids seeded the queue")
            } else {
                let fan_out = self.node(id).outputs.len().max(1);
                let values: Vec<TensorRef> = self.node(id).backward_slots.values().cloned().collect();
                average_tensors(&values, fan_out)?
            };

            let clipped = if self.node(id).use_norm_clipping {
                let threshold = self.node(id).clip_threshold;
                ClipView::new(incoming_error, -threshold, threshold)
            } else {
                incoming_error
            };

            let materialized_error = match self.node(id).materialized {
                Some(bits) => materialize(&clipped, bits)?,
                None => clipped,
            };

            let queue_snapshot = self.node(id).training_queue.clone();
            let input_errors = self.node_mut(id).layer.backward(&queue_snapshot, &materialized_error)?;
            self.nodes[id.0].layer.update(self.optimizer.as_mut())?;
            self.node_mut(id).training_queue.clear();

            let predecessors = self.node(id).inputs.clone();
            for (pred, err) in predecessors.into_iter().zip(input_errors.into_iter()) {
                self.node_mut(pred).backward_slots.insert(id, err);
                if self.node(pred).backward_ready() {
                    queue.push_back(pred);
                }
            }
        }

        Ok(())
    }

    pub fn loss(&self) -> &dyn Loss {
        self.loss.as_ref()
    }

    /// Writes every node's parameters into `dir` (spec section 6: "pulls
    /// parameter tensors from disk"). Architecture is not re-derived here —
    /// callers rebuild the same graph shape through `NetworkBuilder` and
    /// restore the learned values with `load_parameters`.
    pub fn save_parameters(&self, dir: &std::path::Path) -> HappyMlResult<()> {
        std::fs::create_dir_all(dir).map_err(|e| HappyMlError::io(dir, e))?;
        for node in &self.nodes {
            node.layer.save(dir, node.id.0)?;
        }
        Ok(())
    }

    pub fn load_parameters(&mut self, dir: &std::path::Path) -> HappyMlResult<()> {
        for node in &mut self.nodes {
            node.layer.load(dir, node.id.0)?;
        }
        Ok(())
    }
}

fn average_tensors(values: &[TensorRef], fan_out: usize) -> HappyMlResult<TensorRef> {
    let mut iter = values.iter().cloned();
    let first = iter.next().expect("backward_ready guarantees at least one slot");
    let summed = iter.try_fold(first, |acc, next| AddView::new(acc, next))?;
    Ok(MulScalarView::new(summed, 1.0 / fan_out as f32))
}
