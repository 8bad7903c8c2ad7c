//! Declarative network assembly (spec section 6), grounded in the teacher's
//! fluent `GraphBuilder` (`graph::dsl::GraphBuilder`): a thin wrapper that
//! owns the arena being built and hands back `NodeId`s so callers can wire
//! layers together without touching `GraphNode` bookkeeping directly.

use crate::errors::{HappyMlError, HappyMlResult};
use crate::graph::node::GraphNode;
use crate::graph::NetworkGraph;
use crate::layers::activation::{Activation, ActivationKind};
use crate::layers::bias::Bias;
use crate::layers::concat_wide::ConcatWide;
use crate::layers::convolution2d::Convolution2dValid;
use crate::layers::dropout::Dropout;
use crate::layers::flatten::Flatten;
use crate::layers::fully_connected::FullyConnected;
use crate::layers::normalization::Normalization;
use crate::layers::Layer;
use crate::loss::{BinaryCrossEntropy, CategoricalCrossEntropy, Loss, Mse};
use crate::optim::adam::AdamOptimizer;
use crate::optim::micro_batch::MicroBatchOptimizer;
use crate::optim::sgdm::SgdMomentumOptimizer;
use crate::optim::Optimizer;
use crate::tensor::leaves::{UniformTensor, XavierTensor};
use crate::tensor::TensorRef;
use crate::types::{BitWidth, NodeId};
use std::path::PathBuf;
use std::rc::Rc;

#[derive(Debug, Clone, Copy)]
pub enum OptimizerKind {
    Adam,
    MicroBatch,
    SgdMomentum { demon: bool },
}

#[derive(Debug, Clone, Copy)]
pub enum LossKind {
    Mse,
    BinaryCrossEntropy,
    CategoricalCrossEntropy,
}

/// Per-layer knobs the builder exposes (spec section 6: "set per-layer bit
/// width, bias, L2, normalization, clipping, dropout rate").
#[derive(Debug, Clone, Copy)]
pub struct LayerOptions {
    pub bits: BitWidth,
    pub use_bias: bool,
    pub seed: u64,
}

impl Default for LayerOptions {
    fn default() -> Self {
        LayerOptions { bits: BitWidth::Bits32, use_bias: true, seed: 0 }
    }
}

pub struct NetworkBuilder {
    optimizer_kind: OptimizerKind,
    optimizer: Box<dyn Optimizer>,
    learning_rate: f32,
    bias_learning_rate: f32,
    loss_kind: LossKind,
    model_name: String,
    repo_root: PathBuf,
    nodes: Vec<GraphNode>,
}

impl NetworkBuilder {
    pub fn new(optimizer_kind: OptimizerKind, learning_rate: f32) -> Self {
        let optimizer = make_optimizer(optimizer_kind, learning_rate);
        NetworkBuilder {
            optimizer_kind,
            optimizer,
            learning_rate,
            bias_learning_rate: learning_rate / 10.0,
            loss_kind: LossKind::Mse,
            model_name: "model".to_string(),
            repo_root: PathBuf::from("."),
            nodes: Vec::new(),
        }
    }

    pub fn with_bias_learning_rate(mut self, rate: f32) -> Self {
        self.bias_learning_rate = rate;
        self
    }

    pub fn with_loss(mut self, loss: LossKind) -> Self {
        self.loss_kind = loss;
        self
    }

    pub fn with_model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = name.into();
        self
    }

    pub fn with_repo_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.repo_root = root.into();
        self
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn repo_root(&self) -> &std::path::Path {
        &self.repo_root
    }

    fn push(&mut self, layer: Box<dyn Layer>, inputs: Vec<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        let mut node = GraphNode::new(id, layer);
        node.inputs = inputs.clone();
        for pred in &inputs {
            self.nodes[pred.0].outputs.push(id);
        }
        self.nodes.push(node);
        id
    }

    /// Adds a head vertex. The engine treats every head uniformly as an
    /// identity pass-through (spec section 4.3: "Head nodes receive one
    /// input tensor each"), implemented by reusing the linear activation.
    pub fn add_input(&mut self) -> NodeId {
        let id = NodeId(self.nodes.len());
        let mut node = GraphNode::new(id, Box::new(Activation::new(ActivationKind::Linear)));
        node.is_input = true;
        self.nodes.push(node);
        id
    }

    /// A dense layer bundles `FullyConnected` (+ optional `Bias`) + an
    /// activation into one conceptual unit, mirroring the teacher's
    /// `GraphBuilder::linear` helper that composes matmul + add.
    pub fn add_dense(
        &mut self,
        input: NodeId,
        input_width: usize,
        output_width: usize,
        activation: ActivationKind,
        options: LayerOptions,
    ) -> NodeId {
        let weights: TensorRef = Rc::new(XavierTensor::new(input_width, output_width, 1, options.seed));
        let fc = FullyConnected::new(weights, options.bits, self.optimizer.as_mut());
        let mut last = self.push(Box::new(fc), vec![input]);

        if options.use_bias {
            let bias_leaf: TensorRef = Rc::new(UniformTensor::new(1, output_width, 1, 0.0));
            let bias = Bias::new(bias_leaf, options.bits, self.bias_learning_rate, self.optimizer.as_mut());
            last = self.push(Box::new(bias), vec![last]);
        }

        if activation != ActivationKind::Linear {
            last = self.push(Box::new(Activation::new(activation)), vec![last]);
        }
        last
    }

    /// `channels_in` is the input's channel count; each filter spans the
    /// full depth, per spec section 4.2's valid-convolution contract.
    pub fn add_conv2d(
        &mut self,
        input: NodeId,
        filters: usize,
        kernel: (usize, usize),
        channels_in: usize,
        activation: ActivationKind,
        options: LayerOptions,
    ) -> NodeId {
        let filter_tensors: Vec<TensorRef> = (0..filters)
            .map(|f| Rc::new(XavierTensor::new(kernel.0, kernel.1, channels_in, options.seed.wrapping_add(f as u64))) as TensorRef)
            .collect();
        let conv = Convolution2dValid::new(filter_tensors, options.bits, self.optimizer.as_mut());
        let mut last = self.push(Box::new(conv), vec![input]);
        if activation != ActivationKind::Linear {
            last = self.push(Box::new(Activation::new(activation)), vec![last]);
        }
        last
    }

    pub fn add_activation(&mut self, input: NodeId, kind: ActivationKind) -> NodeId {
        self.push(Box::new(Activation::new(kind)), vec![input])
    }

    pub fn add_flatten(&mut self, input: NodeId) -> NodeId {
        self.push(Box::new(Flatten::new()), vec![input])
    }

    pub fn add_normalization(&mut self, input: NodeId) -> NodeId {
        self.push(Box::new(Normalization::new()), vec![input])
    }

    pub fn add_dropout(&mut self, input: NodeId, rate: f32, seed: u64) -> NodeId {
        self.push(Box::new(Dropout::new(rate, seed)), vec![input])
    }

    pub fn add_concat_wide(&mut self, inputs: Vec<NodeId>) -> NodeId {
        self.push(Box::new(ConcatWide::new()), inputs)
    }

    pub fn set_materialized(&mut self, id: NodeId, bits: Option<BitWidth>) {
        self.nodes[id.0].materialized = bits;
    }

    pub fn set_clipping(&mut self, id: NodeId, enabled: bool, threshold: f32) {
        self.nodes[id.0].use_norm_clipping = enabled;
        self.nodes[id.0].clip_threshold = threshold;
    }

    pub fn mark_output(&mut self, id: NodeId) {
        self.nodes[id.0].is_output = true;
    }

    /// Validates the model name against `^[A-Za-z0-9_]+$` and hands off the
    /// assembled arena to a trainable `NetworkGraph` (spec section 6).
    pub fn build(self) -> HappyMlResult<NetworkGraph> {
        if self.model_name.is_empty()
            || !self.model_name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(HappyMlError::InvalidModelName(self.model_name));
        }

        let loss: Box<dyn Loss> = match self.loss_kind {
            LossKind::Mse => Box::new(Mse),
            LossKind::BinaryCrossEntropy => Box::new(BinaryCrossEntropy),
            LossKind::CategoricalCrossEntropy => Box::new(CategoricalCrossEntropy),
        };

        Ok(NetworkGraph::new(self.nodes, loss, self.optimizer))
    }
}

fn make_optimizer(kind: OptimizerKind, learning_rate: f32) -> Box<dyn Optimizer> {
    match kind {
        OptimizerKind::Adam => Box::new(AdamOptimizer::new(learning_rate)),
        OptimizerKind::MicroBatch => Box::new(MicroBatchOptimizer::new(learning_rate)),
        OptimizerKind::SgdMomentum { demon } => {
            Box::new(SgdMomentumOptimizer::new(learning_rate, 0.9).with_demon_decay(demon))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::leaves::F32Tensor;
    use crate::types::NodeId as Id;
    use std::collections::HashMap;

    #[test]
    fn rejects_model_names_with_invalid_characters() {
        let mut builder = NetworkBuilder::new(OptimizerKind::MicroBatch, 0.1).with_model_name("bad name!");
        let input = builder.add_input();
        builder.mark_output(input);
        assert!(matches!(builder.build(), Err(HappyMlError::InvalidModelName(_))));
    }

    #[test]
    fn builds_a_trainable_xor_shaped_graph() {
        let mut builder = NetworkBuilder::new(OptimizerKind::MicroBatch, 0.5).with_model_name("xor_net");
        let input = builder.add_input();
        let hidden = builder.add_dense(input, 2, 4, ActivationKind::Sigmoid, LayerOptions::default());
        let output = builder.add_dense(hidden, 4, 1, ActivationKind::Sigmoid, LayerOptions::default());
        builder.mark_output(output);
        let mut graph = builder.build().unwrap();

        let sample: TensorRef = Rc::new(F32Tensor::from_channel_major(1, 2, 1, vec![0.0, 1.0]).unwrap());
        let mut inputs = HashMap::new();
        inputs.insert(Id(0), sample);
        let outputs = graph.forward(&inputs, false).unwrap();
        assert_eq!(outputs.len(), 1);
    }
}
