//! A single vertex in the network graph: owns one layer, its declared
//! input shapes, and the bookkeeping the graph needs to drive join/fan-out
//! traversal (spec section 4.3).

use crate::layers::{Layer, TrainingQueue};
use crate::tensor::TensorRef;
use crate::types::{BitWidth, NodeId};

pub struct GraphNode {
    pub id: NodeId,
    pub layer: Box<dyn Layer>,
    pub inputs: Vec<NodeId>,
    pub outputs: Vec<NodeId>,
    pub is_input: bool,
    pub is_output: bool,
    pub materialized: Option<BitWidth>,
    pub use_norm_clipping: bool,
    pub clip_threshold: f32,

    /// Per-edge forward slots, keyed by predecessor id; populated as
    /// predecessors fire, drained once every slot for this node is full.
    pub(crate) forward_slots: std::collections::HashMap<NodeId, TensorRef>,
    /// Per-edge backward slots, keyed by successor id.
    pub(crate) backward_slots: std::collections::HashMap<NodeId, TensorRef>,
    pub(crate) training_queue: TrainingQueue,
}

impl GraphNode {
    pub fn new(id: NodeId, layer: Box<dyn Layer>) -> Self {
        GraphNode {
            id,
            layer,
            inputs: Vec::new(),
            outputs: Vec::new(),
            is_input: false,
            is_output: false,
            materialized: None,
            use_norm_clipping: false,
            clip_threshold: 5.0,
            forward_slots: std::collections::HashMap::new(),
            backward_slots: std::collections::HashMap::new(),
            training_queue: TrainingQueue::new(),
        }
    }

    pub(crate) fn forward_ready(&self) -> bool {
        self.inputs.iter().all(|p| self.forward_slots.contains_key(p))
    }

    pub(crate) fn backward_ready(&self) -> bool {
        self.outputs.iter().all(|s| self.backward_slots.contains_key(s))
    }

    pub(crate) fn clear_traversal_state(&mut self) {
        self.forward_slots.clear();
        self.backward_slots.clear();
    }
}
