//! Network metadata on disk (spec section 6): a `:`-delimited text config
//! listing optimizer/loss/vertex/edge rows, plus a directory of binary
//! parameter tensors named `<vertex-id>_<role>.tensor`.

use crate::errors::{HappyMlError, HappyMlResult};
use crate::layers::activation::ActivationKind;
use crate::tensor::{io, TensorRef};
use crate::types::{BitWidth, NodeId};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    FullyConnected,
    Bias,
    Convolution2dValid,
    Activation,
    Flatten,
    Normalization,
    Dropout,
    ConcatWide,
}

impl LayerKind {
    fn as_str(self) -> &'static str {
        match self {
            LayerKind::FullyConnected => "fullyConnected",
            LayerKind::Bias => "bias",
            LayerKind::Convolution2dValid => "convolution2dValid",
            LayerKind::Activation => "activation",
            LayerKind::Flatten => "flatten",
            LayerKind::Normalization => "normalization",
            LayerKind::Dropout => "dropout",
            LayerKind::ConcatWide => "concatWide",
        }
    }

    fn from_str(s: &str) -> HappyMlResult<Self> {
        Ok(match s {
            "fullyConnected" => LayerKind::FullyConnected,
            "bias" => LayerKind::Bias,
            "convolution2dValid" => LayerKind::Convolution2dValid,
            "activation" => LayerKind::Activation,
            "flatten" => LayerKind::Flatten,
            "normalization" => LayerKind::Normalization,
            "dropout" => LayerKind::Dropout,
            "concatWide" => LayerKind::ConcatWide,
            other => {
                return Err(HappyMlError::UnknownToken {
                    kind: "layer_kind",
                    token: other.to_string(),
                })
            }
        })
    }
}

#[derive(Debug, Clone)]
pub struct VertexConfig {
    pub id: NodeId,
    pub accepts_input: bool,
    pub produces_output: bool,
    pub layer_kind: LayerKind,
    pub activation: Option<ActivationKind>,
    pub materialized: Option<BitWidth>,
    pub use_bias: bool,
    pub bits: BitWidth,
    pub input_shapes: Vec<(usize, usize, usize)>,
    pub output_shape: (usize, usize, usize),
    pub filters: usize,
    pub kernel: (usize, usize),
    pub l2: bool,
    pub normalization: bool,
    pub clip: bool,
    pub clip_threshold: f32,
    pub dropout_rate: f32,
}

pub struct NetworkConfig {
    pub optimizer: String,
    pub learning_rate: f32,
    pub bias_learning_rate: f32,
    pub loss: String,
    pub vertices: Vec<VertexConfig>,
    pub edges: Vec<(NodeId, Vec<NodeId>)>,
}

fn shape_to_str(shape: (usize, usize, usize)) -> String {
    format!("{}:{}:{}", shape.0, shape.1, shape.2)
}

fn shape_from_parts(parts: &[&str]) -> HappyMlResult<(usize, usize, usize)> {
    if parts.len() != 3 {
        return Err(HappyMlError::CorruptStream("expected r:c:ch shape triple".into()));
    }
    let parse = |s: &str| s.parse::<usize>().map_err(|_| HappyMlError::CorruptStream(format!("bad integer {s:?}")));
    Ok((parse(parts[0])?, parse(parts[1])?, parse(parts[2])?))
}

impl NetworkConfig {
    pub fn write(&self, path: &Path) -> HappyMlResult<()> {
        let mut file = File::create(path).map_err(|e| HappyMlError::io(path, e))?;
        writeln!(file, "optimizer:{}", self.optimizer).map_err(|e| HappyMlError::io(path, e))?;
        writeln!(file, "learningRate:{}", self.learning_rate).map_err(|e| HappyMlError::io(path, e))?;
        writeln!(file, "biasLearningRate:{}", self.bias_learning_rate).map_err(|e| HappyMlError::io(path, e))?;
        writeln!(file, "loss:{}", self.loss).map_err(|e| HappyMlError::io(path, e))?;

        for v in &self.vertices {
            let activation = v.activation.map(|a| a.as_str().to_string()).unwrap_or_else(|| "none".into());
            let materialized = v.materialized.map(|b| b.as_u8().to_string()).unwrap_or_else(|| "none".into());
            let mut line = format!(
                "vertex:{}:{}:{}:{}:{}:{}:{}:{}:{}",
                v.id,
                v.accepts_input,
                v.produces_output,
                v.layer_kind.as_str(),
                activation,
                materialized,
                v.use_bias,
                v.bits.as_u8(),
                v.input_shapes.len()
            );
            for shape in &v.input_shapes {
                line.push(':');
                line.push_str(&shape_to_str(*shape));
            }
            line.push(':');
            line.push_str(&shape_to_str(v.output_shape));
            line.push_str(&format!(
                ":{}:{}x{}:{}:{}:{}:{}:{}",
                v.filters, v.kernel.0, v.kernel.1, v.l2, v.normalization, v.clip, v.clip_threshold, v.dropout_rate
            ));
            writeln!(file, "{line}").map_err(|e| HappyMlError::io(path, e))?;
        }

        for (from, tos) in &self.edges {
            let to_list = tos.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(":");
            writeln!(file, "edge:{from}:{to_list}").map_err(|e| HappyMlError::io(path, e))?;
        }
        Ok(())
    }

    pub fn read(path: &Path) -> HappyMlResult<Self> {
        if !path.exists() {
            return Err(HappyMlError::MissingConfig(path.to_path_buf()));
        }
        let file = File::open(path).map_err(|e| HappyMlError::io(path, e))?;
        let reader = BufReader::new(file);

        let mut optimizer = None;
        let mut learning_rate = None;
        let mut bias_learning_rate = None;
        let mut loss = None;
        let mut vertices = Vec::new();
        let mut edges = Vec::new();

        for line in reader.lines() {
            let line = line.map_err(|e| HappyMlError::io(path, e))?;
            if line.is_empty() {
                continue;
            }
            let parts: Vec<&str> = line.split(':').collect();
            match parts[0] {
                "optimizer" => optimizer = Some(parts[1].to_string()),
                "learningRate" => learning_rate = Some(parts[1].parse().unwrap_or(0.01)),
                "biasLearningRate" => bias_learning_rate = Some(parts[1].parse().unwrap_or(0.001)),
                "loss" => loss = Some(parts[1].to_string()),
                "vertex" => vertices.push(parse_vertex(&parts)?),
                "edge" => {
                    let from = NodeId(parts[1].parse().map_err(|_| HappyMlError::CorruptStream("bad edge id".into()))?);
                    let tos = parts[2..]
                        .iter()
                        .map(|s| s.parse::<usize>().map(NodeId).map_err(|_| HappyMlError::CorruptStream("bad edge target".into())))
                        .collect::<HappyMlResult<Vec<_>>>()?;
                    edges.push((from, tos));
                }
                other => {
                    return Err(HappyMlError::CorruptStream(format!("unknown config row kind {other:?}")));
                }
            }
        }

        Ok(NetworkConfig {
            optimizer: optimizer.ok_or_else(|| HappyMlError::CorruptStream("missing optimizer row".into()))?,
            learning_rate: learning_rate.ok_or_else(|| HappyMlError::CorruptStream("missing learningRate row".into()))?,
            bias_learning_rate: bias_learning_rate.unwrap_or(0.001),
            loss: loss.ok_or_else(|| HappyMlError::CorruptStream("missing loss row".into()))?,
            vertices,
            edges,
        })
    }
}

fn parse_vertex(parts: &[&str]) -> HappyMlResult<VertexConfig> {
    let id = NodeId(parts[1].parse().map_err(|_| HappyMlError::CorruptStream("bad vertex id".into()))?);
    let accepts_input = parts[2] == "true";
    let produces_output = parts[3] == "true";
    let layer_kind = LayerKind::from_str(parts[4])?;
    let activation = if parts[5] == "none" { None } else { ActivationKind::from_str(parts[5]) };
    let materialized = if parts[6] == "none" {
        None
    } else {
        parts[6].parse::<u8>().ok().and_then(BitWidth::from_u8)
    };
    let use_bias = parts[7] == "true";
    let bits = parts[8]
        .parse::<u8>()
        .ok()
        .and_then(BitWidth::from_u8)
        .ok_or_else(|| HappyMlError::CorruptStream("bad bit width".into()))?;
    let n_inputs: usize = parts[9].parse().map_err(|_| HappyMlError::CorruptStream("bad n_inputs".into()))?;

    let mut cursor = 10;
    let mut input_shapes = Vec::with_capacity(n_inputs);
    for _ in 0..n_inputs {
        input_shapes.push(shape_from_parts(&parts[cursor..cursor + 3])?);
        cursor += 3;
    }
    let output_shape = shape_from_parts(&parts[cursor..cursor + 3])?;
    cursor += 3;

    let filters: usize = parts[cursor].parse().unwrap_or(0);
    cursor += 1;
    let kernel_parts: Vec<&str> = parts[cursor].split('x').collect();
    let kernel = (
        kernel_parts.first().and_then(|s| s.parse().ok()).unwrap_or(0),
        kernel_parts.get(1).and_then(|s| s.parse().ok()).unwrap_or(0),
    );
    cursor += 1;
    let l2 = parts[cursor] == "true";
    cursor += 1;
    let normalization = parts[cursor] == "true";
    cursor += 1;
    let clip = parts[cursor] == "true";
    cursor += 1;
    let clip_threshold: f32 = parts[cursor].parse().unwrap_or(5.0);
    cursor += 1;
    let dropout_rate: f32 = parts.get(cursor).and_then(|s| s.parse().ok()).unwrap_or(0.0);

    Ok(VertexConfig {
        id,
        accepts_input,
        produces_output,
        layer_kind,
        activation,
        materialized,
        use_bias,
        bits,
        input_shapes,
        output_shape,
        filters,
        kernel,
        l2,
        normalization,
        clip,
        clip_threshold,
        dropout_rate,
    })
}

pub fn parameter_path(dir: &Path, vertex_id: usize, role: &str) -> std::path::PathBuf {
    dir.join(format!("{vertex_id}_{role}.tensor"))
}

pub fn save_parameter(dir: &Path, vertex_id: usize, role: &str, tensor: &TensorRef) -> HappyMlResult<()> {
    let path = parameter_path(dir, vertex_id, role);
    let mut file = File::create(&path).map_err(|e| HappyMlError::io(&path, e))?;
    io::save_tensor(tensor.as_ref(), &mut file)
}

pub fn load_parameter(dir: &Path, vertex_id: usize, role: &str) -> HappyMlResult<TensorRef> {
    let path = parameter_path(dir, vertex_id, role);
    if !path.exists() {
        return Err(HappyMlError::MissingParameter(path));
    }
    let mut file = File::open(&path).map_err(|e| HappyMlError::io(&path, e))?;
    let leaf = io::load_tensor_f32(&mut file)?;
    Ok(Rc::new(leaf) as TensorRef)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(label: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("happyml_persistence_test_{label}"));
        let _ = std::fs::create_dir_all(&dir);
        dir
    }

    #[test]
    fn config_round_trips_through_disk() {
        let dir = scratch_dir("round_trip");
        let path = dir.join("model.config");
        let config = NetworkConfig {
            optimizer: "Adam".into(),
            learning_rate: 0.01,
            bias_learning_rate: 0.001,
            loss: "mse".into(),
            vertices: vec![VertexConfig {
                id: NodeId(0),
                accepts_input: true,
                produces_output: false,
                layer_kind: LayerKind::FullyConnected,
                activation: None,
                materialized: Some(BitWidth::Bits32),
                use_bias: false,
                bits: BitWidth::Bits32,
                input_shapes: vec![(1, 2, 1)],
                output_shape: (1, 3, 1),
                filters: 0,
                kernel: (0, 0),
                l2: false,
                normalization: false,
                clip: false,
                clip_threshold: 5.0,
                dropout_rate: 0.0,
            }],
            edges: vec![(NodeId(0), vec![NodeId(1)])],
        };
        config.write(&path).unwrap();
        let loaded = NetworkConfig::read(&path).unwrap();
        assert_eq!(loaded.optimizer, "Adam");
        assert_eq!(loaded.vertices.len(), 1);
        assert_eq!(loaded.vertices[0].output_shape, (1, 3, 1));
        assert_eq!(loaded.edges, vec![(NodeId(0), vec![NodeId(1)])]);
    }

    #[test]
    fn missing_config_is_reported_as_typed_error() {
        let dir = scratch_dir("missing");
        let path = dir.join("missing.config");
        assert!(matches!(NetworkConfig::read(&path), Err(HappyMlError::MissingConfig(_))));
    }
}
