pub mod bpe;
pub mod builder;
pub mod errors;
pub mod graph;
pub mod hyperband;
pub mod layers;
pub mod loss;
pub mod optim;
pub mod tensor;
pub mod types;

pub use errors::{HappyMlError, HappyMlResult};
pub use tensor::{Tensor, TensorRef};
