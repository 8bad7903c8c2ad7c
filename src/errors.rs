use thiserror::Error;

/// The full error taxonomy of the engine: shape/contract errors, I/O errors,
/// resource/capacity errors, and configuration errors (spec section 7).
/// Numeric errors (NaN/Inf, zero variance) are deliberately not a variant
/// here — they are not caught by the core and surface through the output
/// tensor's values, per spec.
#[derive(Error, Debug)]
pub enum HappyMlError {
    #[error("incompatible shapes: expected {expected:?}, found {found:?}")]
    IncompatibleShapes {
        expected: (usize, usize, usize),
        found: (usize, usize, usize),
    },
    #[error("invalid reshape: {rows}x{cols}x{channels} has {from} cells, target has {to}")]
    InvalidReshape {
        rows: usize,
        cols: usize,
        channels: usize,
        from: usize,
        to: usize,
    },
    #[error("kernel {kernel:?} is larger than input {input:?} for a valid cross-correlation")]
    KernelTooLarge {
        input: (usize, usize),
        kernel: (usize, usize),
    },
    #[error("duplicate optimizer registration for id {0}")]
    DuplicateRegistration(usize),
    #[error("empty batch")]
    EmptyBatch,
    #[error("missing config file: {0}")]
    MissingConfig(std::path::PathBuf),
    #[error("missing parameter file: {0}")]
    MissingParameter(std::path::PathBuf),
    #[error("I/O error at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt binary stream: {0}")]
    CorruptStream(String),
    #[error("BPE code space exhausted at 0x7FFE")]
    BpeCodeSpaceExhausted,
    #[error("unknown {kind} token: {token:?}")]
    UnknownToken { kind: &'static str, token: String },
    #[error("invalid model name {0:?}: must match [A-Za-z0-9_]+")]
    InvalidModelName(String),
    #[error("graph error: {0}")]
    GraphError(String),
}

pub type HappyMlResult<T> = Result<T, HappyMlError>;

impl HappyMlError {
    pub fn io(path: impl Into<std::path::PathBuf>, source: std::io::Error) -> Self {
        HappyMlError::Io {
            path: path.into(),
            source,
        }
    }
}
