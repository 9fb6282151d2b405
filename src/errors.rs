//! Library-wide error taxonomy.
//!
//! Argument validation failures surface to the caller immediately; per-target
//! scoring failures are absorbed by the pipeline (the target is skipped and
//! tallied) and never appear here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PromerError {
    /// A sequence, MSA, or HMM uses a different alphabet than its collaborator.
    #[error("alphabet mismatch: expected {expected}, got {got}")]
    AlphabetMismatch { expected: &'static str, got: &'static str },

    /// Malformed HMM/MSA/sequence content or an unknown format tag.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// A threshold or tuning value outside its permitted range, or an unknown
    /// enum tag.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Bit-score cutoffs were requested but the model lacks the selected pair.
    #[error("model '{model}' has no {kind} bit cutoffs")]
    MissingCutoffs { model: String, kind: &'static str },

    /// A profile was used before `configure`.
    #[error("profile used before configure()")]
    Unconfigured,

    /// Two entities with differing model sizes where equality is required.
    #[error("model size mismatch: {left} != {right}")]
    ModelSizeMismatch { left: usize, right: usize },

    /// A binary file failed its integrity checks.
    #[error("corrupt file: {0}")]
    CorruptFile(String),

    /// A binary file carries a format version this build does not understand.
    #[error("unsupported format version: {0}")]
    UnsupportedVersion(String),

    /// A binary file was written on a platform with opposite byte order.
    #[error("byte order mismatch in {0}")]
    EndianMismatch(String),

    /// The input produced a model with zero match columns.
    #[error("alignment produced no match columns (symfrac too strict?)")]
    EmptyModel,

    /// Underlying storage failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PromerError>;
