//! Error types shared by every stage of the pipeline.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FerError>;

/// Coarse classification of a [`FerError`], used by callers that only care
/// about the failure policy (fatal at startup, halts training, reported only).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Load,
    Config,
    Computation,
    Persistence,
    Index,
}

#[derive(Debug, Error)]
pub enum FerError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to load {path}: {msg}")]
    Load { path: PathBuf, msg: String },
    #[error("parameter `{name}` has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("computation error: {0}")]
    Computation(String),
    #[error("failed to persist checkpoint to {path}: {msg}")]
    Persistence { path: PathBuf, msg: String },
    #[error("index {index} out of range for dataset of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
}

impl FerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FerError::Io { .. } | FerError::Load { .. } | FerError::ShapeMismatch { .. } => {
                ErrorKind::Load
            }
            FerError::Config(_) => ErrorKind::Config,
            FerError::Computation(_) => ErrorKind::Computation,
            FerError::Persistence { .. } => ErrorKind::Persistence,
            FerError::IndexOutOfRange { .. } => ErrorKind::Index,
        }
    }

    pub(crate) fn load(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        FerError::Load { path: path.into(), msg: msg.into() }
    }

    pub(crate) fn computation(msg: impl Into<String>) -> Self {
        FerError::Computation(msg.into())
    }
}
