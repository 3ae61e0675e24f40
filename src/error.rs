use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("Invalid chunk configuration: overlap {overlap} must be smaller than size {size}")]
    InvalidChunkConfig { size: usize, overlap: usize },

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Corrupt index at '{}': {reason}", path.display())]
    CorruptIndex { path: PathBuf, reason: String },

    #[error("Id {id} out of range (count {count})")]
    IdOutOfRange { id: usize, count: usize },

    #[error("No index found at '{}'", .0.display())]
    IndexNotFound(PathBuf),

    #[error("Index is empty")]
    EmptyIndex,

    #[error("Batch mismatch: {texts} texts but {vectors} vectors")]
    BatchMismatch { texts: usize, vectors: usize },

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

impl RagError {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        RagError::CorruptIndex {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
