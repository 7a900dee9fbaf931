use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failures reported by an embedding provider.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Embedding provider unreachable: {0}")]
    Unreachable(String),

    #[error("Malformed embedding response: {0}")]
    MalformedResponse(String),

    #[error("Embedding provider timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to load document '{file}': {reason}")]
    DocumentLoad { file: String, reason: String },

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error("Persistence failure at {}: {reason}", path.display())]
    Persistence { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Source '{0}' is already present in the corpus")]
    DuplicateSource(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    pub fn persistence(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Persistence { path: path.into(), reason: reason.to_string() }
    }

    pub fn document_load(file: impl Into<String>, reason: impl ToString) -> Self {
        Self::DocumentLoad { file: file.into(), reason: reason.to_string() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
