//! Error types for prograph-core.

use thiserror::Error;

/// Errors raised while building graphs, batches and datasets.
#[derive(Debug, Error)]
pub enum Error {
    /// Candle tensor error.
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A graph violates a structural invariant (edge out of range, ragged features, ...).
    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    /// Invalid configuration.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// No dataset with this name could be located.
    #[error("dataset not found: {0}")]
    DatasetNotFound(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
