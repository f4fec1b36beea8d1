//! Error types for prograph-nn.

use thiserror::Error;

/// Backbone and head errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Candle tensor error.
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    /// Graph data error.
    #[error(transparent)]
    Data(#[from] prograph_core::Error),

    /// Unknown GNN architecture name.
    #[error("unsupported GNN type: {0}")]
    UnsupportedGnn(String),

    /// Checkpoint does not fit the configured backbone.
    #[error("checkpoint mismatch: {0}")]
    CheckpointMismatch(String),

    /// Invalid configuration.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
