//! Error types for prograph-train.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Candle tensor error.
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    /// Graph data error.
    #[error(transparent)]
    Data(#[from] prograph_core::Error),

    /// Backbone or checkpoint error.
    #[error(transparent)]
    Nn(#[from] prograph_nn::Error),

    /// Prompt construction error.
    #[error(transparent)]
    Prompt(#[from] prograph_prompt::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The prompt type has no routine for the requested operation.
    #[error("unsupported prompt type: {0}")]
    UnsupportedPrompt(String),

    /// Batching would leave a single graph in the last batch.
    #[error(
        "batch_size {batch_size} makes the last batch of {len} graphs contain only 1 graph, \
         which leaves the contrastive loss without negatives"
    )]
    DegenerateBatch { len: usize, batch_size: usize },

    /// Invalid configuration.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
