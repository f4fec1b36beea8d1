//! Error types for prograph-prompt.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Candle tensor error.
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    /// Graph data error.
    #[error(transparent)]
    Data(#[from] prograph_core::Error),

    /// Backbone error.
    #[error(transparent)]
    Nn(#[from] prograph_nn::Error),

    /// Unknown prompt type name.
    #[error("unsupported prompt type: {0}")]
    UnsupportedPrompt(String),

    /// Invalid configuration.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
