//! Learnable prompts for adapting a pretrained GNN.
//!
//! A prompt is a small set of parameters that steers a frozen or lightly
//! tuned backbone toward a downstream task. The modules here only own those
//! parameters and the transformation they apply; which of them are trained,
//! and with which loss, is decided by the strategies in `prograph-train`.
//!
//! | Prompt | Where it acts | Parameters |
//! |---|---|---|
//! | [`Gpf`] | node features, `x + p` | one row (1 x F) |
//! | [`GpfPlus`] | node features, `x + softmax(a(x)) @ P` | basis bank (k x F) + scorer |
//! | [`LightPrompt`] | a separate token graph per class | tokens (classes x T x F) |
//! | [`Gprompt`] | node embeddings before readout, `h ⊙ p` | one row (1 x H) |
//! | [`GpptPrompt`] | node embeddings, structure + task tokens | (K x H) + K x (C x H) |

pub mod error;
pub mod gpf;
pub mod gppt;
pub mod gprompt;
pub mod kind;
pub mod light;

pub use error::{Error, Result};
pub use gpf::{Gpf, GpfPlus};
pub use gppt::GpptPrompt;
pub use gprompt::Gprompt;
pub use kind::PromptKind;
pub use light::LightPrompt;

use candle_nn::Init;

/// Glorot/Xavier uniform bound for a (rows x cols) parameter.
pub(crate) fn glorot(rows: usize, cols: usize) -> Init {
    let bound = (6.0 / (rows + cols) as f64).sqrt();
    Init::Uniform { lo: -bound, up: bound }
}
