//! GNN backbones and classification heads.
//!
//! `prograph-nn` provides the differentiable pieces shared by pretraining
//! and prompt tuning:
//!
//! - [`conv`]: dense message-passing layers (GCN, GAT, GraphSAGE, GIN,
//!   GraphConv, graph transformer)
//! - [`backbone`]: [`Backbone`], a stack of one layer type with mean readout
//! - [`head`]: [`AnsweringHead`] (linear + softmax) and [`ProjectionHead`]
//!   (linear, ReLU, linear)
//! - [`checkpoint`]: checkpoint naming and the load guard
//!
//! Every component owns its own [`candle_nn::VarMap`]. Training code decides
//! what is trainable by choosing which components' variables reach the
//! optimizer; nothing is frozen by mutating flags on the parameters.
//!
//! # Example
//!
//! ```rust,ignore
//! use prograph_nn::{Backbone, GnnType};
//! use candle_core::Device;
//!
//! let gnn = Backbone::new(GnnType::Gcn, 4, 16, 2, &Device::Cpu)?;
//! let graph_emb = gnn.forward(&batch, None)?; // (num_graphs, 16)
//! ```

pub mod backbone;
pub mod checkpoint;
pub mod conv;
pub mod error;
pub mod head;

pub use backbone::{Backbone, GnnType, ReadoutPrompt};
pub use checkpoint::{ensure_checkpoint_matches, CheckpointName, CHECKPOINT_EXT};
pub use error::{Error, Result};
pub use head::{AnsweringHead, ProjectionHead};
