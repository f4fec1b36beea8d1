//! Contrastive pretraining of the backbone.

mod simgrace;
mod snapshot;
mod tracker;

pub use simgrace::{PretrainConfig, PretrainReport, SimGrace};
pub use snapshot::ParamSnapshot;
pub use tracker::CheckpointTracker;
