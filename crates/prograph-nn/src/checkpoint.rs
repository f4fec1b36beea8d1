//! Checkpoint naming and the pre-load guard.
//!
//! Pretrained backbones are stored as
//! `{dataset}.{method}.{gnn_type}.{hid_dim}hidden_dim.safetensors`, so the
//! file name alone says which downstream configuration may load it.

use crate::{Error, GnnType, Result};
use std::path::{Path, PathBuf};

/// File extension of backbone checkpoints.
pub const CHECKPOINT_EXT: &str = "safetensors";

/// Components of a checkpoint file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointName {
    pub dataset: String,
    pub method: String,
    pub gnn_type: GnnType,
    pub hid_dim: usize,
}

impl CheckpointName {
    pub fn new(
        dataset: impl Into<String>,
        method: impl Into<String>,
        gnn_type: GnnType,
        hid_dim: usize,
    ) -> Self {
        Self {
            dataset: dataset.into(),
            method: method.into(),
            gnn_type,
            hid_dim,
        }
    }

    pub fn file_name(&self) -> String {
        format!(
            "{}.{}.{}.{}hidden_dim.{CHECKPOINT_EXT}",
            self.dataset, self.method, self.gnn_type, self.hid_dim
        )
    }

    /// Full path inside `dir`.
    pub fn path_in(&self, dir: impl AsRef<Path>) -> PathBuf {
        dir.as_ref().join(self.file_name())
    }
}

/// Refuse a checkpoint whose file name does not mention both the configured
/// GNN type and the dataset.
pub fn ensure_checkpoint_matches(path: &Path, gnn_type: GnnType, dataset: &str) -> Result<()> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if !name.contains(gnn_type.as_str()) {
        return Err(Error::CheckpointMismatch(format!(
            "the downstream gnn '{gnn_type}' does not match the pre-train model {}",
            path.display()
        )));
    }
    if !name.contains(dataset) {
        return Err(Error::CheckpointMismatch(format!(
            "the downstream dataset '{dataset}' does not match the pre-train dataset {}",
            path.display()
        )));
    }
    Ok(())
}
