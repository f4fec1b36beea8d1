//! Downstream task configuration.

use crate::Result;
use prograph_nn::GnnType;
use prograph_prompt::PromptKind;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Prompt hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Tokens per class graph for ProG (default: 100).
    pub token_num_per_group: usize,
    /// Similarity threshold for linking ProG tokens (default: 0.01).
    pub inner_prune: f32,
    /// Basis bank size for GPF-plus (default: 20).
    pub p_num: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            token_num_per_group: 100,
            inner_prune: 0.01,
            p_num: 20,
        }
    }
}

impl PromptConfig {
    pub fn with_token_num_per_group(mut self, n: usize) -> Self {
        self.token_num_per_group = n;
        self
    }

    pub fn with_inner_prune(mut self, threshold: f32) -> Self {
        self.inner_prune = threshold;
        self
    }

    pub fn with_p_num(mut self, p_num: usize) -> Self {
        self.p_num = p_num;
        self
    }
}

/// Configuration of a [`GraphTask`](super::GraphTask).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Dataset name; checked against the checkpoint file name.
    pub dataset_name: String,
    /// Backbone architecture (default: GCN).
    pub gnn_type: GnnType,
    /// Prompt family (default: gpf).
    pub prompt_type: PromptKind,
    /// Backbone output width (default: 128).
    pub hid_dim: usize,
    /// Number of message-passing layers (default: 2).
    pub num_layer: usize,
    /// The epoch loop runs `1..epochs` (default: 100).
    pub epochs: usize,
    /// Training graphs kept per class (default: 10).
    pub shot_num: Option<usize>,
    /// Graphs per batch for every split (default: 16).
    pub batch_size: usize,
    /// Pretrained backbone to start from.
    pub pre_train_model_path: Option<PathBuf>,
    /// Seed of the training-set shuffle (default: 42).
    pub seed: u64,
    pub prompt: PromptConfig,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            dataset_name: "MUTAG".to_string(),
            gnn_type: GnnType::Gcn,
            prompt_type: PromptKind::Gpf,
            hid_dim: 128,
            num_layer: 2,
            epochs: 100,
            shot_num: Some(10),
            batch_size: 16,
            pre_train_model_path: None,
            seed: 42,
            prompt: PromptConfig::default(),
        }
    }
}

impl TaskConfig {
    pub fn new(dataset_name: impl Into<String>) -> Self {
        Self {
            dataset_name: dataset_name.into(),
            ..Self::default()
        }
    }

    /// Read a config from a JSON file; missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    pub fn with_gnn_type(mut self, gnn_type: GnnType) -> Self {
        self.gnn_type = gnn_type;
        self
    }

    pub fn with_prompt_type(mut self, prompt_type: PromptKind) -> Self {
        self.prompt_type = prompt_type;
        self
    }

    pub fn with_hid_dim(mut self, hid_dim: usize) -> Self {
        self.hid_dim = hid_dim;
        self
    }

    pub fn with_num_layer(mut self, num_layer: usize) -> Self {
        self.num_layer = num_layer;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_shot_num(mut self, shot_num: Option<usize>) -> Self {
        self.shot_num = shot_num;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_pre_train_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.pre_train_model_path = Some(path.into());
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_prompt(mut self, prompt: PromptConfig) -> Self {
        self.prompt = prompt;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{"dataset_name": "ENZYMES", "prompt_type": "gpf-plus", "gnn_type": "GIN"}"#;
        let config: TaskConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.dataset_name, "ENZYMES");
        assert_eq!(config.prompt_type, PromptKind::GpfPlus);
        assert_eq!(config.gnn_type, GnnType::Gin);
        assert_eq!(config.batch_size, 16);
        assert_eq!(config.prompt.p_num, 20);
        assert!(config.pre_train_model_path.is_none());
    }

    #[test]
    fn test_unknown_prompt_name_fails_to_parse() {
        let parsed = serde_json::from_str::<TaskConfig>(r#"{"prompt_type": "GPF"}"#);
        assert!(parsed.is_err());
    }
}
