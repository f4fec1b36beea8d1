//! SimGRACE: graph contrastive learning without data augmentation.
//!
//! Instead of augmenting the input graphs, the second view of a batch comes
//! from the same backbone with Gaussian noise added to its weights. The
//! projected embeddings of the live and perturbed backbone are contrasted
//! with [`contrastive_loss`]; the perturbed view is treated as a constant.
//!
//! # Reference
//!
//! Xia et al., "SimGRACE: A Simple Framework for Graph Contrastive Learning
//! without Data Augmentation", WWW 2022.

use super::{CheckpointTracker, ParamSnapshot};
use crate::loss::contrastive_loss;
use crate::{Error, Result};
use candle_core::{Device, Tensor};
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use prograph_core::{DataLoader, Graph, GraphBatch};
use prograph_nn::{Backbone, CheckpointName, GnnType, ProjectionHead};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Method tag used in checkpoint file names.
pub const METHOD_NAME: &str = "SimGRACE";

/// Pretraining configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PretrainConfig {
    /// Dataset name, recorded in the checkpoint file name.
    pub dataset_name: String,
    /// Backbone architecture (default: GCN).
    pub gnn_type: GnnType,
    /// Embedding width (default: 16).
    pub hid_dim: usize,
    /// Number of message-passing layers (default: 2).
    pub num_layer: usize,
    /// Graphs per batch (default: 10).
    pub batch_size: usize,
    /// AdamW learning rate (default: 0.01).
    pub learning_rate: f64,
    /// AdamW weight decay (default: 1e-4).
    pub weight_decay: f64,
    /// Number of epochs (default: 100).
    pub epochs: usize,
    /// Weight noise as a fraction of each parameter's std (default: 0.1).
    pub perturb_scale: f64,
    /// Seed for the perturbation noise (default: 42).
    pub seed: u64,
    /// Where checkpoints are written (default: `pre_trained_gnn`).
    pub checkpoint_dir: PathBuf,
}

impl Default for PretrainConfig {
    fn default() -> Self {
        Self {
            dataset_name: "MUTAG".to_string(),
            gnn_type: GnnType::Gcn,
            hid_dim: 16,
            num_layer: 2,
            batch_size: 10,
            learning_rate: 0.01,
            weight_decay: 1e-4,
            epochs: 100,
            perturb_scale: 0.1,
            seed: 42,
            checkpoint_dir: PathBuf::from("pre_trained_gnn"),
        }
    }
}

impl PretrainConfig {
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

    pub fn with_hid_dim(mut self, hid_dim: usize) -> Self {
        self.hid_dim = hid_dim;
        self
    }

    pub fn with_num_layer(mut self, num_layer: usize) -> Self {
        self.num_layer = num_layer;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_weight_decay(mut self, decay: f64) -> Self {
        self.weight_decay = decay;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = dir.into();
        self
    }

    /// File the best backbone is written to.
    pub fn checkpoint_path(&self) -> PathBuf {
        CheckpointName::new(self.dataset_name.clone(), METHOD_NAME, self.gnn_type, self.hid_dim)
            .path_in(&self.checkpoint_dir)
    }
}

/// Outcome of a pretraining run.
#[derive(Debug, Clone, Serialize)]
pub struct PretrainReport {
    /// Mean training loss of every epoch.
    pub epoch_losses: Vec<f64>,
    /// Epochs (1-based) after which the checkpoint was rewritten.
    pub saved_epochs: Vec<usize>,
    /// Lowest epoch loss seen.
    pub best_loss: f64,
    /// Checkpoint location.
    pub checkpoint_path: PathBuf,
}

/// Backbone plus projection head under contrastive training.
pub struct SimGrace {
    config: PretrainConfig,
    backbone: Backbone,
    projection: ProjectionHead,
    rng: StdRng,
    device: Device,
}

impl SimGrace {
    pub fn new(config: PretrainConfig, input_dim: usize, device: &Device) -> Result<Self> {
        let backbone = Backbone::new(
            config.gnn_type,
            input_dim,
            config.hid_dim,
            config.num_layer,
            device,
        )?;
        let projection = ProjectionHead::new(config.hid_dim, device)?;
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Self {
            config,
            backbone,
            projection,
            rng,
            device: device.clone(),
        })
    }

    pub fn config(&self) -> &PretrainConfig {
        &self.config
    }

    pub fn backbone(&self) -> &Backbone {
        &self.backbone
    }

    pub fn projection(&self) -> &ProjectionHead {
        &self.projection
    }

    /// Graph embeddings passed through the projection head (B x hid_dim).
    pub fn forward_with_projection(&self, batch: &GraphBatch) -> Result<Tensor> {
        let h = self.backbone.forward(batch, None)?;
        Ok(self.projection.forward(&h)?)
    }

    /// In-order loader over `graphs`.
    ///
    /// Fails when the last batch would hold a single graph: its contrastive
    /// loss has no negatives.
    pub fn get_loader<'g>(&self, graphs: &'g [Graph]) -> Result<DataLoader<'g>> {
        let batch_size = self.config.batch_size;
        if batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be positive".into()));
        }
        if graphs.len() % batch_size == 1 {
            return Err(Error::DegenerateBatch {
                len: graphs.len(),
                batch_size,
            });
        }
        Ok(DataLoader::new(graphs, batch_size, &self.device)?)
    }

    /// The batch as seen by a perturbed backbone, detached from the graph.
    ///
    /// Backbone weights are perturbed in place and restored before returning;
    /// the projection head lives in its own map and is never perturbed.
    pub fn perturbed_view(&mut self, batch: &GraphBatch) -> Result<Tensor> {
        let snapshot = ParamSnapshot::capture(self.backbone.varmap())?;
        snapshot.perturb(self.config.perturb_scale, &mut self.rng)?;
        let view = self.forward_with_projection(batch);
        snapshot.restore()?;
        Ok(view?.detach())
    }

    /// One pass over `loader`; returns the mean batch loss.
    pub fn train_epoch(
        &mut self,
        loader: &mut DataLoader<'_>,
        optimizer: &mut AdamW,
    ) -> Result<f64> {
        let mut total = 0.0;
        let mut steps = 0usize;
        for batch in loader.epoch() {
            let batch = batch?;
            let z2 = self.perturbed_view(&batch)?;
            let z1 = self.forward_with_projection(&batch)?;
            let loss = contrastive_loss(&z1, &z2)?;
            optimizer.backward_step(&loss)?;
            let loss = loss.to_scalar::<f32>()? as f64;
            debug!(step = steps, loss, "simgrace step");
            total += loss;
            steps += 1;
        }
        if steps == 0 {
            return Err(Error::InvalidConfig("no graphs to pretrain on".into()));
        }
        Ok(total / steps as f64)
    }

    /// Train for `epochs` epochs, rewriting the checkpoint whenever the epoch
    /// loss reaches a new minimum.
    ///
    /// Only backbone weights are optimized.
    pub fn pretrain(&mut self, graphs: &[Graph]) -> Result<PretrainReport> {
        let mut loader = self.get_loader(graphs)?;
        let checkpoint_path = self.config.checkpoint_path();
        std::fs::create_dir_all(&self.config.checkpoint_dir)?;

        info!(
            "start training {} | {} | {}...",
            self.config.dataset_name, METHOD_NAME, self.config.gnn_type
        );
        let mut optimizer = AdamW::new(
            self.backbone.vars(),
            ParamsAdamW {
                lr: self.config.learning_rate,
                weight_decay: self.config.weight_decay,
                ..Default::default()
            },
        )?;

        let epochs = self.config.epochs;
        let mut tracker = CheckpointTracker::new();
        let mut epoch_losses = Vec::with_capacity(epochs);
        let mut saved_epochs = Vec::new();
        for epoch in 1..=epochs {
            let train_loss = self.train_epoch(&mut loader, &mut optimizer)?;
            info!("epoch: {epoch}/{epochs} | train_loss: {train_loss:.8}");
            epoch_losses.push(train_loss);
            if tracker.observe(train_loss) {
                self.backbone.save(&checkpoint_path)?;
                info!(path = %checkpoint_path.display(), "model saved");
                saved_epochs.push(epoch);
            }
        }

        Ok(PretrainReport {
            epoch_losses,
            saved_epochs,
            best_loss: tracker.best(),
            checkpoint_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prograph_core::SyntheticGraphs;

    fn engine() -> SimGrace {
        SimGrace::new(
            PretrainConfig::new("synthetic").with_hid_dim(8),
            4,
            &Device::Cpu,
        )
        .unwrap()
    }

    fn flat(varmap: &candle_nn::VarMap) -> Vec<Vec<f32>> {
        let data = varmap.data().lock().unwrap();
        let mut names: Vec<&String> = data.keys().collect();
        names.sort();
        names
            .into_iter()
            .map(|n| data[n].as_tensor().flatten_all().unwrap().to_vec1().unwrap())
            .collect()
    }

    #[test]
    fn test_remainder_of_one_is_rejected() {
        let graphs = SyntheticGraphs::default().with_num_graphs(11).generate().unwrap();
        let err = engine().get_loader(&graphs).err().unwrap();
        assert!(matches!(err, Error::DegenerateBatch { len: 11, batch_size: 10 }));
    }

    #[test]
    fn test_even_split_is_accepted() {
        let graphs = SyntheticGraphs::default().with_num_graphs(20).generate().unwrap();
        let engine = engine();
        let loader = engine.get_loader(&graphs).unwrap();
        assert_eq!(loader.len(), 2);
    }

    #[test]
    fn test_perturbed_view_restores_weights() {
        let graphs = SyntheticGraphs::default().with_num_graphs(4).generate().unwrap();
        let batch = GraphBatch::collate(&graphs, &Device::Cpu).unwrap();
        let mut engine = engine();

        let backbone_before = flat(engine.backbone().varmap());
        let head_before = flat(engine.projection().varmap());
        let live = engine.forward_with_projection(&batch).unwrap();
        let view = engine.perturbed_view(&batch).unwrap();

        assert_eq!(flat(engine.backbone().varmap()), backbone_before);
        assert_eq!(flat(engine.projection().varmap()), head_before);
        assert_eq!(view.dims(), live.dims());
        let diff = (view - live)
            .unwrap()
            .abs()
            .unwrap()
            .sum_all()
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        assert!(diff > 0.0);
    }

    #[test]
    fn test_checkpoint_path_follows_naming() {
        let config = PretrainConfig::new("MUTAG")
            .with_gnn_type(GnnType::Gin)
            .with_hid_dim(32)
            .with_checkpoint_dir("ckpt");
        assert_eq!(
            config.checkpoint_path(),
            PathBuf::from("ckpt/MUTAG.SimGRACE.GIN.32hidden_dim.safetensors")
        );
    }
}
