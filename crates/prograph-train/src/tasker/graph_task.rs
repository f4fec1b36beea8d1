//! Graph classification with a prompted backbone.

use super::strategy::{acc_f1, build_strategy, collect_predictions, Evaluation, PromptStrategy};
use super::TaskConfig;
use crate::loss::unit_rows;
use crate::metrics::accuracy;
use crate::{Error, Result};
use candle_core::Device;
use candle_nn::{AdamW, Optimizer};
use prograph_core::{DataLoader, GraphDatasetSource, GraphTaskData};
use prograph_nn::{ensure_checkpoint_matches, AnsweringHead, Backbone};
use prograph_prompt::PromptKind;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Metrics of one epoch.
#[derive(Debug, Clone, Serialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub loss: f64,
    pub val: Evaluation,
    pub test: Evaluation,
}

/// Outcome of [`GraphTask::run`].
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub epochs: Vec<EpochRecord>,
    /// Highest validation accuracy seen (0 if none beat 0).
    pub best_val_acc: f64,
    /// Test accuracy of the epoch that set `best_val_acc`.
    pub final_test_acc: f64,
}

/// Backbone, prompt strategy, answering head and optimizer for one
/// downstream graph classification run.
pub struct GraphTask {
    config: TaskConfig,
    data: Arc<GraphTaskData>,
    backbone: Backbone,
    head: AnsweringHead,
    strategy: Box<dyn PromptStrategy>,
    optimizer: AdamW,
    device: Device,
}

impl GraphTask {
    /// Build every component in order: backbone, checkpoint (if configured),
    /// prompt strategy, answering head, optimizer.
    ///
    /// The training split is capped to `config.shot_num` graphs per class.
    /// A checkpoint whose file name does not mention both the configured GNN
    /// type and the dataset is refused before anything is loaded.
    pub fn new(config: TaskConfig, data: GraphTaskData, device: &Device) -> Result<Self> {
        let data = match config.shot_num {
            Some(shots) => data.with_shots(shots),
            None => data,
        };
        data.validate()?;
        if config.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be positive".into()));
        }

        let mut backbone = Backbone::new(
            config.gnn_type,
            data.input_dim,
            config.hid_dim,
            config.num_layer,
            device,
        )?;
        if let Some(path) = &config.pre_train_model_path {
            ensure_checkpoint_matches(path, config.gnn_type, &config.dataset_name)?;
            backbone.load(path)?;
            info!("Successfully loaded pre-trained weights!");
        }

        let strategy = build_strategy(&config, &data, &backbone, device)?;
        let head = AnsweringHead::new(config.hid_dim, data.output_dim, device)?;
        let optimizer = AdamW::new(
            strategy.trainable_vars(&backbone, &head),
            strategy.optimizer_params(),
        )?;

        Ok(Self {
            config,
            data: Arc::new(data),
            backbone,
            head,
            strategy,
            optimizer,
            device: device.clone(),
        })
    }

    /// Load the dataset from `source`, applying the configured shot cap.
    pub fn from_source(
        config: TaskConfig,
        source: &dyn GraphDatasetSource,
        device: &Device,
    ) -> Result<Self> {
        let data = source.load4graph(&config.dataset_name, config.shot_num)?;
        Self::new(config, data, device)
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    pub fn data(&self) -> &GraphTaskData {
        &self.data
    }

    pub fn backbone(&self) -> &Backbone {
        &self.backbone
    }

    pub fn head(&self) -> &AnsweringHead {
        &self.head
    }

    pub fn strategy(&self) -> &dyn PromptStrategy {
        self.strategy.as_ref()
    }

    /// One training epoch; returns the mean batch loss.
    pub fn train(&mut self, loader: &mut DataLoader<'_>) -> Result<f64> {
        self.strategy.begin_epoch();
        let mut total = 0.0;
        let mut steps = 0usize;
        for batch in loader.epoch() {
            let batch = batch?;
            let loss = self.strategy.train_step(&batch, &self.backbone, &self.head)?;
            self.optimizer.backward_step(&loss)?;
            total += loss.to_scalar::<f32>()? as f64;
            steps += 1;
        }
        self.strategy.end_epoch()?;
        Ok(if steps == 0 { 0.0 } else { total / steps as f64 })
    }

    /// Accuracy of the strategy's predictions over `loader`.
    pub fn test(&self, loader: &mut DataLoader<'_>) -> Result<f64> {
        let (preds, targets) =
            collect_predictions(self.strategy.as_ref(), loader, &self.backbone, &self.head)?;
        Ok(accuracy(&preds, &targets))
    }

    /// Accuracy and macro-F1 of the strategy's predictions over `loader`.
    pub fn acc_f1_over_batches(&self, loader: &mut DataLoader<'_>) -> Result<Evaluation> {
        acc_f1(self.strategy.as_ref(), loader, &self.backbone, &self.head)
    }

    /// Gprompt evaluation without the answering head: each graph goes to
    /// the class centroid (from the last training epoch) with the highest
    /// cosine similarity to its prompted embedding.
    pub fn gprompt_test(&self, loader: &mut DataLoader<'_>) -> Result<f64> {
        if self.strategy.kind() != PromptKind::Gprompt {
            return Err(Error::UnsupportedPrompt(format!(
                "centroid evaluation needs Gprompt, task uses {}",
                self.strategy.kind()
            )));
        }
        let centroids = self
            .strategy
            .class_centroids()
            .ok_or_else(|| {
                Error::InvalidConfig("no class centroids before the first training epoch".into())
            })?;
        let centroids = unit_rows(centroids)?;

        let mut preds = Vec::with_capacity(loader.dataset_len());
        let mut targets = Vec::with_capacity(loader.dataset_len());
        for batch in loader.epoch() {
            let batch = batch?;
            let out = self.backbone.forward(&batch, self.strategy.readout_prompt())?;
            let sim = unit_rows(&out)?.matmul(&centroids.t()?)?;
            preds.extend(sim.argmax(1)?.to_vec1::<u32>()?);
            targets.extend(batch.labels.iter().flatten().copied());
        }
        Ok(accuracy(&preds, &targets))
    }

    /// Run epochs `1..epochs`, keeping the test accuracy of the epoch with
    /// the best validation accuracy. Ties do not replace an earlier epoch.
    pub fn run(&mut self) -> Result<RunReport> {
        if self.strategy.kind() == PromptKind::Gppt {
            return Err(Error::UnsupportedPrompt(
                "gppt has no downstream training routine".into(),
            ));
        }
        let data = Arc::clone(&self.data);
        let batch_size = self.config.batch_size;
        let mut train_loader =
            DataLoader::shuffled(&data.train, batch_size, self.config.seed, &self.device)?;
        let mut test_loader = DataLoader::new(&data.test, batch_size, &self.device)?;
        let mut val_loader = DataLoader::new(&data.val, batch_size, &self.device)?;
        info!("prepare data is finished!");

        let mut best_val_acc = 0.0;
        let mut final_test_acc = 0.0;
        let mut epochs = Vec::new();
        for epoch in 1..self.config.epochs {
            let loss = self.train(&mut train_loader)?;
            let test = self.strategy.evaluate(&mut test_loader, &self.backbone, &self.head)?;
            let val = self.strategy.evaluate(&mut val_loader, &self.backbone, &self.head)?;
            if val.accuracy > best_val_acc {
                best_val_acc = val.accuracy;
                final_test_acc = test.accuracy;
            }
            info!(
                "Epoch {epoch:03} | Loss {loss:.4} | val Accuracy {:.4} | test Accuracy {:.4}",
                val.accuracy, test.accuracy
            );
            epochs.push(EpochRecord { epoch, loss, val, test });
        }
        info!("Final Test: {final_test_acc:.4}");
        info!("Graph Task completed");

        Ok(RunReport {
            epochs,
            best_val_acc,
            final_test_acc,
        })
    }
}
