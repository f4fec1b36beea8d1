//! The capability set every prompt family implements.
//!
//! A [`GraphTask`](super::GraphTask) holds exactly one `Box<dyn PromptStrategy>`
//! and never branches on the prompt type: the strategy decides which
//! variables the optimizer sees, how a batch turns into a loss, and how
//! predictions are made.

use super::variants::{
    FeaturePrompt, GpfStrategy, GpptStrategy, GpromptStrategy, NoPrompt, ProgStrategy,
};
use super::TaskConfig;
use crate::metrics::{accuracy, macro_f1};
use crate::{Error, Result};
use candle_core::{Device, Tensor, Var};
use candle_nn::ParamsAdamW;
use prograph_core::{DataLoader, GraphBatch, GraphTaskData};
use prograph_nn::{AnsweringHead, Backbone, ReadoutPrompt};
use prograph_prompt::{Gpf, GpfPlus, Gprompt, LightPrompt, PromptKind};
use serde::Serialize;

/// Learning rate shared by every family except ProG.
pub(crate) const TUNING_LR: f64 = 0.005;
/// Weight decay shared by every family except ProG.
pub(crate) const TUNING_DECAY: f64 = 5e-4;

/// Scores on one split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Evaluation {
    pub accuracy: f64,
    /// Only reported by similarity-scored prompts.
    pub macro_f1: Option<f64>,
}

pub trait PromptStrategy {
    fn kind(&self) -> PromptKind;

    /// Variables updated by the optimizer; everything else stays frozen.
    fn trainable_vars(&self, backbone: &Backbone, head: &AnsweringHead) -> Vec<Var>;

    fn optimizer_params(&self) -> ParamsAdamW {
        ParamsAdamW {
            lr: TUNING_LR,
            weight_decay: TUNING_DECAY,
            ..Default::default()
        }
    }

    /// Called before the first batch of every training epoch.
    fn begin_epoch(&mut self) {}

    /// Called after the last batch of every training epoch.
    fn end_epoch(&mut self) -> Result<()> {
        Ok(())
    }

    /// Scalar loss of one labelled batch; the caller runs the backward step.
    fn train_step(
        &mut self,
        batch: &GraphBatch,
        backbone: &Backbone,
        head: &AnsweringHead,
    ) -> Result<Tensor>;

    /// Predicted class of every graph in the batch.
    fn predict(
        &self,
        batch: &GraphBatch,
        backbone: &Backbone,
        head: &AnsweringHead,
    ) -> Result<Vec<u32>>;

    /// Score a whole split.
    fn evaluate(
        &self,
        loader: &mut DataLoader<'_>,
        backbone: &Backbone,
        head: &AnsweringHead,
    ) -> Result<Evaluation> {
        let (preds, targets) = collect_predictions(self, loader, backbone, head)?;
        Ok(Evaluation {
            accuracy: accuracy(&preds, &targets),
            macro_f1: None,
        })
    }

    /// Hook applied to node embeddings before readout, if the family has one.
    fn readout_prompt(&self) -> Option<&dyn ReadoutPrompt> {
        None
    }

    /// Class centroids (C x H) from the last training epoch, if tracked.
    fn class_centroids(&self) -> Option<&Tensor> {
        None
    }
}

/// Predictions and true labels over every batch of `loader`.
pub fn collect_predictions<S: PromptStrategy + ?Sized>(
    strategy: &S,
    loader: &mut DataLoader<'_>,
    backbone: &Backbone,
    head: &AnsweringHead,
) -> Result<(Vec<u32>, Vec<u32>)> {
    let mut preds = Vec::with_capacity(loader.dataset_len());
    let mut targets = Vec::with_capacity(loader.dataset_len());
    for batch in loader.epoch() {
        let batch = batch?;
        preds.extend(strategy.predict(&batch, backbone, head)?);
        targets.extend(labels_of(&batch)?.iter().copied());
    }
    Ok((preds, targets))
}

/// Accuracy and macro-F1 over every batch of `loader`.
pub fn acc_f1<S: PromptStrategy + ?Sized>(
    strategy: &S,
    loader: &mut DataLoader<'_>,
    backbone: &Backbone,
    head: &AnsweringHead,
) -> Result<Evaluation> {
    let (preds, targets) = collect_predictions(strategy, loader, backbone, head)?;
    Ok(Evaluation {
        accuracy: accuracy(&preds, &targets),
        macro_f1: Some(macro_f1(&preds, &targets)),
    })
}

pub(crate) fn labels_of(batch: &GraphBatch) -> Result<&[u32]> {
    batch
        .labels
        .as_deref()
        .ok_or_else(|| Error::InvalidConfig("task batches must be labelled".into()))
}

pub(crate) fn argmax_rows(scores: &Tensor) -> Result<Vec<u32>> {
    Ok(scores.argmax(1)?.to_vec1::<u32>()?)
}

/// Construct the strategy named by `config.prompt_type`.
///
/// GPPT initializes its tokens from `backbone` embeddings of the training
/// graphs, so the backbone must already hold its final starting weights.
pub fn build_strategy(
    config: &TaskConfig,
    data: &GraphTaskData,
    backbone: &Backbone,
    device: &Device,
) -> Result<Box<dyn PromptStrategy>> {
    let prompt = &config.prompt;
    Ok(match config.prompt_type {
        PromptKind::None => Box::new(NoPrompt),
        PromptKind::ProG => Box::new(ProgStrategy::new(LightPrompt::new(
            data.input_dim,
            prompt.token_num_per_group,
            data.output_dim,
            prompt.inner_prune,
            device,
        )?)),
        PromptKind::Gpf => Box::new(GpfStrategy::new(FeaturePrompt::Gpf(Gpf::new(
            data.input_dim,
            device,
        )?))),
        PromptKind::GpfPlus => Box::new(GpfStrategy::new(FeaturePrompt::Plus(GpfPlus::new(
            data.input_dim,
            prompt.p_num,
            device,
        )?))),
        PromptKind::Gprompt => Box::new(GpromptStrategy::new(
            Gprompt::new(config.hid_dim, device)?,
            data.output_dim,
        )),
        PromptKind::Gppt => Box::new(GpptStrategy::from_graphs(
            &data.train,
            data.output_dim,
            backbone,
            device,
        )?),
    })
}
