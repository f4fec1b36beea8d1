//! One [`PromptStrategy`] per prompt family.

use super::strategy::{acc_f1, argmax_rows, labels_of, Evaluation, PromptStrategy};
use crate::loss::{center_embedding, prompt_tuning_loss};
use crate::{Error, Result};
use candle_core::{Device, Tensor, Var, D};
use candle_nn::{loss, ops, ParamsAdamW};
use prograph_core::{DataLoader, Graph, GraphBatch, NodeData};
use prograph_nn::{AnsweringHead, Backbone, ReadoutPrompt};
use prograph_prompt::{Gpf, GpfPlus, GpptPrompt, Gprompt, LightPrompt, PromptKind};
use tracing::debug;

/// ProG learning rate.
const PROG_LR: f64 = 0.001;
/// ProG weight decay.
const PROG_DECAY: f64 = 1e-5;

/// Fine-tune backbone and head with plain cross entropy.
pub struct NoPrompt;

impl PromptStrategy for NoPrompt {
    fn kind(&self) -> PromptKind {
        PromptKind::None
    }

    fn trainable_vars(&self, backbone: &Backbone, head: &AnsweringHead) -> Vec<Var> {
        let mut vars = backbone.vars();
        vars.extend(head.vars());
        vars
    }

    fn train_step(
        &mut self,
        batch: &GraphBatch,
        backbone: &Backbone,
        head: &AnsweringHead,
    ) -> Result<Tensor> {
        let probs = head.forward(&backbone.forward(batch, None)?)?;
        Ok(loss::cross_entropy(&probs, &batch.label_tensor()?)?)
    }

    fn predict(
        &self,
        batch: &GraphBatch,
        backbone: &Backbone,
        head: &AnsweringHead,
    ) -> Result<Vec<u32>> {
        argmax_rows(&head.forward(&backbone.forward(batch, None)?)?)
    }
}

/// ProG: classify by similarity to per-class prompt graphs embedded with
/// the frozen backbone. The answering head is unused.
pub struct ProgStrategy {
    prompt: LightPrompt,
}

impl ProgStrategy {
    pub fn new(prompt: LightPrompt) -> Self {
        Self { prompt }
    }

    pub fn prompt(&self) -> &LightPrompt {
        &self.prompt
    }

    /// softmax(emb(batch) @ emb(prompt graphs)^T), one column per class.
    fn class_similarity(
        &self,
        batch: &GraphBatch,
        prompt_graphs: &GraphBatch,
        backbone: &Backbone,
    ) -> Result<Tensor> {
        let emb0 = backbone.forward(batch, None)?;
        let pg_emb = backbone.forward(prompt_graphs, None)?;
        let dot = emb0.matmul(&pg_emb.t()?)?;
        Ok(ops::softmax(&dot, D::Minus1)?)
    }
}

impl PromptStrategy for ProgStrategy {
    fn kind(&self) -> PromptKind {
        PromptKind::ProG
    }

    fn trainable_vars(&self, _backbone: &Backbone, _head: &AnsweringHead) -> Vec<Var> {
        self.prompt.vars()
    }

    fn optimizer_params(&self) -> ParamsAdamW {
        ParamsAdamW {
            lr: PROG_LR,
            weight_decay: PROG_DECAY,
            ..Default::default()
        }
    }

    fn train_step(
        &mut self,
        batch: &GraphBatch,
        backbone: &Backbone,
        _head: &AnsweringHead,
    ) -> Result<Tensor> {
        let prompt_graphs = self.prompt.inner_structure_update()?;
        let sim = self.class_similarity(batch, &prompt_graphs, backbone)?;
        Ok(loss::cross_entropy(&sim, &batch.label_tensor()?)?)
    }

    fn predict(
        &self,
        batch: &GraphBatch,
        backbone: &Backbone,
        _head: &AnsweringHead,
    ) -> Result<Vec<u32>> {
        let prompt_graphs = self.prompt.token_view()?;
        argmax_rows(&self.class_similarity(batch, &prompt_graphs, backbone)?)
    }

    fn evaluate(
        &self,
        loader: &mut DataLoader<'_>,
        backbone: &Backbone,
        head: &AnsweringHead,
    ) -> Result<Evaluation> {
        acc_f1(self, loader, backbone, head)
    }
}

/// A feature-space prompt, either GPF or GPF-plus.
pub enum FeaturePrompt {
    Gpf(Gpf),
    Plus(GpfPlus),
}

impl FeaturePrompt {
    fn add(&self, x: &Tensor) -> Result<Tensor> {
        Ok(match self {
            FeaturePrompt::Gpf(p) => p.add(x)?,
            FeaturePrompt::Plus(p) => p.add(x)?,
        })
    }

    fn vars(&self) -> Vec<Var> {
        match self {
            FeaturePrompt::Gpf(p) => p.vars(),
            FeaturePrompt::Plus(p) => p.vars(),
        }
    }
}

/// GPF / GPF-plus: rewrite node features, then classify with the head.
pub struct GpfStrategy {
    prompt: FeaturePrompt,
}

impl GpfStrategy {
    pub fn new(prompt: FeaturePrompt) -> Self {
        Self { prompt }
    }

    fn class_probs(
        &self,
        batch: &GraphBatch,
        backbone: &Backbone,
        head: &AnsweringHead,
    ) -> Result<Tensor> {
        let prompted = batch.with_features(self.prompt.add(&batch.x)?)?;
        Ok(head.forward(&backbone.forward(&prompted, None)?)?)
    }
}

impl PromptStrategy for GpfStrategy {
    fn kind(&self) -> PromptKind {
        match self.prompt {
            FeaturePrompt::Gpf(_) => PromptKind::Gpf,
            FeaturePrompt::Plus(_) => PromptKind::GpfPlus,
        }
    }

    fn trainable_vars(&self, _backbone: &Backbone, head: &AnsweringHead) -> Vec<Var> {
        let mut vars = self.prompt.vars();
        vars.extend(head.vars());
        vars
    }

    fn train_step(
        &mut self,
        batch: &GraphBatch,
        backbone: &Backbone,
        head: &AnsweringHead,
    ) -> Result<Tensor> {
        let probs = self.class_probs(batch, backbone, head)?;
        Ok(loss::cross_entropy(&probs, &batch.label_tensor()?)?)
    }

    fn predict(
        &self,
        batch: &GraphBatch,
        backbone: &Backbone,
        head: &AnsweringHead,
    ) -> Result<Vec<u32>> {
        argmax_rows(&self.class_probs(batch, backbone, head)?)
    }
}

/// Gprompt: train only the readout mask, pulling each graph embedding
/// toward its class centroid.
///
/// Centroids are recomputed per batch for the loss; their count-weighted
/// mean over an epoch is kept for centroid-based evaluation.
pub struct GpromptStrategy {
    prompt: Gprompt,
    num_classes: usize,
    center_sum: Option<Tensor>,
    counts: Vec<usize>,
    centroids: Option<Tensor>,
}

impl GpromptStrategy {
    pub fn new(prompt: Gprompt, num_classes: usize) -> Self {
        Self {
            prompt,
            num_classes,
            center_sum: None,
            counts: vec![0; num_classes],
            centroids: None,
        }
    }

    fn prompted_embedding(&self, batch: &GraphBatch, backbone: &Backbone) -> Result<Tensor> {
        Ok(backbone.forward(batch, Some(&self.prompt as &dyn ReadoutPrompt))?)
    }
}

impl PromptStrategy for GpromptStrategy {
    fn kind(&self) -> PromptKind {
        PromptKind::Gprompt
    }

    fn trainable_vars(&self, _backbone: &Backbone, _head: &AnsweringHead) -> Vec<Var> {
        self.prompt.vars()
    }

    fn begin_epoch(&mut self) {
        self.center_sum = None;
        self.counts = vec![0; self.num_classes];
    }

    fn end_epoch(&mut self) -> Result<()> {
        if let Some(sum) = &self.center_sum {
            let counts: Vec<f32> = self.counts.iter().map(|&c| c.max(1) as f32).collect();
            let counts = Tensor::from_vec(counts, (self.num_classes, 1), sum.device())?;
            self.centroids = Some(sum.broadcast_div(&counts)?);
        }
        Ok(())
    }

    fn train_step(
        &mut self,
        batch: &GraphBatch,
        backbone: &Backbone,
        _head: &AnsweringHead,
    ) -> Result<Tensor> {
        let out = self.prompted_embedding(batch, backbone)?;
        let labels = labels_of(batch)?;
        let (center, counts) = center_embedding(&out, labels, self.num_classes)?;

        let weights: Vec<f32> = counts.iter().map(|&c| c as f32).collect();
        let weights = Tensor::from_vec(weights, (self.num_classes, 1), out.device())?;
        let weighted = center.detach().broadcast_mul(&weights)?;
        self.center_sum = Some(match self.center_sum.take() {
            Some(sum) => (sum + weighted)?,
            None => weighted,
        });
        for (total, c) in self.counts.iter_mut().zip(&counts) {
            *total += c;
        }

        prompt_tuning_loss(&out, &center, &batch.label_tensor()?)
    }

    fn predict(
        &self,
        batch: &GraphBatch,
        backbone: &Backbone,
        head: &AnsweringHead,
    ) -> Result<Vec<u32>> {
        argmax_rows(&head.forward(&self.prompted_embedding(batch, backbone)?)?)
    }

    fn readout_prompt(&self) -> Option<&dyn ReadoutPrompt> {
        Some(&self.prompt)
    }

    fn class_centroids(&self) -> Option<&Tensor> {
        self.centroids.as_ref()
    }
}

/// GPPT: tokens seeded once from pretrained node embeddings.
///
/// There is no downstream training routine; `train_step` refuses. Graphs are
/// classified by the class with the highest mean node score.
pub struct GpptStrategy {
    prompt: GpptPrompt,
}

impl GpptStrategy {
    /// Seed the tokens from node embeddings of `batch`, with one structure
    /// center per class.
    pub fn new(
        num_classes: usize,
        backbone: &Backbone,
        batch: &GraphBatch,
        node_labels: &[u32],
        train_ids: &[usize],
        device: &Device,
    ) -> Result<Self> {
        let mut prompt = GpptPrompt::new(backbone.out_dim(), num_classes, num_classes, device)?;
        let h = backbone.node_embeddings(batch)?;
        prompt.weight_init(&h, &batch.edges, node_labels, train_ids)?;
        debug!(nodes = train_ids.len(), "seeded gppt prompt");
        Ok(Self { prompt })
    }

    /// Seed from a node classification task: its training nodes and labels.
    pub fn from_node_data(data: &NodeData, backbone: &Backbone, device: &Device) -> Result<Self> {
        data.validate()?;
        let batch = GraphBatch::collate(std::iter::once(&data.graph), device)?;
        Self::new(
            data.num_classes,
            backbone,
            &batch,
            &data.labels,
            &data.train_indices(),
            device,
        )
    }

    /// Seed from labelled training graphs; every node takes its graph's label.
    pub fn from_graphs(
        graphs: &[Graph],
        num_classes: usize,
        backbone: &Backbone,
        device: &Device,
    ) -> Result<Self> {
        let batch = GraphBatch::collate(graphs, device)?;
        let graph_labels = labels_of(&batch)?;
        let node_labels: Vec<u32> = batch.batch.iter().map(|&g| graph_labels[g]).collect();
        let train_ids: Vec<usize> = (0..node_labels.len()).collect();
        Self::new(num_classes, backbone, &batch, &node_labels, &train_ids, device)
    }

    pub fn prompt(&self) -> &GpptPrompt {
        &self.prompt
    }

    /// Per-node class scores (N x C).
    pub fn node_scores(&self, batch: &GraphBatch, backbone: &Backbone) -> Result<Tensor> {
        let h = backbone.node_embeddings(batch)?;
        Ok(self.prompt.forward(&h, batch.adjacency())?)
    }
}

impl PromptStrategy for GpptStrategy {
    fn kind(&self) -> PromptKind {
        PromptKind::Gppt
    }

    fn trainable_vars(&self, _backbone: &Backbone, _head: &AnsweringHead) -> Vec<Var> {
        self.prompt.vars()
    }

    fn train_step(
        &mut self,
        _batch: &GraphBatch,
        _backbone: &Backbone,
        _head: &AnsweringHead,
    ) -> Result<Tensor> {
        Err(Error::UnsupportedPrompt(
            "gppt has no downstream training routine".into(),
        ))
    }

    fn predict(
        &self,
        batch: &GraphBatch,
        backbone: &Backbone,
        _head: &AnsweringHead,
    ) -> Result<Vec<u32>> {
        let scores = self.node_scores(batch, backbone)?;
        argmax_rows(&batch.pool().matmul(&scores)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prograph_core::SyntheticGraphs;
    use prograph_nn::GnnType;

    fn setup() -> (Vec<Graph>, Backbone, AnsweringHead) {
        let graphs = SyntheticGraphs::default().with_num_graphs(6).generate().unwrap();
        let backbone = Backbone::new(GnnType::Gcn, 4, 8, 2, &Device::Cpu).unwrap();
        let head = AnsweringHead::new(8, 2, &Device::Cpu).unwrap();
        (graphs, backbone, head)
    }

    fn finite_scalar(t: &Tensor) -> bool {
        t.dims().is_empty() && t.to_scalar::<f32>().unwrap().is_finite()
    }

    #[test]
    fn test_trainable_groups() {
        let (_, backbone, head) = setup();
        let device = Device::Cpu;
        assert_eq!(NoPrompt.trainable_vars(&backbone, &head).len(), backbone.vars().len() + 2);

        let gpf = GpfStrategy::new(FeaturePrompt::Gpf(Gpf::new(4, &device).unwrap()));
        assert_eq!(gpf.trainable_vars(&backbone, &head).len(), 1 + 2);
        assert_eq!(gpf.kind(), PromptKind::Gpf);

        let prog = ProgStrategy::new(LightPrompt::new(4, 3, 2, 0.01, &device).unwrap());
        assert_eq!(prog.trainable_vars(&backbone, &head).len(), 2);
        assert_eq!(prog.optimizer_params().lr, PROG_LR);

        let gprompt = GpromptStrategy::new(Gprompt::new(8, &device).unwrap(), 2);
        assert_eq!(gprompt.trainable_vars(&backbone, &head).len(), 1);
        assert_eq!(gprompt.optimizer_params().weight_decay, 5e-4);
    }

    #[test]
    fn test_every_trainable_family_yields_a_loss() {
        let (graphs, backbone, head) = setup();
        let device = Device::Cpu;
        let batch = GraphBatch::collate(&graphs, &device).unwrap();
        let mut strategies: Vec<Box<dyn PromptStrategy>> = vec![
            Box::new(NoPrompt),
            Box::new(ProgStrategy::new(LightPrompt::new(4, 3, 2, 0.01, &device).unwrap())),
            Box::new(GpfStrategy::new(FeaturePrompt::Gpf(Gpf::new(4, &device).unwrap()))),
            Box::new(GpfStrategy::new(FeaturePrompt::Plus(GpfPlus::new(4, 5, &device).unwrap()))),
            Box::new(GpromptStrategy::new(Gprompt::new(8, &device).unwrap(), 2)),
        ];
        for strategy in strategies.iter_mut() {
            let loss = strategy.train_step(&batch, &backbone, &head).unwrap();
            assert!(finite_scalar(&loss), "{}", strategy.kind());
            let preds = strategy.predict(&batch, &backbone, &head).unwrap();
            assert_eq!(preds.len(), 6);
            assert!(preds.iter().all(|&p| p < 2));
        }
    }

    #[test]
    fn test_gprompt_centroids_after_epoch() {
        let (graphs, backbone, head) = setup();
        let batch = GraphBatch::collate(&graphs, &Device::Cpu).unwrap();
        let mut strategy = GpromptStrategy::new(Gprompt::new(8, &Device::Cpu).unwrap(), 2);
        assert!(strategy.class_centroids().is_none());

        strategy.begin_epoch();
        strategy.train_step(&batch, &backbone, &head).unwrap();
        strategy.end_epoch().unwrap();
        let centroids = strategy.class_centroids().unwrap();
        assert_eq!(centroids.dims(), &[2, 8]);
        assert!(strategy.readout_prompt().is_some());
    }

    #[test]
    fn test_gppt_seeds_but_refuses_training() {
        let (graphs, backbone, head) = setup();
        let device = Device::Cpu;
        let mut strategy = GpptStrategy::from_graphs(&graphs, 2, &backbone, &device).unwrap();
        let batch = GraphBatch::collate(&graphs, &device).unwrap();

        assert!(matches!(
            strategy.train_step(&batch, &backbone, &head),
            Err(Error::UnsupportedPrompt(_))
        ));
        let scores = strategy.node_scores(&batch, &backbone).unwrap();
        assert_eq!(scores.dims(), &[batch.num_nodes(), 2]);
        assert_eq!(strategy.predict(&batch, &backbone, &head).unwrap().len(), 6);
    }

    #[test]
    fn test_gppt_from_node_task() {
        let data = SyntheticGraphs::default().with_num_graphs(4).node_data().unwrap();
        let backbone = Backbone::new(GnnType::GraphSage, 4, 8, 2, &Device::Cpu).unwrap();
        let strategy = GpptStrategy::from_node_data(&data, &backbone, &Device::Cpu).unwrap();
        assert_eq!(strategy.prompt().vars().len(), 3);
    }

    #[test]
    fn test_gppt_rejects_invalid_node_labels() {
        let mut data = SyntheticGraphs::default().with_num_graphs(4).node_data().unwrap();
        data.labels[0] = 7;
        let backbone = Backbone::new(GnnType::Gcn, 4, 8, 2, &Device::Cpu).unwrap();
        let result = GpptStrategy::from_node_data(&data, &backbone, &Device::Cpu);
        assert!(matches!(result, Err(Error::Data(_))));
    }
}
