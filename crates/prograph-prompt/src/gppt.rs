//! GPPT structure and task tokens.
//!
//! GPPT frames node classification as link prediction between a node's
//! neighborhood summary and a set of task tokens. Nodes are first routed to
//! one of `center_num` structure clusters; each cluster owns its own task
//! token matrix, whose rows are class prototypes.
//!
//! Only initialization is wired into tasks: [`GpptPrompt::weight_init`]
//! seeds both token sets from pretrained embeddings of the training nodes.
//!
//! # Reference
//!
//! Sun et al., "GPPT: Graph Pre-training and Prompt Tuning to Generalize
//! Graph Neural Networks", KDD 2022.

use crate::{Error, Result};
use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{Init, VarMap};
use tracing::debug;

const KMEANS_ITERS: usize = 50;

pub struct GpptPrompt {
    hid_dim: usize,
    center_num: usize,
    n_classes: usize,
    varmap: VarMap,
    device: Device,
}

impl GpptPrompt {
    pub fn new(
        hid_dim: usize,
        center_num: usize,
        n_classes: usize,
        device: &Device,
    ) -> Result<Self> {
        if hid_dim == 0 || center_num == 0 || n_classes == 0 {
            return Err(Error::InvalidConfig(format!(
                "gppt sizes must be positive \
                 (hid {hid_dim}, centers {center_num}, classes {n_classes})"
            )));
        }
        let varmap = VarMap::new();
        let init = Init::Randn { mean: 0.0, stdev: 0.1 };
        varmap.get((center_num, hid_dim), "structure_token", init, DType::F32, device)?;
        for i in 0..center_num {
            varmap.get((n_classes, hid_dim), &task_token_name(i), init, DType::F32, device)?;
        }
        Ok(Self {
            hid_dim,
            center_num,
            n_classes,
            varmap,
            device: device.clone(),
        })
    }

    /// Seed the tokens from pretrained node embeddings.
    ///
    /// Embeddings are first averaged over each node's closed in-neighborhood.
    /// The structure token becomes the k-means centers of the training nodes'
    /// summaries; every task token becomes the per-class mean summary (zero
    /// for a class without training nodes).
    pub fn weight_init(
        &mut self,
        node_embedding: &Tensor,
        edges: &[(usize, usize)],
        labels: &[u32],
        train_ids: &[usize],
    ) -> Result<()> {
        let h = node_embedding.detach().to_vec2::<f32>()?;
        let n = h.len();
        if h.first().is_some_and(|row| row.len() != self.hid_dim) {
            return Err(Error::InvalidConfig(format!(
                "node embeddings are {} wide, gppt tokens are {}",
                h[0].len(),
                self.hid_dim
            )));
        }
        if labels.len() != n {
            return Err(Error::InvalidConfig(format!("{} labels for {n} nodes", labels.len())));
        }
        if let Some(&(src, dst)) = edges.iter().find(|&&(s, d)| s >= n || d >= n) {
            return Err(Error::InvalidConfig(format!("edge ({src}, {dst}) outside {n} nodes")));
        }
        if let Some(&bad) = train_ids.iter().find(|&&i| i >= n) {
            return Err(Error::InvalidConfig(format!("training node {bad} outside {n} nodes")));
        }
        if let Some(&bad) = train_ids
            .iter()
            .map(|&i| &labels[i])
            .find(|&&l| l as usize >= self.n_classes)
        {
            return Err(Error::InvalidConfig(format!(
                "label {bad} outside 0..{}",
                self.n_classes
            )));
        }
        let summary = neighborhood_mean(&h, edges);

        let features: Vec<&[f32]> = train_ids.iter().map(|&i| summary[i].as_slice()).collect();
        if features.len() < self.center_num {
            return Err(Error::InvalidConfig(format!(
                "{} training nodes cannot seed {} structure centers",
                features.len(),
                self.center_num
            )));
        }

        let centers = kmeans(&features, self.center_num, KMEANS_ITERS);
        let centers = Tensor::from_vec(
            centers.concat(),
            (self.center_num, self.hid_dim),
            &self.device,
        )?;
        self.varmap.set_one("structure_token", &centers)?;

        let mut sums = vec![vec![0f32; self.hid_dim]; self.n_classes];
        let mut counts = vec![0usize; self.n_classes];
        for (&i, feature) in train_ids.iter().zip(&features) {
            let class = labels[i] as usize;
            counts[class] += 1;
            for (s, v) in sums[class].iter_mut().zip(feature.iter()) {
                *s += v;
            }
        }
        for (sum, &count) in sums.iter_mut().zip(&counts) {
            if count > 0 {
                sum.iter_mut().for_each(|s| *s /= count as f32);
            }
        }
        let prototypes = Tensor::from_vec(
            sums.concat(),
            (self.n_classes, self.hid_dim),
            &self.device,
        )?;
        for i in 0..self.center_num {
            self.varmap.set_one(task_token_name(i), &prototypes)?;
        }
        debug!(centers = self.center_num, classes = self.n_classes, "initialized gppt tokens");
        Ok(())
    }

    /// Class scores (N x n_classes): each node's neighborhood summary scored
    /// against the task token of its closest structure center.
    pub fn forward(&self, node_embedding: &Tensor, adjacency: &Tensor) -> Result<Tensor> {
        let n = node_embedding.dim(0)?;
        let a_hat = (adjacency + Tensor::eye(n, DType::F32, adjacency.device())?)?;
        let deg = a_hat.sum_keepdim(1)?;
        let summary = a_hat.matmul(node_embedding)?.broadcast_div(&deg)?;

        let structure = self.token("structure_token")?;
        let cluster = summary.matmul(&structure.t()?)?.argmax(1)?.to_vec1::<u32>()?;
        let mut one_hot = vec![0f32; n * self.center_num];
        for (node, &k) in cluster.iter().enumerate() {
            one_hot[node * self.center_num + k as usize] = 1.0;
        }
        let one_hot = Tensor::from_vec(one_hot, (n, self.center_num), adjacency.device())?;

        let mut scores = Tensor::zeros((n, self.n_classes), DType::F32, adjacency.device())?;
        for k in 0..self.center_num {
            let task = self.token(&task_token_name(k))?;
            let routed = summary.matmul(&task.t()?)?.broadcast_mul(&one_hot.narrow(1, k, 1)?)?;
            scores = (scores + routed)?;
        }
        Ok(scores)
    }

    /// Current value of a token matrix.
    pub fn token(&self, name: &str) -> Result<Tensor> {
        let data = self
            .varmap
            .data()
            .lock()
            .map_err(|_| Error::InvalidConfig("gppt parameter map poisoned".into()))?;
        data.get(name)
            .map(|v| v.as_tensor().clone())
            .ok_or_else(|| Error::InvalidConfig(format!("no gppt token named {name}")))
    }

    pub fn vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }
}

fn task_token_name(i: usize) -> String {
    format!("task_token.{i}")
}

/// Mean of each node's embedding and its in-neighbors' embeddings.
fn neighborhood_mean(h: &[Vec<f32>], edges: &[(usize, usize)]) -> Vec<Vec<f32>> {
    let mut out = h.to_vec();
    let mut counts = vec![1usize; h.len()];
    for &(src, dst) in edges {
        counts[dst] += 1;
        for (o, v) in out[dst].iter_mut().zip(&h[src]) {
            *o += v;
        }
    }
    for (row, &c) in out.iter_mut().zip(&counts) {
        row.iter_mut().for_each(|v| *v /= c as f32);
    }
    out
}

/// Lloyd's k-means seeded with evenly spaced points.
fn kmeans(points: &[&[f32]], k: usize, iters: usize) -> Vec<Vec<f32>> {
    let dim = points[0].len();
    let step = points.len() / k;
    let mut centers: Vec<Vec<f32>> = (0..k).map(|i| points[i * step].to_vec()).collect();
    let mut assign = vec![usize::MAX; points.len()];

    for _ in 0..iters {
        let mut changed = false;
        for (p, slot) in points.iter().zip(assign.iter_mut()) {
            let nearest = centers
                .iter()
                .enumerate()
                .map(|(c, center)| (c, sq_dist(p, center)))
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map_or(0, |(c, _)| c);
            if *slot != nearest {
                *slot = nearest;
                changed = true;
            }
        }
        if !changed {
            break;
        }
        let mut sums = vec![vec![0f32; dim]; k];
        let mut counts = vec![0usize; k];
        for (p, &c) in points.iter().zip(&assign) {
            counts[c] += 1;
            for (s, v) in sums[c].iter_mut().zip(p.iter()) {
                *s += v;
            }
        }
        for c in 0..k {
            // An emptied cluster keeps its previous center
            if counts[c] > 0 {
                centers[c] = sums[c].iter().map(|s| s / counts[c] as f32).collect();
            }
        }
    }
    centers
}

fn sq_dist(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
