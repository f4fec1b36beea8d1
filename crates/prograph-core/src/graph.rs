//! Graphs and collated graph batches.
//!
//! A [`Graph`] is host-side data: a row-major feature matrix, a directed edge
//! list and an optional graph label. A [`GraphBatch`] is what a backbone
//! consumes: the node features of several graphs stacked into one tensor,
//! edges shifted by each graph's node offset, and a batch-assignment vector
//! mapping every node row to its graph.
//!
//! Message passing runs over dense adjacency matrices. For an edge
//! `(src, dst)` the adjacency entry `A[dst, src]` is set, so `A @ H` sums the
//! messages arriving at every node.
//!
//! ```text
//! graph 0: 0 -> 1         x = [x0_0; x0_1; x1_0; x1_1; x1_2]
//! graph 1: 0 -> 2   ==>   edges = [(0,1), (2,4)]
//!                         batch = [0, 0, 1, 1, 1]
//! ```

use crate::{Error, Result};
use candle_core::{Device, Tensor};
use serde::{Deserialize, Serialize};

/// A single graph with node features, edges and an optional class label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    /// Number of nodes.
    pub num_nodes: usize,
    /// Width of every node feature row.
    pub feature_dim: usize,
    /// Row-major node features (`num_nodes * feature_dim`).
    pub features: Vec<f32>,
    /// Directed edges as `(src, dst)` node indices.
    pub edges: Vec<(usize, usize)>,
    /// Graph-level class label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<u32>,
}

impl Graph {
    /// Build a graph from feature rows.
    pub fn new(
        rows: Vec<Vec<f32>>,
        edges: Vec<(usize, usize)>,
        label: Option<u32>,
    ) -> Result<Self> {
        let num_nodes = rows.len();
        let feature_dim = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != feature_dim) {
            return Err(Error::InvalidGraph("ragged feature rows".into()));
        }
        let graph = Self {
            num_nodes,
            feature_dim,
            features: rows.into_iter().flatten().collect(),
            edges,
            label,
        };
        graph.validate()?;
        Ok(graph)
    }

    /// Check the structural invariants: at least one node, a full feature
    /// matrix, and edge endpoints inside `0..num_nodes`.
    pub fn validate(&self) -> Result<()> {
        if self.num_nodes == 0 {
            return Err(Error::InvalidGraph("graph has no nodes".into()));
        }
        if self.features.len() != self.num_nodes * self.feature_dim {
            return Err(Error::InvalidGraph(format!(
                "expected {} feature values for {} nodes, got {}",
                self.num_nodes * self.feature_dim,
                self.num_nodes,
                self.features.len()
            )));
        }
        check_edges(&self.edges, self.num_nodes)
    }

    /// Number of edges.
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Feature row of node `i`.
    pub fn feature_row(&self, i: usize) -> &[f32] {
        &self.features[i * self.feature_dim..(i + 1) * self.feature_dim]
    }
}

fn check_edges(edges: &[(usize, usize)], num_nodes: usize) -> Result<()> {
    for &(src, dst) in edges {
        if src >= num_nodes || dst >= num_nodes {
            return Err(Error::InvalidGraph(format!(
                "edge ({src}, {dst}) references a node outside 0..{num_nodes}"
            )));
        }
    }
    Ok(())
}

/// Several graphs collated into one disjoint union.
#[derive(Debug, Clone)]
pub struct GraphBatch {
    /// Node features (N x F).
    pub x: Tensor,
    /// Edges with node offsets applied.
    pub edges: Vec<(usize, usize)>,
    /// Graph index of every node row, contiguous in `0..num_graphs`.
    pub batch: Vec<usize>,
    /// Number of graphs in the batch.
    pub num_graphs: usize,
    /// Graph labels, present when every graph carries one.
    pub labels: Option<Vec<u32>>,
    adjacency: Tensor,
    norm_adjacency: Tensor,
    pool: Tensor,
}

impl GraphBatch {
    /// Collate graphs into a batch on `device`.
    pub fn collate<'g, I>(graphs: I, device: &Device) -> Result<Self>
    where
        I: IntoIterator<Item = &'g Graph>,
    {
        let mut features = Vec::new();
        let mut edges = Vec::new();
        let mut batch = Vec::new();
        let mut labels = Vec::new();
        let mut all_labelled = true;
        let mut feature_dim = None;
        let mut offset = 0;

        for (graph_id, graph) in graphs.into_iter().enumerate() {
            graph.validate()?;
            match feature_dim {
                None => feature_dim = Some(graph.feature_dim),
                Some(dim) if dim != graph.feature_dim => {
                    return Err(Error::InvalidGraph(format!(
                        "feature width {} does not match batch width {dim}",
                        graph.feature_dim
                    )));
                }
                Some(_) => {}
            }
            features.extend_from_slice(&graph.features);
            edges.extend(graph.edges.iter().map(|&(s, d)| (s + offset, d + offset)));
            batch.extend(std::iter::repeat(graph_id).take(graph.num_nodes));
            match graph.label {
                Some(label) => labels.push(label),
                None => all_labelled = false,
            }
            offset += graph.num_nodes;
        }

        let Some(feature_dim) = feature_dim else {
            return Err(Error::InvalidGraph("cannot collate an empty graph list".into()));
        };
        let x = Tensor::from_vec(features, (offset, feature_dim), device)?;
        let labels = all_labelled.then_some(labels);
        Self::from_parts(x, edges, batch, labels)
    }

    /// Assemble a batch from an existing feature tensor.
    ///
    /// `x` is used as-is, so a tensor derived from trainable variables keeps
    /// its gradient path (prompt token graphs are built this way).
    pub fn from_parts(
        x: Tensor,
        edges: Vec<(usize, usize)>,
        batch: Vec<usize>,
        labels: Option<Vec<u32>>,
    ) -> Result<Self> {
        let (n, _) = x.dims2()?;
        if batch.len() != n {
            return Err(Error::InvalidGraph(format!(
                "batch assignment has {} entries for {n} nodes",
                batch.len()
            )));
        }
        check_edges(&edges, n)?;
        let num_graphs = batch.iter().max().map_or(0, |&b| b + 1);
        let mut counts = vec![0usize; num_graphs];
        for &b in &batch {
            counts[b] += 1;
        }
        if num_graphs == 0 || counts.contains(&0) {
            return Err(Error::InvalidGraph(
                "batch assignment must cover 0..B-1 without gaps".into(),
            ));
        }
        if let Some(labels) = &labels {
            if labels.len() != num_graphs {
                return Err(Error::InvalidGraph(format!(
                    "{} labels for {num_graphs} graphs",
                    labels.len()
                )));
            }
        }

        let device = x.device().clone();
        let adjacency = dense_adjacency(&edges, n);
        let norm_adjacency = gcn_normalize(&adjacency, n);
        let mut pool = vec![0f32; num_graphs * n];
        for (node, &b) in batch.iter().enumerate() {
            pool[b * n + node] = 1.0 / counts[b] as f32;
        }

        Ok(Self {
            x,
            edges,
            batch,
            num_graphs,
            labels,
            adjacency: Tensor::from_vec(adjacency, (n, n), &device)?,
            norm_adjacency: Tensor::from_vec(norm_adjacency, (n, n), &device)?,
            pool: Tensor::from_vec(pool, (num_graphs, n), &device)?,
        })
    }

    /// Same structure with replaced node features (N x F').
    pub fn with_features(&self, x: Tensor) -> Result<Self> {
        let (n, _) = x.dims2()?;
        if n != self.num_nodes() {
            return Err(Error::InvalidGraph(format!(
                "replacement features have {n} rows, batch has {} nodes",
                self.num_nodes()
            )));
        }
        Ok(Self { x, ..self.clone() })
    }

    /// Total node count.
    pub fn num_nodes(&self) -> usize {
        self.batch.len()
    }

    /// Device the batch lives on.
    pub fn device(&self) -> &Device {
        self.x.device()
    }

    /// Raw adjacency (N x N), `A[dst, src] = 1`.
    pub fn adjacency(&self) -> &Tensor {
        &self.adjacency
    }

    /// `D^{-1/2} (A + I) D^{-1/2}` (N x N).
    pub fn norm_adjacency(&self) -> &Tensor {
        &self.norm_adjacency
    }

    /// Mean-pooling matrix (B x N); `pool @ H` is the per-graph mean of `H`.
    pub fn pool(&self) -> &Tensor {
        &self.pool
    }

    /// Graph labels as a `u32` tensor of length B.
    pub fn label_tensor(&self) -> Result<Tensor> {
        let labels = self
            .labels
            .as_ref()
            .ok_or_else(|| Error::InvalidGraph("batch has unlabelled graphs".into()))?;
        Ok(Tensor::from_slice(labels.as_slice(), labels.len(), self.device())?)
    }
}

fn dense_adjacency(edges: &[(usize, usize)], n: usize) -> Vec<f32> {
    let mut adj = vec![0f32; n * n];
    for &(src, dst) in edges {
        adj[dst * n + src] = 1.0;
    }
    adj
}

fn gcn_normalize(adj: &[f32], n: usize) -> Vec<f32> {
    let mut a_hat = adj.to_vec();
    for i in 0..n {
        a_hat[i * n + i] = 1.0;
    }
    let inv_sqrt_deg: Vec<f32> = (0..n)
        .map(|i| {
            let deg: f32 = a_hat[i * n..(i + 1) * n].iter().sum();
            1.0 / deg.sqrt()
        })
        .collect();
    for i in 0..n {
        for j in 0..n {
            a_hat[i * n + j] *= inv_sqrt_deg[i] * inv_sqrt_deg[j];
        }
    }
    a_hat
}
