//! Small synthetic graph classification datasets.
//!
//! Graph `i` belongs to class `i % num_classes`. Class `c` graphs are rings
//! when `c` is even and stars when `c` is odd, and their node features are
//! noisy one-hot vectors peaked at dimension `c % feature_dim`. Both structure
//! and features carry the class, so any backbone can separate them.

use crate::{Graph, GraphTaskData, NodeData, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Generator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticGraphs {
    /// Number of graphs (default: 20).
    pub num_graphs: usize,
    /// Number of classes (default: 2).
    pub num_classes: usize,
    /// Node feature width (default: 4).
    pub feature_dim: usize,
    /// Smallest graph (default: 4 nodes).
    pub min_nodes: usize,
    /// Largest graph (default: 8 nodes).
    pub max_nodes: usize,
    /// Feature noise standard deviation (default: 0.1).
    pub noise: f32,
    /// Random seed (default: 7).
    pub seed: u64,
}

impl Default for SyntheticGraphs {
    fn default() -> Self {
        Self {
            num_graphs: 20,
            num_classes: 2,
            feature_dim: 4,
            min_nodes: 4,
            max_nodes: 8,
            noise: 0.1,
            seed: 7,
        }
    }
}

impl SyntheticGraphs {
    pub fn with_num_graphs(mut self, n: usize) -> Self {
        self.num_graphs = n;
        self
    }

    pub fn with_num_classes(mut self, n: usize) -> Self {
        self.num_classes = n;
        self
    }

    pub fn with_feature_dim(mut self, dim: usize) -> Self {
        self.feature_dim = dim;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Generate the labelled graph list.
    pub fn generate(&self) -> Result<Vec<Graph>> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let noise = Normal::new(0.0f32, self.noise.max(0.0)).map_err(|e| {
            crate::Error::InvalidConfig(format!("noise distribution: {e}"))
        })?;
        let min = self.min_nodes.max(2);
        let max = self.max_nodes.max(min);

        (0..self.num_graphs)
            .map(|i| {
                let class = (i % self.num_classes.max(1)) as u32;
                let n = rng.gen_range(min..=max);
                let rows = (0..n)
                    .map(|_| {
                        (0..self.feature_dim)
                            .map(|d| {
                                let peak = if d == class as usize % self.feature_dim {
                                    1.0
                                } else {
                                    0.0
                                };
                                peak + noise.sample(&mut rng)
                            })
                            .collect()
                    })
                    .collect();
                let edges = if class % 2 == 0 { ring(n) } else { star(n) };
                Graph::new(rows, edges, Some(class))
            })
            .collect()
    }

    /// Generate and split 60/20/20 into train/val/test by position.
    pub fn task_data(&self) -> Result<GraphTaskData> {
        let mut data = GraphTaskData {
            input_dim: self.feature_dim,
            output_dim: self.num_classes,
            train: Vec::new(),
            test: Vec::new(),
            val: Vec::new(),
        };
        for (i, graph) in self.generate()?.into_iter().enumerate() {
            match (i / self.num_classes.max(1)) % 5 {
                3 => data.val.push(graph),
                4 => data.test.push(graph),
                _ => data.train.push(graph),
            }
        }
        Ok(data)
    }

    /// One graph made of all generated graphs side by side, labelled per node
    /// with its graph's class; every other node is a training node.
    pub fn node_data(&self) -> Result<NodeData> {
        let graphs = self.generate()?;
        let mut rows = Vec::new();
        let mut edges = Vec::new();
        let mut labels = Vec::new();
        for graph in &graphs {
            let offset = rows.len();
            rows.extend((0..graph.num_nodes).map(|i| graph.feature_row(i).to_vec()));
            edges.extend(graph.edges.iter().map(|&(s, d)| (s + offset, d + offset)));
            labels.extend(std::iter::repeat(graph.label.unwrap_or(0)).take(graph.num_nodes));
        }
        let train_mask = (0..labels.len()).map(|i| i % 2 == 0).collect();
        Ok(NodeData {
            graph: Graph::new(rows, edges, None)?,
            labels,
            train_mask,
            num_classes: self.num_classes,
        })
    }
}

fn ring(n: usize) -> Vec<(usize, usize)> {
    (0..n)
        .flat_map(|i| {
            let j = (i + 1) % n;
            [(i, j), (j, i)]
        })
        .collect()
}

fn star(n: usize) -> Vec<(usize, usize)> {
    (1..n).flat_map(|i| [(0, i), (i, 0)]).collect()
}
