//! Dataset sources for graph-level and node-level tasks.
//!
//! Splitting raw collections into train/val/test is owned by whoever writes
//! the dataset file; loaders here only read splits and apply the few-shot cap.

use crate::{Error, Graph, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A graph classification task: dimensions plus train/test/val splits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphTaskData {
    /// Node feature width.
    pub input_dim: usize,
    /// Number of graph classes.
    pub output_dim: usize,
    /// Training graphs.
    pub train: Vec<Graph>,
    /// Test graphs.
    pub test: Vec<Graph>,
    /// Validation graphs.
    pub val: Vec<Graph>,
}

impl GraphTaskData {
    /// Read a task file (JSON).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let data: Self = serde_json::from_reader(BufReader::new(file))?;
        data.validate()?;
        Ok(data)
    }

    /// Write a task file (JSON).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path.as_ref())?;
        serde_json::to_writer(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Every graph of every split, in train/test/val order.
    pub fn all_graphs(&self) -> Vec<Graph> {
        self.train
            .iter()
            .chain(&self.test)
            .chain(&self.val)
            .cloned()
            .collect()
    }

    /// Keep at most `shot_num` training graphs per class.
    pub fn with_shots(mut self, shot_num: usize) -> Self {
        let mut taken: HashMap<u32, usize> = HashMap::new();
        self.train.retain(|g| match g.label {
            Some(label) => {
                let count = taken.entry(label).or_insert(0);
                *count += 1;
                *count <= shot_num
            }
            None => false,
        });
        self
    }

    /// Check dimensions and labels against the declared sizes.
    pub fn validate(&self) -> Result<()> {
        for graph in self.train.iter().chain(&self.test).chain(&self.val) {
            graph.validate()?;
            if graph.feature_dim != self.input_dim {
                return Err(Error::InvalidGraph(format!(
                    "graph feature width {} differs from input_dim {}",
                    graph.feature_dim, self.input_dim
                )));
            }
            match graph.label {
                Some(label) if (label as usize) < self.output_dim => {}
                Some(label) => {
                    return Err(Error::InvalidGraph(format!(
                        "label {label} outside 0..{}",
                        self.output_dim
                    )));
                }
                None => return Err(Error::InvalidGraph("task graph without a label".into())),
            }
        }
        Ok(())
    }
}

/// A node classification task on a single graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeData {
    /// The graph (its `label` is unused).
    pub graph: Graph,
    /// Class of every node.
    pub labels: Vec<u32>,
    /// Nodes available for training.
    pub train_mask: Vec<bool>,
    /// Number of node classes.
    pub num_classes: usize,
}

impl NodeData {
    /// Node feature width.
    pub fn input_dim(&self) -> usize {
        self.graph.feature_dim
    }

    /// Indices of the training nodes.
    pub fn train_indices(&self) -> Vec<usize> {
        self.train_mask
            .iter()
            .enumerate()
            .filter_map(|(i, &m)| m.then_some(i))
            .collect()
    }

    /// Keep at most `shot_num` training nodes per class.
    pub fn with_shots(mut self, shot_num: usize) -> Self {
        let mut taken: HashMap<u32, usize> = HashMap::new();
        for (i, mask) in self.train_mask.iter_mut().enumerate() {
            if *mask {
                let count = taken.entry(self.labels[i]).or_insert(0);
                *count += 1;
                *mask = *count <= shot_num;
            }
        }
        self
    }

    /// Check that labels and mask cover every node.
    pub fn validate(&self) -> Result<()> {
        self.graph.validate()?;
        let n = self.graph.num_nodes;
        if self.labels.len() != n || self.train_mask.len() != n {
            return Err(Error::InvalidGraph(format!(
                "{} labels and {} mask entries for {n} nodes",
                self.labels.len(),
                self.train_mask.len()
            )));
        }
        if let Some(&bad) = self.labels.iter().find(|&&l| l as usize >= self.num_classes) {
            return Err(Error::InvalidGraph(format!(
                "label {bad} outside 0..{}",
                self.num_classes
            )));
        }
        Ok(())
    }
}

/// Where tasks come from.
pub trait GraphDatasetSource {
    /// Graph classification splits, optionally capped to `shot_num` per class.
    fn load4graph(&self, name: &str, shot_num: Option<usize>) -> Result<GraphTaskData>;

    /// Node classification data capped to `shot_num` training nodes per class.
    fn load4node(&self, name: &str, shot_num: usize) -> Result<NodeData>;
}

/// Datasets stored as `{root}/{name}.json` (graph tasks) and
/// `{root}/{name}.node.json` (node tasks).
#[derive(Debug, Clone)]
pub struct JsonDatasetDir {
    root: PathBuf,
}

impl JsonDatasetDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, file_name: String) -> Result<PathBuf> {
        let path = self.root.join(file_name);
        if path.is_file() {
            Ok(path)
        } else {
            Err(Error::DatasetNotFound(path.display().to_string()))
        }
    }
}

impl GraphDatasetSource for JsonDatasetDir {
    fn load4graph(&self, name: &str, shot_num: Option<usize>) -> Result<GraphTaskData> {
        let path = self.path_for(format!("{name}.json"))?;
        let data = GraphTaskData::load(&path)?;
        debug!(
            dataset = name,
            train = data.train.len(),
            test = data.test.len(),
            val = data.val.len(),
            "loaded graph task"
        );
        Ok(match shot_num {
            Some(shots) => data.with_shots(shots),
            None => data,
        })
    }

    fn load4node(&self, name: &str, shot_num: usize) -> Result<NodeData> {
        let path = self.path_for(format!("{name}.node.json"))?;
        let file = File::open(&path)?;
        let data: NodeData = serde_json::from_reader(BufReader::new(file))?;
        data.validate()?;
        Ok(data.with_shots(shot_num))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labelled(label: u32) -> Graph {
        Graph::new(vec![vec![1.0, 0.0]], vec![], Some(label)).unwrap()
    }

    fn task() -> GraphTaskData {
        GraphTaskData {
            input_dim: 2,
            output_dim: 2,
            train: vec![labelled(0), labelled(1), labelled(0), labelled(0)],
            test: vec![labelled(1)],
            val: vec![labelled(0)],
        }
    }

    #[test]
    fn test_shots_cap_per_class() {
        let data = task().with_shots(2);
        let labels: Vec<_> = data.train.iter().map(|g| g.label.unwrap()).collect();
        assert_eq!(labels, vec![0, 1, 0]);
    }

    #[test]
    fn test_validate_rejects_label_out_of_range() {
        let mut data = task();
        data.val.push(labelled(5));
        assert!(data.validate().is_err());
    }

    #[test]
    fn test_json_dir_round_trip_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        task().save(dir.path().join("TOY.json")).unwrap();

        let source = JsonDatasetDir::new(dir.path());
        let data = source.load4graph("TOY", None).unwrap();
        assert_eq!(data.all_graphs().len(), 6);

        let err = source.load4graph("MISSING", None).unwrap_err();
        assert!(matches!(err, Error::DatasetNotFound(_)));
    }

    #[test]
    fn test_node_shots_and_train_indices() {
        let graph = Graph::new(vec![vec![0.0]; 4], vec![(0, 1), (1, 2)], None).unwrap();
        let data = NodeData {
            graph,
            labels: vec![0, 0, 1, 0],
            train_mask: vec![true, true, true, true],
            num_classes: 2,
        };
        data.validate().unwrap();
        assert_eq!(data.with_shots(1).train_indices(), vec![0, 2]);
    }
}
