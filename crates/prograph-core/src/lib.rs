//! Graph data plumbing for graph prompt learning.
//!
//! `prograph-core` owns everything that happens before a tensor reaches a GNN:
//! individual [`Graph`]s, their collation into a [`GraphBatch`] (concatenated
//! node features, offset edges, batch assignment, dense adjacency and a
//! mean-pooling matrix), the [`DataLoader`] that walks a graph list in
//! fixed-size batches, and the dataset sources behind `load4graph` /
//! `load4node`.
//!
//! # Example
//!
//! ```rust,ignore
//! use prograph_core::{DataLoader, SyntheticGraphs};
//! use candle_core::Device;
//!
//! let data = SyntheticGraphs::default().task_data()?;
//! let mut loader = DataLoader::new(&data.train, 16, &Device::Cpu)?;
//! for batch in loader.epoch() {
//!     let batch = batch?;
//!     assert_eq!(batch.x.dims()[1], data.input_dim);
//! }
//! ```

pub mod dataset;
pub mod error;
pub mod graph;
pub mod loader;
pub mod synthetic;

pub use dataset::{GraphDatasetSource, GraphTaskData, JsonDatasetDir, NodeData};
pub use error::{Error, Result};
pub use graph::{Graph, GraphBatch};
pub use loader::DataLoader;
pub use synthetic::SyntheticGraphs;
