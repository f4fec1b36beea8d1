//! Fixed-size batching over a graph list.

use crate::{Error, Graph, GraphBatch, Result};
use candle_core::Device;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Walks a graph list in batches of `batch_size`; the last batch may be short.
///
/// With [`DataLoader::shuffled`] the visiting order is redrawn at the start of
/// every epoch from a seeded RNG, so two loaders with the same seed produce
/// the same sequence of batches.
pub struct DataLoader<'a> {
    graphs: &'a [Graph],
    batch_size: usize,
    rng: Option<StdRng>,
    device: Device,
}

impl<'a> DataLoader<'a> {
    /// In-order loader.
    pub fn new(graphs: &'a [Graph], batch_size: usize, device: &Device) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be positive".into()));
        }
        Ok(Self {
            graphs,
            batch_size,
            rng: None,
            device: device.clone(),
        })
    }

    /// Loader that reshuffles every epoch.
    pub fn shuffled(
        graphs: &'a [Graph],
        batch_size: usize,
        seed: u64,
        device: &Device,
    ) -> Result<Self> {
        let mut loader = Self::new(graphs, batch_size, device)?;
        loader.rng = Some(StdRng::seed_from_u64(seed));
        Ok(loader)
    }

    /// Number of batches per epoch.
    pub fn len(&self) -> usize {
        self.graphs.len().div_ceil(self.batch_size)
    }

    /// True when there is nothing to iterate.
    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    /// Number of graphs behind the loader.
    pub fn dataset_len(&self) -> usize {
        self.graphs.len()
    }

    /// Configured batch size.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// One pass over the data.
    pub fn epoch(&mut self) -> impl Iterator<Item = Result<GraphBatch>> + '_ {
        let mut order: Vec<usize> = (0..self.graphs.len()).collect();
        if let Some(rng) = self.rng.as_mut() {
            order.shuffle(rng);
        }
        let graphs = self.graphs;
        let device = &self.device;
        let batch_size = self.batch_size;
        (0..order.len()).step_by(batch_size).map(move |start| {
            let end = (start + batch_size).min(order.len());
            GraphBatch::collate(order[start..end].iter().map(|&i| &graphs[i]), device)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn graphs(n: usize) -> Vec<Graph> {
        (0..n)
            .map(|i| Graph::new(vec![vec![i as f32]], vec![], Some(i as u32)).unwrap())
            .collect()
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let data = graphs(3);
        assert!(DataLoader::new(&data, 0, &Device::Cpu).is_err());
    }

    #[test]
    fn test_in_order_batches() {
        let data = graphs(5);
        let mut loader = DataLoader::new(&data, 2, &Device::Cpu).unwrap();
        let labels: Vec<Vec<u32>> = loader
            .epoch()
            .map(|b| b.unwrap().labels.unwrap())
            .collect();
        assert_eq!(labels, vec![vec![0, 1], vec![2, 3], vec![4]]);
        assert_eq!(loader.len(), 3);
    }

    #[test]
    fn test_shuffle_is_seeded() {
        let data = graphs(10);
        let mut a = DataLoader::shuffled(&data, 3, 11, &Device::Cpu).unwrap();
        let mut b = DataLoader::shuffled(&data, 3, 11, &Device::Cpu).unwrap();
        let la: Vec<_> = a.epoch().map(|x| x.unwrap().labels).collect();
        let lb: Vec<_> = b.epoch().map(|x| x.unwrap().labels).collect();
        assert_eq!(la, lb);
    }

    proptest! {
        #[test]
        fn every_graph_is_visited_once(
            n in 1usize..40,
            batch_size in 1usize..12,
            seed in 0u64..1000
        ) {
            let data = graphs(n);
            let mut loader = DataLoader::shuffled(&data, batch_size, seed, &Device::Cpu).unwrap();
            let mut seen: Vec<u32> = Vec::new();
            let mut batches = 0;
            for batch in loader.epoch() {
                let batch = batch.unwrap();
                prop_assert!(batch.num_graphs <= batch_size);
                seen.extend(batch.labels.unwrap());
                batches += 1;
            }
            seen.sort_unstable();
            prop_assert_eq!(seen, (0..n as u32).collect::<Vec<_>>());
            prop_assert_eq!(batches, loader.len());
        }
    }
}
