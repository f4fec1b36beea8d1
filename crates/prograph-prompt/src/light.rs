//! ProG prompt token graphs.
//!
//! Each downstream class owns a group of learnable tokens living in the input
//! feature space. A group becomes a small graph whose edges are derived from
//! the tokens themselves: tokens `i` and `j` are linked when
//! `sigmoid(t_i · t_j)` clears the `inner_prune` threshold. Embedding these
//! graphs with the frozen backbone yields one prototype per class.
//!
//! # Reference
//!
//! Sun et al., "All in One: Multi-Task Prompting for Graph Neural Networks",
//! KDD 2023.

use crate::{Error, Result};
use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{ops, Init, VarBuilder, VarMap};
use prograph_core::GraphBatch;

/// Negative slope the token init is tuned for.
const KAIMING_SLOPE: f64 = 0.01;

/// Per-class token groups.
pub struct LightPrompt {
    token_list: Vec<Tensor>,
    inner_prune: f32,
    varmap: VarMap,
}

impl LightPrompt {
    /// # Arguments
    /// - `token_dim`: token width, equal to the input feature width
    /// - `token_num_per_group`: tokens per class graph
    /// - `group_num`: number of classes
    /// - `inner_prune`: similarity below which token pairs are not linked
    pub fn new(
        token_dim: usize,
        token_num_per_group: usize,
        group_num: usize,
        inner_prune: f32,
        device: &Device,
    ) -> Result<Self> {
        if token_dim == 0 || token_num_per_group == 0 || group_num == 0 {
            return Err(Error::InvalidConfig(format!(
                "prompt graph needs positive sizes \
                 (dim {token_dim}, tokens {token_num_per_group}, groups {group_num})"
            )));
        }
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);

        // Kaiming uniform, fan-in mode, leaky ReLU gain
        let gain = (2.0 / (1.0 + KAIMING_SLOPE * KAIMING_SLOPE)).sqrt();
        let bound = gain * (3.0 / token_dim as f64).sqrt();
        let init = Init::Uniform { lo: -bound, up: bound };

        let token_list = (0..group_num)
            .map(|i| {
                vb.get_with_hints(
                    (token_num_per_group, token_dim),
                    &format!("token_list.{i}"),
                    init,
                )
            })
            .collect::<candle_core::Result<Vec<_>>>()?;

        Ok(Self {
            token_list,
            inner_prune,
            varmap,
        })
    }

    pub fn group_num(&self) -> usize {
        self.token_list.len()
    }

    /// The class token graphs as one batch; graph `i` is labelled `i`.
    ///
    /// Node features are the token tensors themselves, so gradients reach the
    /// tokens. The edge structure is recomputed from current token values and
    /// is not differentiated.
    pub fn token_view(&self) -> Result<GraphBatch> {
        let mut edges = Vec::new();
        let mut batch = Vec::new();
        let mut offset = 0;

        for (group, tokens) in self.token_list.iter().enumerate() {
            let token_sim = ops::sigmoid(&tokens.matmul(&tokens.t()?)?)?.to_vec2::<f32>()?;
            let n = token_sim.len();
            for (r, row) in token_sim.iter().enumerate() {
                for (c, &sim) in row.iter().enumerate() {
                    if sim >= self.inner_prune {
                        edges.push((offset + r, offset + c));
                    }
                }
            }
            batch.extend(std::iter::repeat(group).take(n));
            offset += n;
        }

        let x = Tensor::cat(&self.token_list, 0)?;
        let labels = (0..self.token_list.len() as u32).collect();
        Ok(GraphBatch::from_parts(x, edges, batch, Some(labels))?)
    }

    /// Rebuild the prompt graphs from the current tokens; same as
    /// [`token_view`](Self::token_view), named for its use inside training.
    pub fn inner_structure_update(&self) -> Result<GraphBatch> {
        self.token_view()
    }

    pub fn vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }
}
