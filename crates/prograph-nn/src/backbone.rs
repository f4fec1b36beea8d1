//! Stacked GNN backbone with mean readout.

use crate::conv::{ConvLayer, GATConv, GCNConv, GINConv, GraphConv, SAGEConv, TransformerConv};
use crate::{Error, Result};
use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{ops, VarBuilder, VarMap};
use prograph_core::GraphBatch;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Supported message-passing architectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GnnType {
    #[serde(rename = "GAT")]
    Gat,
    #[serde(rename = "GCN")]
    Gcn,
    #[serde(rename = "GraphSAGE")]
    GraphSage,
    #[serde(rename = "GIN")]
    Gin,
    #[serde(rename = "GCov")]
    GCov,
    #[serde(rename = "GraphTransformer")]
    GraphTransformer,
}

impl GnnType {
    pub const ALL: [GnnType; 6] = [
        GnnType::Gat,
        GnnType::Gcn,
        GnnType::GraphSage,
        GnnType::Gin,
        GnnType::GCov,
        GnnType::GraphTransformer,
    ];

    /// Canonical name, also used in checkpoint file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            GnnType::Gat => "GAT",
            GnnType::Gcn => "GCN",
            GnnType::GraphSage => "GraphSAGE",
            GnnType::Gin => "GIN",
            GnnType::GCov => "GCov",
            GnnType::GraphTransformer => "GraphTransformer",
        }
    }
}

impl fmt::Display for GnnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GnnType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        GnnType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::UnsupportedGnn(s.to_string()))
    }
}

/// A readout-time prompt: rewrites node embeddings before pooling.
pub trait ReadoutPrompt {
    fn apply(&self, node_embeddings: &Tensor) -> Result<Tensor>;
}

/// `num_layer` layers of one architecture followed by per-graph mean pooling.
///
/// Layer widths are `input -> hidden -> ... -> hidden -> out` with
/// `hidden = floor(0.618 * input_dim)` (at least 1); a single layer maps
/// `input -> out` directly. LeakyReLU sits between layers, never after the
/// last one.
pub struct Backbone {
    gnn_type: GnnType,
    input_dim: usize,
    hidden_dim: usize,
    out_dim: usize,
    num_layer: usize,
    layers: Vec<ConvLayer>,
    varmap: VarMap,
}

const GAT_HEADS: usize = 1;
const LEAKY_SLOPE: f64 = 0.01;

impl Backbone {
    pub fn new(
        gnn_type: GnnType,
        input_dim: usize,
        out_dim: usize,
        num_layer: usize,
        device: &Device,
    ) -> Result<Self> {
        if num_layer == 0 {
            return Err(Error::InvalidConfig("num_layer must be at least 1".into()));
        }
        if input_dim == 0 || out_dim == 0 {
            return Err(Error::InvalidConfig(format!(
                "backbone dims must be positive (input {input_dim}, out {out_dim})"
            )));
        }
        let hidden_dim = ((0.618 * input_dim as f64) as usize).max(1);
        let mut widths = vec![input_dim];
        widths.extend(std::iter::repeat(hidden_dim).take(num_layer - 1));
        widths.push(out_dim);

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let layers = widths
            .windows(2)
            .enumerate()
            .map(|(i, w)| build_layer(gnn_type, w[0], w[1], vb.pp(format!("conv{i}"))))
            .collect::<candle_core::Result<Vec<_>>>()?;

        Ok(Self {
            gnn_type,
            input_dim,
            hidden_dim,
            out_dim,
            num_layer,
            layers,
            varmap,
        })
    }

    /// Per-node embeddings (N x out_dim).
    pub fn node_embeddings(&self, batch: &GraphBatch) -> Result<Tensor> {
        let mut h = batch.x.clone();
        let last = self.layers.len() - 1;
        for (i, layer) in self.layers.iter().enumerate() {
            h = layer.forward(&h, batch)?;
            if i < last {
                h = ops::leaky_relu(&h, LEAKY_SLOPE)?;
            }
        }
        Ok(h)
    }

    /// Per-graph embeddings (B x out_dim), optionally passing node
    /// embeddings through a readout prompt first.
    pub fn forward(
        &self,
        batch: &GraphBatch,
        prompt: Option<&dyn ReadoutPrompt>,
    ) -> Result<Tensor> {
        let mut h = self.node_embeddings(batch)?;
        if let Some(prompt) = prompt {
            h = prompt.apply(&h)?;
        }
        Ok(batch.pool().matmul(&h)?)
    }

    pub fn gnn_type(&self) -> GnnType {
        self.gnn_type
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }

    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    pub fn num_layer(&self) -> usize {
        self.num_layer
    }

    /// Trainable variables of every layer.
    pub fn vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }

    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Write the weights as safetensors.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.varmap.save(path.as_ref())?;
        Ok(())
    }

    /// Overwrite the weights from a safetensors file.
    ///
    /// Every variable must be present with the same shape, so a checkpoint
    /// only loads into a backbone built with the same architecture,
    /// `input_dim`, `out_dim` and `num_layer`.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.varmap.load(path).map_err(|e| {
            Error::CheckpointMismatch(format!(
                "{} does not fit {} backbone ({} -> {}, {} layers): {e}",
                path.display(),
                self.gnn_type,
                self.input_dim,
                self.out_dim,
                self.num_layer
            ))
        })?;
        info!(path = %path.display(), "loaded pre-trained backbone weights");
        Ok(())
    }
}

fn build_layer(
    gnn_type: GnnType,
    in_dim: usize,
    out_dim: usize,
    vb: VarBuilder,
) -> candle_core::Result<ConvLayer> {
    Ok(match gnn_type {
        GnnType::Gcn => ConvLayer::Gcn(GCNConv::new(in_dim, out_dim, true, vb)?),
        GnnType::Gat => ConvLayer::Gat(GATConv::new(in_dim, out_dim, GAT_HEADS, 0.2, vb)?),
        GnnType::GraphSage => ConvLayer::Sage(SAGEConv::new(in_dim, out_dim, vb)?),
        GnnType::Gin => ConvLayer::Gin(GINConv::new(in_dim, out_dim, out_dim, true, vb)?),
        GnnType::GCov => ConvLayer::GraphConv(GraphConv::new(in_dim, out_dim, vb)?),
        GnnType::GraphTransformer => {
            ConvLayer::Transformer(TransformerConv::new(in_dim, out_dim, vb)?)
        }
    })
}
