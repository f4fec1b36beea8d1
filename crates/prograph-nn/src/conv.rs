//! Message-passing convolutional layers.
//!
//! Implements the architectures a [`Backbone`](crate::Backbone) can stack:
//! - [`GCNConv`]: Graph Convolutional Network (Kipf & Welling, 2017)
//! - [`GATConv`]: Graph Attention Network (Velickovic et al., 2018)
//! - [`SAGEConv`]: GraphSAGE with mean aggregation (Hamilton et al., 2017)
//! - [`GINConv`]: Graph Isomorphism Network (Xu et al., 2019)
//! - [`GraphConv`]: Weisfeiler-Leman style GraphConv (Morris et al., 2019)
//! - [`TransformerConv`]: graph transformer attention (Shi et al., 2021)
//!
//! # Message Passing Framework
//!
//! All layers follow the message-passing paradigm:
//!
//! 1. **Message**: Compute messages from neighbors
//! 2. **Aggregate**: Combine messages (sum, mean, attention-weighted)
//! 3. **Update**: Transform aggregated messages
//!
//! ```text
//! h_i^{(l+1)} = UPDATE(h_i^{(l)}, AGGREGATE({MESSAGE(h_j^{(l)}) : j in N(i)}))
//! ```
//!
//! Neighborhoods are dense (N x N) matrices taken from a
//! [`GraphBatch`](prograph_core::GraphBatch): row `i` selects the sources of
//! messages into node `i`. Batches are small (a handful of graphs), so the
//! dense form stays cheap and every op has a candle gradient.

use candle_core::{DType, Result, Tensor, D};
use candle_nn::{linear, linear_b, ops, Init, Linear, Module, VarBuilder};
use prograph_core::GraphBatch;

/// Mask value for non-edges before a softmax.
const NEG_INF: f64 = -1e9;

/// Graph Convolutional Network layer.
///
/// Implements: H' = D^{-1/2} (A + I) D^{-1/2} H W
///
/// # Reference
///
/// Kipf & Welling, "Semi-Supervised Classification with Graph Convolutional
/// Networks", ICLR 2017.
pub struct GCNConv {
    linear: Linear,
}

impl GCNConv {
    /// Create a new GCN layer.
    ///
    /// # Arguments
    /// - `in_features`: Input feature dimension
    /// - `out_features`: Output feature dimension
    /// - `bias`: Whether to include bias term
    /// - `vb`: Variable builder for parameter initialization
    pub fn new(
        in_features: usize,
        out_features: usize,
        bias: bool,
        vb: VarBuilder,
    ) -> Result<Self> {
        let linear = linear_b(in_features, out_features, bias, vb)?;
        Ok(Self { linear })
    }

    /// Forward pass.
    ///
    /// # Arguments
    /// - `x`: Node features (N x in_features)
    /// - `norm_adj`: Normalized adjacency with self-loops (N x N)
    ///
    /// # Returns
    /// - Node embeddings (N x out_features)
    pub fn forward(&self, x: &Tensor, norm_adj: &Tensor) -> Result<Tensor> {
        // Linear transform: X * W
        let h = self.linear.forward(x)?;
        // Neighborhood aggregation: A_hat * H
        norm_adj.matmul(&h)
    }
}

/// Graph Attention Network layer.
///
/// Implements attention-weighted aggregation:
/// h_i' = mean_heads(sum_{j in N(i) ∪ {i}} alpha_{ij} W h_j)
///
/// Where alpha_{ij} = softmax_j(LeakyReLU(a_dst^T W h_i + a_src^T W h_j)).
/// Heads are averaged, so the output width is `out_features`.
///
/// # Reference
///
/// Velickovic et al., "Graph Attention Networks", ICLR 2018.
pub struct GATConv {
    linear: Linear,
    att_src: Tensor, // Attention vector for source nodes
    att_dst: Tensor, // Attention vector for destination nodes
    negative_slope: f64,
    num_heads: usize,
}

impl GATConv {
    /// Create a new GAT layer.
    ///
    /// # Arguments
    /// - `in_features`: Input feature dimension
    /// - `out_features`: Output feature dimension per head
    /// - `num_heads`: Number of attention heads
    /// - `negative_slope`: LeakyReLU negative slope (typically 0.2)
    /// - `vb`: Variable builder
    pub fn new(
        in_features: usize,
        out_features: usize,
        num_heads: usize,
        negative_slope: f64,
        vb: VarBuilder,
    ) -> Result<Self> {
        let linear = linear(in_features, out_features * num_heads, vb.pp("lin"))?;

        let bound = (6.0 / (1 + out_features) as f64).sqrt();
        let init = Init::Uniform { lo: -bound, up: bound };
        let att_src = vb.get_with_hints((1, num_heads, out_features), "att_src", init)?;
        let att_dst = vb.get_with_hints((1, num_heads, out_features), "att_dst", init)?;

        Ok(Self {
            linear,
            att_src,
            att_dst,
            negative_slope,
            num_heads,
        })
    }

    /// Forward pass with attention.
    ///
    /// # Arguments
    /// - `x`: Node features (N x in_features)
    /// - `adj`: Raw adjacency (N x N); self-loops are added here
    ///
    /// # Returns
    /// - Node embeddings (N x out_features)
    pub fn forward(&self, x: &Tensor, adj: &Tensor) -> Result<Tensor> {
        let n = x.dim(0)?;

        // Linear projection: (N, in) -> (N, heads, out)
        let h = self.linear.forward(x)?;
        let out_per_head = h.dim(1)? / self.num_heads;
        let h = h.reshape((n, self.num_heads, out_per_head))?;

        // alpha_src = (h * att_src).sum(-1) -> (N, heads)
        let alpha_src = h.broadcast_mul(&self.att_src)?.sum(D::Minus1)?;
        let alpha_dst = h.broadcast_mul(&self.att_dst)?.sum(D::Minus1)?;

        // e[h, i, j] = LeakyReLU(alpha_dst[i] + alpha_src[j])
        let dst = alpha_dst.t()?.unsqueeze(2)?;
        let src = alpha_src.t()?.unsqueeze(1)?;
        let scores = ops::leaky_relu(&dst.broadcast_add(&src)?, self.negative_slope)?;

        let mask = neighbor_mask(adj, true)?;
        let attention = ops::softmax(&scores.broadcast_add(&mask)?, D::Minus1)?;

        // (heads, N, N) @ (heads, N, out) -> (heads, N, out)
        let values = h.transpose(0, 1)?.contiguous()?;
        attention.matmul(&values)?.mean(0)
    }
}

/// GraphSAGE convolutional layer with mean aggregation.
///
/// h_i' = W_self h_i + W_neigh * mean({h_j : j in N(i)})
///
/// # Reference
///
/// Hamilton et al., "Inductive Representation Learning on Large Graphs",
/// NeurIPS 2017.
pub struct SAGEConv {
    lin_self: Linear,
    lin_neighbor: Linear,
}

impl SAGEConv {
    /// Create a new GraphSAGE layer.
    pub fn new(in_features: usize, out_features: usize, vb: VarBuilder) -> Result<Self> {
        let lin_self = linear(in_features, out_features, vb.pp("lin_self"))?;
        let lin_neighbor = linear(in_features, out_features, vb.pp("lin_neighbor"))?;
        Ok(Self {
            lin_self,
            lin_neighbor,
        })
    }

    /// Forward pass.
    ///
    /// # Arguments
    /// - `x`: Node features (N x in_features)
    /// - `adj`: Raw adjacency (N x N)
    pub fn forward(&self, x: &Tensor, adj: &Tensor) -> Result<Tensor> {
        let h_self = self.lin_self.forward(x)?;

        // Mean: A * X / degree
        let agg = adj.matmul(x)?;
        let deg = adj.sum_keepdim(1)?;
        // Isolated nodes aggregate to zero
        let deg = deg.clamp(1f32, f32::MAX)?;
        let h_agg = agg.broadcast_div(&deg)?;

        h_self + self.lin_neighbor.forward(&h_agg)?
    }
}

/// Graph Isomorphism Network layer.
///
/// h_v' = MLP((1 + ε) · h_v + Σ_{u∈N(v)} h_u)
///
/// Sum aggregation plus an injective MLP makes GIN as discriminative as the
/// 1-WL test, which is what graph classification needs.
///
/// # Reference
///
/// Xu et al., "How Powerful are Graph Neural Networks?", ICLR 2019.
pub struct GINConv {
    mlp: Vec<Linear>,
    eps: Tensor,
}

impl GINConv {
    /// Create a new GIN layer.
    ///
    /// # Arguments
    ///
    /// - `in_features`: Input feature dimension
    /// - `hidden_features`: MLP hidden dimension
    /// - `out_features`: Output feature dimension
    /// - `learn_eps`: Whether ε is learnable
    /// - `vb`: Variable builder for parameter initialization
    pub fn new(
        in_features: usize,
        hidden_features: usize,
        out_features: usize,
        learn_eps: bool,
        vb: VarBuilder,
    ) -> Result<Self> {
        let mlp = vec![
            linear(in_features, hidden_features, vb.pp("mlp_0"))?,
            linear(hidden_features, out_features, vb.pp("mlp_1"))?,
        ];

        let eps = if learn_eps {
            vb.get_with_hints((1,), "eps", Init::Const(0.))?
        } else {
            Tensor::zeros((1,), DType::F32, vb.device())?
        };

        Ok(Self { mlp, eps })
    }

    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// - `x`: Node features (N x in_features)
    /// - `adj`: Raw adjacency (N x N)
    pub fn forward(&self, x: &Tensor, adj: &Tensor) -> Result<Tensor> {
        // Sum aggregation: Σ_{u∈N(v)} h_u
        let neighbor_sum = adj.matmul(x)?;

        // (1 + ε) · h_v, ε stays on the graph so it receives gradients
        let scale = (&self.eps + 1.0)?;
        let self_contrib = x.broadcast_mul(&scale)?;

        let h = self.mlp[0].forward(&(self_contrib + neighbor_sum)?)?;
        let h = h.relu()?;
        self.mlp[1].forward(&h)
    }
}

/// GraphConv layer.
///
/// h_i' = W_root h_i + W_rel Σ_{j∈N(i)} h_j
///
/// # Reference
///
/// Morris et al., "Weisfeiler and Leman Go Neural: Higher-order Graph
/// Neural Networks", AAAI 2019.
pub struct GraphConv {
    lin_root: Linear,
    lin_rel: Linear,
}

impl GraphConv {
    pub fn new(in_features: usize, out_features: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            lin_root: linear_b(in_features, out_features, false, vb.pp("lin_root"))?,
            lin_rel: linear(in_features, out_features, vb.pp("lin_rel"))?,
        })
    }

    pub fn forward(&self, x: &Tensor, adj: &Tensor) -> Result<Tensor> {
        let neighbor_sum = adj.matmul(x)?;
        self.lin_root.forward(x)? + self.lin_rel.forward(&neighbor_sum)?
    }
}

/// Graph transformer layer.
///
/// h_i' = W_skip h_i + Σ_j softmax_j(q_i·k_j / √d) v_j over j in N(i) ∪ {i}
///
/// Self-loops keep the softmax defined for nodes without in-edges.
///
/// # Reference
///
/// Shi et al., "Masked Label Prediction: Unified Message Passing Model for
/// Semi-Supervised Classification", IJCAI 2021.
pub struct TransformerConv {
    query: Linear,
    key: Linear,
    value: Linear,
    skip: Linear,
    scale: f64,
}

impl TransformerConv {
    pub fn new(in_features: usize, out_features: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            query: linear(in_features, out_features, vb.pp("query"))?,
            key: linear(in_features, out_features, vb.pp("key"))?,
            value: linear(in_features, out_features, vb.pp("value"))?,
            skip: linear(in_features, out_features, vb.pp("skip"))?,
            scale: 1.0 / (out_features as f64).sqrt(),
        })
    }

    pub fn forward(&self, x: &Tensor, adj: &Tensor) -> Result<Tensor> {
        let q = self.query.forward(x)?;
        let k = self.key.forward(x)?;
        let v = self.value.forward(x)?;

        let scores = (q.matmul(&k.t()?)? * self.scale)?;
        let mask = neighbor_mask(adj, true)?;
        let attention = ops::softmax(&scores.broadcast_add(&mask)?, D::Minus1)?;

        attention.matmul(&v)? + self.skip.forward(x)?
    }
}

/// Additive mask: 0 on edges, a large negative value elsewhere.
fn neighbor_mask(adj: &Tensor, self_loops: bool) -> Result<Tensor> {
    let adj = if self_loops {
        let n = adj.dim(0)?;
        let eye = Tensor::eye(n, adj.dtype(), adj.device())?;
        (adj + eye)?
    } else {
        adj.clone()
    };
    let connected = adj.gt(0f32)?.to_dtype(DType::F32)?;
    // connected * 1e9 - 1e9: 0 where linked, -1e9 where not
    connected.affine(-NEG_INF, NEG_INF)
}

/// One layer of any supported architecture.
pub enum ConvLayer {
    Gcn(GCNConv),
    Gat(GATConv),
    Sage(SAGEConv),
    Gin(GINConv),
    GraphConv(GraphConv),
    Transformer(TransformerConv),
}

impl ConvLayer {
    /// Run the layer, picking the adjacency form it expects from the batch.
    pub fn forward(&self, x: &Tensor, batch: &GraphBatch) -> Result<Tensor> {
        match self {
            Self::Gcn(conv) => conv.forward(x, batch.norm_adjacency()),
            Self::Gat(conv) => conv.forward(x, batch.adjacency()),
            Self::Sage(conv) => conv.forward(x, batch.adjacency()),
            Self::Gin(conv) => conv.forward(x, batch.adjacency()),
            Self::GraphConv(conv) => conv.forward(x, batch.adjacency()),
            Self::Transformer(conv) => conv.forward(x, batch.adjacency()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;
    use candle_nn::VarMap;

    fn vb(varmap: &VarMap) -> VarBuilder<'_> {
        VarBuilder::from_varmap(varmap, DType::F32, &Device::Cpu)
    }

    fn path_adj(n: usize) -> Tensor {
        let mut adj = vec![0f32; n * n];
        for i in 1..n {
            adj[i * n + i - 1] = 1.0;
            adj[(i - 1) * n + i] = 1.0;
        }
        Tensor::from_vec(adj, (n, n), &Device::Cpu).unwrap()
    }

    #[test]
    fn test_gcn_forward_shape() {
        let varmap = VarMap::new();
        let gcn = GCNConv::new(8, 4, true, vb(&varmap)).unwrap();

        let x = Tensor::randn(0f32, 1f32, (10, 8), &Device::Cpu).unwrap();
        let adj = Tensor::eye(10, DType::F32, &Device::Cpu).unwrap();

        let out = gcn.forward(&x, &adj).unwrap();
        assert_eq!(out.dims(), &[10, 4]);
    }

    #[test]
    fn test_gat_attention_rows_ignore_non_neighbors() {
        let varmap = VarMap::new();
        let gat = GATConv::new(3, 2, 2, 0.2, vb(&varmap)).unwrap();

        // Node 2 is isolated: with only its self-loop it must depend on x_2 alone.
        let x = Tensor::randn(0f32, 1f32, (3, 3), &Device::Cpu).unwrap();
        let mut adj = vec![0f32; 9];
        adj[1] = 1.0;
        adj[3] = 1.0;
        let adj = Tensor::from_vec(adj, (3, 3), &Device::Cpu).unwrap();

        let out = gat.forward(&x, &adj).unwrap();
        assert_eq!(out.dims(), &[3, 2]);

        let x2 = x.narrow(0, 2, 1).unwrap();
        let alone = gat
            .forward(&x2, &Tensor::zeros((1, 1), DType::F32, &Device::Cpu).unwrap())
            .unwrap();
        let a = out.narrow(0, 2, 1).unwrap().to_vec2::<f32>().unwrap();
        let b = alone.to_vec2::<f32>().unwrap();
        for (u, v) in a[0].iter().zip(&b[0]) {
            assert!((u - v).abs() < 1e-5);
        }
    }

    #[test]
    fn test_sage_isolated_node_uses_self_only() {
        let varmap = VarMap::new();
        let sage = SAGEConv::new(4, 3, vb(&varmap)).unwrap();
        let x = Tensor::randn(0f32, 1f32, (5, 4), &Device::Cpu).unwrap();
        let adj = Tensor::zeros((5, 5), DType::F32, &Device::Cpu).unwrap();
        let out = sage.forward(&x, &adj).unwrap();
        assert_eq!(out.dims(), &[5, 3]);
    }

    #[test]
    fn test_gin_sum_aggregation_shape() {
        let varmap = VarMap::new();
        let gin = GINConv::new(4, 8, 2, true, vb(&varmap)).unwrap();
        let x = Tensor::ones((4, 4), DType::F32, &Device::Cpu).unwrap();
        let out = gin.forward(&x, &path_adj(4)).unwrap();
        assert_eq!(out.dims(), &[4, 2]);
        // eps is registered as a trainable variable
        assert!(varmap.data().lock().unwrap().contains_key("eps"));
    }

    #[test]
    fn test_graph_conv_and_transformer_shapes() {
        let varmap = VarMap::new();
        let conv = GraphConv::new(4, 6, vb(&varmap).pp("gc")).unwrap();
        let tf = TransformerConv::new(4, 6, vb(&varmap).pp("tf")).unwrap();
        let x = Tensor::randn(0f32, 1f32, (5, 4), &Device::Cpu).unwrap();
        let adj = path_adj(5);
        assert_eq!(conv.forward(&x, &adj).unwrap().dims(), &[5, 6]);
        assert_eq!(tf.forward(&x, &adj).unwrap().dims(), &[5, 6]);
    }

    #[test]
    fn test_neighbor_mask_values() {
        let mask = neighbor_mask(&path_adj(3), true).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(mask[0][0], 0.0);
        assert_eq!(mask[0][1], 0.0);
        assert!(mask[0][2] < -1e8);
    }

    proptest::proptest! {
        #[test]
        fn prop_gcn_output_rows_follow_nodes(n in 1usize..12) {
            let varmap = VarMap::new();
            let gcn = GCNConv::new(3, 2, true, vb(&varmap)).unwrap();
            let x = Tensor::ones((n, 3), DType::F32, &Device::Cpu).unwrap();
            let out = gcn.forward(&x, &path_adj(n)).unwrap();
            proptest::prop_assert_eq!(out.dims(), &[n, 2]);
        }
    }
}
