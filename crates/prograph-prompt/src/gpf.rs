//! Feature-space prompts.
//!
//! Both prompts rewrite node features before the backbone sees them, so they
//! work with any architecture and leave the backbone itself untouched.
//!
//! # Reference
//!
//! Fang et al., "Universal Prompt Tuning for Graph Neural Networks",
//! NeurIPS 2023.

use crate::{glorot, Result};
use candle_core::{DType, Device, Tensor, Var, D};
use candle_nn::{linear, ops, Linear, Module, VarBuilder, VarMap};

/// GPF: one learnable vector added to every node's features.
pub struct Gpf {
    global_emb: Tensor,
    varmap: VarMap,
}

impl Gpf {
    pub fn new(in_channels: usize, device: &Device) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let global_emb = vb.get_with_hints((1, in_channels), "global_emb", glorot(1, in_channels))?;
        Ok(Self { global_emb, varmap })
    }

    /// `x + p` for every node row.
    pub fn add(&self, x: &Tensor) -> Result<Tensor> {
        Ok(x.broadcast_add(&self.global_emb)?)
    }

    pub fn vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }
}

/// GPF-plus: each node adds its own attention-weighted mix of a small bank
/// of learned basis vectors.
pub struct GpfPlus {
    p_list: Tensor,
    a: Linear,
    varmap: VarMap,
}

impl GpfPlus {
    /// `p_num` is the size of the basis bank (20 in the reference setup).
    pub fn new(in_channels: usize, p_num: usize, device: &Device) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let p_list = vb.get_with_hints((p_num, in_channels), "p_list", glorot(p_num, in_channels))?;
        let a = linear(in_channels, p_num, vb.pp("a"))?;
        Ok(Self { p_list, a, varmap })
    }

    /// `x + softmax(a(x)) @ P`.
    pub fn add(&self, x: &Tensor) -> Result<Tensor> {
        let score = self.a.forward(x)?;
        let weight = ops::softmax(&score, D::Minus1)?;
        let p = weight.matmul(&self.p_list)?;
        Ok((x + p)?)
    }

    pub fn vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }
}
