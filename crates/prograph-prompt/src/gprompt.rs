//! Readout prompt.
//!
//! # Reference
//!
//! Liu et al., "GraphPrompt: Unifying Pre-Training and Downstream Tasks for
//! Graph Neural Networks", WWW 2023.

use crate::{glorot, Result};
use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{VarBuilder, VarMap};
use prograph_nn::ReadoutPrompt;

/// Element-wise mask on node embeddings applied before mean readout:
/// `s_x = ReadOut({p ⊙ h_v : v ∈ V(x)})`.
pub struct Gprompt {
    weight: Tensor,
    varmap: VarMap,
}

impl Gprompt {
    pub fn new(hid_dim: usize, device: &Device) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let weight = vb.get_with_hints((1, hid_dim), "weight", glorot(1, hid_dim))?;
        Ok(Self { weight, varmap })
    }

    pub fn vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }
}

impl ReadoutPrompt for Gprompt {
    fn apply(&self, node_embeddings: &Tensor) -> prograph_nn::Result<Tensor> {
        Ok(node_embeddings.broadcast_mul(&self.weight)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_scales_columns() {
        let prompt = Gprompt::new(3, &Device::Cpu).unwrap();
        let h = Tensor::ones((2, 3), DType::F32, &Device::Cpu).unwrap();
        let out = prompt.apply(&h).unwrap().to_vec2::<f32>().unwrap();
        let w = prompt.weight.to_vec2::<f32>().unwrap();
        assert_eq!(out[0], w[0]);
        assert_eq!(out[1], w[0]);
    }
}
