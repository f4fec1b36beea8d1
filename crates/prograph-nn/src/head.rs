//! Heads stacked on top of backbone embeddings.

use crate::Result;
use candle_core::{DType, Device, Tensor, Var, D};
use candle_nn::{linear, ops, Linear, Module, VarBuilder, VarMap};

/// Linear layer followed by a softmax over classes.
///
/// Outputs are probabilities; cross entropy downstream re-normalizes them.
pub struct AnsweringHead {
    linear: Linear,
    varmap: VarMap,
}

impl AnsweringHead {
    pub fn new(hid_dim: usize, num_classes: usize, device: &Device) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let linear = linear(hid_dim, num_classes, vb.pp("answering"))?;
        Ok(Self { linear, varmap })
    }

    /// Class probabilities (B x num_classes).
    pub fn forward(&self, emb: &Tensor) -> Result<Tensor> {
        let logits = self.linear.forward(emb)?;
        Ok(ops::softmax(&logits, D::Minus1)?)
    }

    pub fn vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }

    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }
}

/// Two-layer projection (linear, ReLU, linear) of fixed width, used by
/// contrastive pretraining.
pub struct ProjectionHead {
    lin1: Linear,
    lin2: Linear,
    varmap: VarMap,
}

impl ProjectionHead {
    pub fn new(dim: usize, device: &Device) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let lin1 = linear(dim, dim, vb.pp("projection_head.0"))?;
        let lin2 = linear(dim, dim, vb.pp("projection_head.2"))?;
        Ok(Self { lin1, lin2, varmap })
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let h = self.lin1.forward(x)?.relu()?;
        Ok(self.lin2.forward(&h)?)
    }

    pub fn vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }

    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answering_rows_sum_to_one() {
        let head = AnsweringHead::new(6, 3, &Device::Cpu).unwrap();
        let emb = Tensor::randn(0f32, 1f32, (4, 6), &Device::Cpu).unwrap();
        let probs = head.forward(&emb).unwrap().to_vec2::<f32>().unwrap();
        for row in probs {
            assert!((row.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        }
        assert_eq!(head.vars().len(), 2);
    }

    #[test]
    fn test_projection_keeps_width() {
        let proj = ProjectionHead::new(5, &Device::Cpu).unwrap();
        let x = Tensor::randn(0f32, 1f32, (3, 5), &Device::Cpu).unwrap();
        assert_eq!(proj.forward(&x).unwrap().dims(), &[3, 5]);
        assert_eq!(proj.vars().len(), 4);
    }
}
