//! Training objectives.

use crate::{Error, Result};
use candle_core::Tensor;

/// SimGRACE temperature.
pub const SIMGRACE_TEMPERATURE: f64 = 0.1;
/// Added to the negative mass so a batch without negatives stays finite.
pub const SIMGRACE_EPS: f64 = 1e-4;
/// Gprompt temperature.
pub const GPROMPT_TAU: f64 = 0.1;

const NORM_EPS: f32 = 1e-8;

/// NT-Xent style loss between two views of the same batch.
///
/// Row `i` of `z1` and row `i` of `z2` form the positive pair; every other
/// row of `z2` is a negative for `z1[i]`:
///
/// ```text
/// s_ij   = exp(cos(z1_i, z2_j) / T)
/// loss_i = -log( s_ii / (sum_j s_ij - s_ii + eps) )
/// ```
///
/// Returns the batch mean as a scalar tensor.
pub fn contrastive_loss(z1: &Tensor, z2: &Tensor) -> Result<Tensor> {
    let (batch_size, _) = z1.dims2()?;
    if z2.dims2()?.0 != batch_size {
        return Err(Error::InvalidConfig(format!(
            "contrastive views have {} and {} rows",
            batch_size,
            z2.dims2()?.0
        )));
    }
    let n1 = z1.sqr()?.sum_keepdim(1)?.sqrt()?;
    let n2 = z2.sqr()?.sum_keepdim(1)?.sqrt()?;
    let cos = z1.matmul(&z2.t()?)?.div(&n1.matmul(&n2.t()?)?)?;
    let sim = (cos / SIMGRACE_TEMPERATURE)?.exp()?;

    let eye = Tensor::eye(batch_size, sim.dtype(), sim.device())?;
    let pos = sim.mul(&eye)?.sum(1)?;
    let neg = (sim.sum(1)? - &pos)?;
    let ratio = pos.div(&(neg + SIMGRACE_EPS)?)?;
    Ok(ratio.log()?.mean_all()?.neg()?)
}

/// Gprompt tuning loss, summed over the batch.
///
/// `labels` is a `u32` tensor of length B indexing rows of `centers`.
pub fn prompt_tuning_loss(emb: &Tensor, centers: &Tensor, labels: &Tensor) -> Result<Tensor> {
    let cos = unit_rows(emb)?.matmul(&unit_rows(centers)?.t()?)?;
    let sim = (cos / GPROMPT_TAU)?.exp()?;
    let pos_neg = sim.sum_keepdim(1)?;
    let pos = sim.gather(&labels.unsqueeze(1)?.contiguous()?, 1)?;
    Ok(pos.div(&pos_neg)?.log()?.neg()?.sum_all()?)
}

/// Per-class mean of `emb` rows (C x H) and the class counts.
///
/// A class with no rows in the batch gets a zero centroid. The centroids stay
/// attached to `emb` in the autograd graph.
pub fn center_embedding(
    emb: &Tensor,
    labels: &[u32],
    num_classes: usize,
) -> Result<(Tensor, Vec<usize>)> {
    let (batch_size, _) = emb.dims2()?;
    if labels.len() != batch_size {
        return Err(Error::InvalidConfig(format!(
            "{} labels for {batch_size} embeddings",
            labels.len()
        )));
    }
    let mut counts = vec![0usize; num_classes];
    for &label in labels {
        let slot = counts
            .get_mut(label as usize)
            .ok_or_else(|| {
                Error::InvalidConfig(format!("label {label} outside 0..{num_classes}"))
            })?;
        *slot += 1;
    }
    let mut weights = vec![0f32; num_classes * batch_size];
    for (i, &label) in labels.iter().enumerate() {
        let c = label as usize;
        weights[c * batch_size + i] = 1.0 / counts[c] as f32;
    }
    let weights = Tensor::from_vec(weights, (num_classes, batch_size), emb.device())?;
    Ok((weights.matmul(emb)?, counts))
}

/// Rows scaled to unit length (zero rows stay zero).
pub(crate) fn unit_rows(x: &Tensor) -> Result<Tensor> {
    let norm = x.sqr()?.sum_keepdim(1)?.sqrt()?.clamp(NORM_EPS, f32::MAX)?;
    Ok(x.broadcast_div(&norm)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    fn scalar(t: Tensor) -> f64 {
        t.to_scalar::<f32>().unwrap() as f64
    }

    #[test]
    fn test_contrastive_identity_golden() {
        let z = Tensor::eye(2, DType::F32, &Device::Cpu).unwrap();
        let loss = scalar(contrastive_loss(&z, &z).unwrap());
        // s_ii = e^10, one negative with s = e^0 = 1:
        // -log(e^10 / (1 + 1e-4)) = -(10 - ln 1.0001)
        let expected = -(10.0 - 1.0001f64.ln());
        assert!((loss - expected).abs() < 1e-3, "{loss} vs {expected}");
        assert!(loss.is_finite());
    }

    #[test]
    fn test_contrastive_single_row_stays_finite() {
        let z = Tensor::new(&[[0.3f32, 0.4]], &Device::Cpu).unwrap();
        let loss = scalar(contrastive_loss(&z, &z).unwrap());
        // No negatives: -log(e^10 / 1e-4)
        let expected = -(10.0 - 1e-4f64.ln());
        assert!((loss - expected).abs() < 1e-2, "{loss}");
    }

    #[test]
    fn test_contrastive_rejects_mismatched_views() {
        let a = Tensor::ones((3, 2), DType::F32, &Device::Cpu).unwrap();
        let b = Tensor::ones((2, 2), DType::F32, &Device::Cpu).unwrap();
        assert!(contrastive_loss(&a, &b).is_err());
    }

    #[test]
    fn test_center_embedding_means_and_empty_class() {
        let emb = Tensor::new(&[[1f32, 0.], [3., 2.], [5., 5.]], &Device::Cpu).unwrap();
        let (centers, counts) = center_embedding(&emb, &[0, 0, 2], 3).unwrap();
        assert_eq!(counts, vec![2, 0, 1]);
        assert_eq!(
            centers.to_vec2::<f32>().unwrap(),
            vec![vec![2.0, 1.0], vec![0.0, 0.0], vec![5.0, 5.0]]
        );
    }

    #[test]
    fn test_center_embedding_rejects_unknown_label() {
        let emb = Tensor::ones((1, 2), DType::F32, &Device::Cpu).unwrap();
        assert!(center_embedding(&emb, &[4], 2).is_err());
    }

    #[test]
    fn test_prompt_tuning_loss_prefers_own_centroid() {
        let device = Device::Cpu;
        let emb = Tensor::new(&[[1f32, 0.], [0., 1.]], &device).unwrap();
        let centers = Tensor::new(&[[2f32, 0.], [0., 3.]], &device).unwrap();
        let right = Tensor::new(&[0u32, 1], &device).unwrap();
        let wrong = Tensor::new(&[1u32, 0], &device).unwrap();

        let good = scalar(prompt_tuning_loss(&emb, &centers, &right).unwrap());
        let bad = scalar(prompt_tuning_loss(&emb, &centers, &wrong).unwrap());
        // Each row: -log(e^10 / (e^10 + 1)), summed over two rows.
        let expected = 2.0 * (1.0 + (-10f64).exp()).ln();
        assert!((good - expected).abs() < 1e-4, "{good}");
        assert!(bad > good);
    }
}
