//! Snapshot, perturb and restore the variables of a `VarMap`.

use crate::{Error, Result};
use candle_core::{Tensor, Var};
use candle_nn::VarMap;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

/// Copies of every variable in a `VarMap`, in name order.
///
/// Perturbing a model for a second contrastive view is done in place: take a
/// snapshot, [`perturb`](Self::perturb) the live variables, run the forward
/// pass, then [`restore`](Self::restore). Only the variables of the captured
/// map are touched, so any head kept in a separate map is left as it is.
pub struct ParamSnapshot {
    saved: Vec<(Var, Tensor)>,
}

impl ParamSnapshot {
    pub fn capture(varmap: &VarMap) -> Result<Self> {
        let data = varmap
            .data()
            .lock()
            .map_err(|_| Error::InvalidConfig("parameter map poisoned".into()))?;
        let mut named: Vec<(&String, &Var)> = data.iter().collect();
        named.sort_by(|a, b| a.0.cmp(b.0));
        let saved = named
            .into_iter()
            .map(|(_, var)| Ok((var.clone(), var.as_tensor().copy()?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { saved })
    }

    /// Number of captured variables.
    pub fn len(&self) -> usize {
        self.saved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.saved.is_empty()
    }

    /// Set every variable to `saved + scale * N(0, std(saved))`.
    ///
    /// `std` is the unbiased standard deviation of each variable's own
    /// snapshot; a variable with fewer than two elements gets no noise.
    pub fn perturb(&self, scale: f64, rng: &mut StdRng) -> Result<()> {
        for (var, value) in &self.saved {
            let values = value.flatten_all()?.to_vec1::<f32>()?;
            let std = unbiased_std(&values);
            let normal = Normal::new(0.0, std * scale)
                .map_err(|e| Error::InvalidConfig(format!("perturbation noise: {e}")))?;
            let noise: Vec<f32> = values.iter().map(|_| normal.sample(rng) as f32).collect();
            let noise = Tensor::from_vec(noise, value.dims(), value.device())?;
            var.set(&(value + noise)?)?;
        }
        Ok(())
    }

    /// Write the captured values back.
    pub fn restore(&self) -> Result<()> {
        for (var, value) in &self.saved {
            var.set(value)?;
        }
        Ok(())
    }
}

fn unbiased_std(values: &[f32]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n as f64;
    let var = values
        .iter()
        .map(|&v| (v as f64 - mean).powi(2))
        .sum::<f64>()
        / (n - 1) as f64;
    var.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::Init;
    use rand::SeedableRng;

    fn values(varmap: &VarMap, name: &str) -> Vec<f32> {
        let data = varmap.data().lock().unwrap();
        data[name].as_tensor().flatten_all().unwrap().to_vec1().unwrap()
    }

    #[test]
    fn test_unbiased_std() {
        assert!((unbiased_std(&[1.0, 2.0, 3.0, 4.0]) - 1.2909944).abs() < 1e-6);
        assert_eq!(unbiased_std(&[7.0]), 0.0);
    }

    #[test]
    fn test_noise_scales_with_parameter_std() {
        let varmap = VarMap::new();
        varmap
            .get(10_000, "w", Init::Randn { mean: 0.0, stdev: 2.0 }, DType::F32, &Device::Cpu)
            .unwrap();
        let before = values(&varmap, "w");
        let std = unbiased_std(&before);

        let snapshot = ParamSnapshot::capture(&varmap).unwrap();
        snapshot.perturb(0.1, &mut StdRng::seed_from_u64(3)).unwrap();
        let after = values(&varmap, "w");

        // E|N(0, s)| = s * sqrt(2 / pi)
        let mean_abs = before
            .iter()
            .zip(&after)
            .map(|(a, b)| (a - b).abs() as f64)
            .sum::<f64>()
            / before.len() as f64;
        let expected = 0.1 * std * (2.0 / std::f64::consts::PI).sqrt();
        assert!((mean_abs - expected).abs() < 0.1 * expected, "{mean_abs} vs {expected}");

        snapshot.restore().unwrap();
        assert_eq!(values(&varmap, "w"), before);
    }

    #[test]
    fn test_scalar_parameter_is_left_alone() {
        let varmap = VarMap::new();
        varmap.get(1, "eps", Init::Const(0.5), DType::F32, &Device::Cpu).unwrap();
        let snapshot = ParamSnapshot::capture(&varmap).unwrap();
        snapshot.perturb(0.1, &mut StdRng::seed_from_u64(0)).unwrap();
        assert_eq!(values(&varmap, "eps"), vec![0.5]);
        assert_eq!(snapshot.len(), 1);
    }
}
