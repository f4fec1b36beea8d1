//! Classification metrics over predicted and true label vectors.

use std::collections::BTreeSet;

/// Fraction of positions where `preds` equals `targets` (0 when empty).
pub fn accuracy(preds: &[u32], targets: &[u32]) -> f64 {
    if targets.is_empty() {
        return 0.0;
    }
    let correct = preds.iter().zip(targets).filter(|(p, t)| p == t).count();
    correct as f64 / targets.len() as f64
}

/// Unweighted mean of per-class F1.
///
/// Classes are those occurring in either vector; a class with no true
/// positives scores 0.
pub fn macro_f1(preds: &[u32], targets: &[u32]) -> f64 {
    let classes: BTreeSet<u32> = preds.iter().chain(targets).copied().collect();
    if classes.is_empty() {
        return 0.0;
    }
    let total: f64 = classes
        .iter()
        .map(|&c| {
            let (mut tp, mut fp, mut fn_) = (0usize, 0usize, 0usize);
            for (&p, &t) in preds.iter().zip(targets) {
                match (p == c, t == c) {
                    (true, true) => tp += 1,
                    (true, false) => fp += 1,
                    (false, true) => fn_ += 1,
                    (false, false) => {}
                }
            }
            if tp == 0 {
                0.0
            } else {
                2.0 * tp as f64 / (2 * tp + fp + fn_) as f64
            }
        })
        .sum();
    total / classes.len() as f64
}
