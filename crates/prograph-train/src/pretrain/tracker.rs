/// Initial "best" loss; any finite epoch loss below it triggers a save.
const LOSS_SENTINEL: f64 = 1e6;

/// Running minimum of epoch losses.
#[derive(Debug, Clone)]
pub struct CheckpointTracker {
    best: f64,
}

impl Default for CheckpointTracker {
    fn default() -> Self {
        Self { best: LOSS_SENTINEL }
    }
}

impl CheckpointTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an epoch loss; true when it strictly improves on the minimum
    /// and the checkpoint should be written.
    pub fn observe(&mut self, loss: f64) -> bool {
        if loss < self.best {
            self.best = loss;
            true
        } else {
            false
        }
    }

    pub fn best(&self) -> f64 {
        self.best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saves_only_on_strict_improvement() {
        let mut tracker = CheckpointTracker::new();
        let saved: Vec<usize> = [5.0, 4.0, 4.0, 3.0, 3.5]
            .into_iter()
            .enumerate()
            .filter_map(|(i, loss)| tracker.observe(loss).then_some(i + 1))
            .collect();
        assert_eq!(saved, vec![1, 2, 4]);
        assert_eq!(tracker.best(), 3.0);
    }

    #[test]
    fn test_nan_never_saves() {
        let mut tracker = CheckpointTracker::new();
        assert!(!tracker.observe(f64::NAN));
        assert!(tracker.observe(2.0));
    }
}
